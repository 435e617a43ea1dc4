//! `GET /health`: the only route that stays public (no bearer token), the
//! way the teacher's `/api/v1/health` does — used by the supervisor's own
//! health polling as well as external callers.

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
