//! `GET /capabilities`: the current usable skill catalog for display,
//! shaped `{skill_id: {description, type, server?}}` per the spec's fixed
//! response.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::state::AppState;

pub async fn capabilities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut out = Map::new();
    for descriptor in state.registry.list() {
        out.insert(
            descriptor.skill_id.clone(),
            json!({
                "description": descriptor.description,
                "type": format!("{:?}", descriptor.method).to_lowercase(),
                "server": state.config_snapshot().await.skills_host.base_url,
            }),
        );
    }
    Json(Value::Object(out))
}
