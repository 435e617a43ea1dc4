//! `POST /test-skill-key`: given a service name and a map of key names to
//! values, forwards a minimal probe to the skills host and relays its
//! verdict. The core middleware forwards credentials rather than owning
//! them, per `spec.md` §1's non-goals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TestSkillKeyRequest {
    pub service: String,
    #[serde(default)]
    pub keys: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ProbeResult {
    success: bool,
    message: String,
}

pub async fn test_skill_key(State(state): State<Arc<AppState>>, Json(req): Json<TestSkillKeyRequest>) -> impl IntoResponse {
    if req.keys.values().any(|v| v.trim().is_empty()) {
        return Json(ProbeResult { success: false, message: format!("one or more keys for {:?} are empty", req.service) });
    }

    let base_url = state.config_snapshot().await.skills_host.base_url;
    let url = format!("{base_url}/test-key");

    let result = state
        .http_client
        .post(&url)
        .json(&json!({ "service": req.service, "keys": req.keys }))
        .timeout(Duration::from_secs(10))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => Json(ProbeResult { success: true, message: "skills host accepted the key".to_owned() }),
        Ok(response) => Json(ProbeResult { success: false, message: format!("skills host rejected the key: {}", response.status()) }),
        Err(err) => Json(ProbeResult { success: false, message: format!("could not reach skills host: {err}") }),
    }
}
