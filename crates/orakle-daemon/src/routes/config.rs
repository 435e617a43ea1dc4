//! `GET/PUT /config` and `GET /config/defaults`: the backend configuration
//! endpoint. Writers take the state's `RwLock` write guard only long
//! enough to replace the in-memory value and persist it to disk; readers
//! clone a snapshot under a read guard.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use orakle_core::config::{save_config, OrakleConfig};

use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShowSensitiveQuery {
    #[serde(default)]
    pub show_sensitive: bool,
}

pub async fn get_config(State(state): State<Arc<AppState>>, Query(query): Query<ShowSensitiveQuery>) -> impl IntoResponse {
    let config = state.config_snapshot().await;
    let mut value = serde_json::to_value(&config).unwrap_or(Value::Null);
    if !query.show_sensitive {
        redact_sensitive(&mut value);
    }
    Json(value)
}

pub async fn get_config_defaults() -> impl IntoResponse {
    Json(serde_json::to_value(OrakleConfig::default()).unwrap_or(Value::Null))
}

/// Merge `patch` onto the current configuration, normalize, persist to
/// disk, and republish the in-memory snapshot. Accepts either a partial or
/// a full config object.
pub async fn put_config(State(state): State<Arc<AppState>>, Json(patch): Json<Value>) -> Result<impl IntoResponse, GatewayError> {
    let mut guard = state.config.write().await;
    let mut current = serde_json::to_value(&*guard).unwrap_or(Value::Null);
    merge_json(&mut current, &patch);

    let mut updated: OrakleConfig =
        serde_json::from_value(current).map_err(|e| GatewayError::BadRequest(format!("invalid configuration: {e}")))?;
    normalize(&mut updated);

    save_config(&state.config_path, &updated).map_err(GatewayError::Internal)?;
    *guard = updated;

    Ok(Json(json!({ "ok": true })))
}

/// Prefix `provider.default_model` with its provider id when the caller
/// didn't already write a prefixed model name — the one normalization the
/// spec's config round-trip property names explicitly.
fn normalize(config: &mut OrakleConfig) {
    let prefix = format!("{}/", config.provider.default_id);
    if !config.provider.default_model.is_empty() && !config.provider.default_model.starts_with(&prefix) {
        config.provider.default_model = format!("{prefix}{}", config.provider.default_model);
    }
}

fn redact_sensitive(value: &mut Value) {
    if let Some(api_key) = value.pointer_mut("/provider/api_key") {
        if api_key.as_str().is_some_and(|s| !s.is_empty()) {
            *api_key = Value::String("***".to_owned());
        }
    }
}

/// Recursive JSON merge: object keys are merged field by field, any other
/// value (including arrays) is replaced wholesale by `patch`.
fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                merge_json(base_map.entry(key.clone()).or_insert(Value::Null), patch_value);
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}
