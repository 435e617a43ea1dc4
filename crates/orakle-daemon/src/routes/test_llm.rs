//! `POST /test-llm`: given a provider configuration, makes a minimal probe
//! call and returns `{success, message}`. Used by the setup flow to
//! validate a key before it is saved.

use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use orakle_core::ai::provider::LLMProvider;
use orakle_core::ai::providers::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use orakle_core::ai::types::{CompletionRequest, Message};

#[derive(Debug, Deserialize)]
pub struct TestLlmRequest {
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

pub async fn test_llm(Json(req): Json<TestLlmRequest>) -> impl IntoResponse {
    let mut provider_config = match req.provider_id.as_str() {
        "anthropic" => OpenAICompatibleConfig::anthropic(req.api_key),
        "ollama" => OpenAICompatibleConfig::ollama(),
        "openrouter" => OpenAICompatibleConfig::openrouter(req.api_key),
        "openai" => OpenAICompatibleConfig::openai(req.api_key),
        other => {
            return Json(json!({ "success": false, "message": format!("unknown provider_id {other:?}") }));
        }
    };
    provider_config.timeout = Duration::from_secs(15);

    let provider = match OpenAICompatibleProvider::new(provider_config, req.provider_id.clone()) {
        Ok(p) => p,
        Err(err) => return Json(json!({ "success": false, "message": err.to_string() })),
    };

    let model = if req.model.is_empty() { "gpt-4o-mini".to_owned() } else { req.model };
    let request = CompletionRequest::new(model, vec![Message::user("Reply with the single word: ok")]).with_max_tokens(8);

    match provider.complete(request).await {
        Ok(response) => Json(json!({ "success": true, "message": format!("provider responded: {}", response.content.trim()) })),
        Err(err) => Json(json!({ "success": false, "message": err.to_string() })),
    }
}
