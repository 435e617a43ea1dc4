//! `GET /providers`: the catalog of configured LLM providers for UI
//! consumption, optionally filtered by a `?filter=substr` query parameter.
//! Grounded on the constructors in
//! `orakle_core::ai::providers::openai_compatible::OpenAICompatibleConfig`
//! (`openai`, `anthropic`, `ollama`, `openrouter`) — the static catalog
//! below mirrors that module's list of supported backends.

use axum::extract::Query;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Deserialize)]
pub struct ProvidersQuery {
    #[serde(default)]
    pub filter: String,
}

struct ProviderInfo {
    id: &'static str,
    name: &'static str,
    website: &'static str,
    fields: &'static [&'static str],
    models: &'static [&'static str],
}

const CATALOG: &[ProviderInfo] = &[
    ProviderInfo {
        id: "openai",
        name: "OpenAI",
        website: "https://platform.openai.com",
        fields: &["api_key"],
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "o3-mini"],
    },
    ProviderInfo {
        id: "anthropic",
        name: "Anthropic",
        website: "https://console.anthropic.com",
        fields: &["api_key"],
        models: &["claude-opus-4", "claude-sonnet-4", "claude-haiku-4"],
    },
    ProviderInfo {
        id: "openrouter",
        name: "OpenRouter",
        website: "https://openrouter.ai",
        fields: &["api_key"],
        models: &["meta-llama/llama-3.1-70b-instruct", "mistralai/mixtral-8x7b-instruct"],
    },
    ProviderInfo { id: "ollama", name: "Ollama (local)", website: "https://ollama.com", fields: &[], models: &["llama3.1", "qwen2.5", "mistral"] },
];

pub async fn providers(Query(query): Query<ProvidersQuery>) -> impl IntoResponse {
    let filter = query.filter.to_lowercase();
    let mut out = Map::new();
    for provider in CATALOG {
        if !filter.is_empty() && !provider.id.contains(&filter) && !provider.name.to_lowercase().contains(&filter) {
            continue;
        }
        out.insert(
            provider.id.to_owned(),
            json!({
                "name": provider.name,
                "website": provider.website,
                "fields": provider.fields,
                "models": provider.models,
            }),
        );
    }
    Json(json!({ "providers": Value::Object(out) }))
}
