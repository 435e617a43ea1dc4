//! OpenAI-compatible LLM provider: works against OpenAI, Anthropic,
//! OpenRouter, Ollama, or any other service that speaks the `/chat/completions`
//! wire format. Trimmed to the request shape Orakle actually needs (no
//! reasoning-model special-casing, no token-usage accounting — the
//! middleware never bills against provider usage, it only reads text).

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::super::provider::{LLMError, LLMProvider, Result, StreamResponse};
use super::super::types::{
    CompletionRequest, CompletionResponse, Message as AppMessage, MessageRole, StreamChunk,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessageResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiStreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub extra_headers: HashMap<String, String>,
}

impl Default for OpenAICompatibleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
            extra_headers: HashMap::new(),
        }
    }
}

impl OpenAICompatibleConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), base_url: base_url.into(), ..Default::default() }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "https://api.openai.com/v1")
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "https://api.anthropic.com/v1")
            .with_header("anthropic-version", "2023-06-01")
    }

    pub fn ollama() -> Self {
        Self::new("", "http://127.0.0.1:11434/v1")
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "https://openrouter.ai/api/v1")
    }
}

/// A provider that speaks the OpenAI chat-completion wire format.
///
/// Used for all three LLM sessions the middleware opens: the primary chat
/// stream, the skill matcher's refinement call, and the dispatcher's
/// interpretation stream. Each call site constructs its own
/// `CompletionRequest`; no session state is shared between them.
pub struct OpenAICompatibleProvider {
    client: Client,
    config: OpenAICompatibleConfig,
    provider_name: String,
}

impl OpenAICompatibleProvider {
    pub fn new(config: OpenAICompatibleConfig, provider_name: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LLMError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config, provider_name: provider_name.into() })
    }

    fn convert_message(msg: &AppMessage) -> ApiMessage {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        ApiMessage { role: role.to_string(), content: msg.content.clone() }
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: request.stream,
        }
    }

    fn auth_header(&self) -> Option<String> {
        if self.config.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.config.api_key))
        }
    }

    async fn execute_with_retry(&self, api_request: &ChatCompletionRequest) -> Result<Response> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.saturating_pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let mut builder = self.client.post(&url).header("Content-Type", "application/json");
            if let Some(auth) = self.auth_header() {
                builder = builder.header("Authorization", auth);
            }
            for (k, v) in &self.config.extra_headers {
                builder = builder.header(k, v);
            }

            match builder.json(api_request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        let body = response.text().await.unwrap_or_default();
                        return Err(LLMError::Status(format!("{status}: {body}")));
                    }
                    last_error = Some(LLMError::Status(status.to_string()));
                }
                Err(e) => last_error = Some(LLMError::Request(e.to_string())),
            }
        }

        Err(last_error.unwrap_or(LLMError::Request("request failed with no attempts".into())))
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.build_request(&request);
        let response = self.execute_with_retry(&api_request).await?;
        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| LLMError::Decode(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Decode("no choices in response".into()))?;
        Ok(CompletionResponse {
            content: choice.message.content,
            model: parsed.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResponse> {
        let mut api_request = self.build_request(&request);
        api_request.stream = Some(true);

        tracing::debug!(provider = %self.provider_name, model = %api_request.model, "opening LLM stream");

        let response = self.execute_with_retry(&api_request).await?;
        let event_stream = response.bytes_stream().eventsource();

        let stream = event_stream.filter_map(|event| async move {
            match event {
                Ok(event) => {
                    if event.data == "[DONE]" {
                        return Some(Ok(StreamChunk { delta: String::new(), finish_reason: Some("stop".into()) }));
                    }
                    match serde_json::from_str::<ApiStreamResponse>(&event.data) {
                        Ok(parsed) => parsed.choices.into_iter().next().map(|choice| {
                            Ok(StreamChunk {
                                delta: choice.delta.content.unwrap_or_default(),
                                finish_reason: choice.finish_reason,
                            })
                        }),
                        Err(e) => Some(Err(LLMError::Decode(e.to_string()))),
                    }
                }
                Err(e) => Some(Err(LLMError::Request(e.to_string()))),
            }
        });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_openai_defaults() {
        let config = OpenAICompatibleConfig::openai("test-key");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn config_anthropic_sets_version_header() {
        let config = OpenAICompatibleConfig::anthropic("test-key");
        assert_eq!(config.extra_headers.get("anthropic-version").map(String::as_str), Some("2023-06-01"));
    }

    #[test]
    fn config_ollama_has_no_api_key() {
        let config = OpenAICompatibleConfig::ollama();
        assert!(config.api_key.is_empty());
        assert_eq!(config.base_url, "http://127.0.0.1:11434/v1");
    }

    #[tokio::test]
    async fn provider_construction_succeeds() {
        let provider = OpenAICompatibleProvider::new(OpenAICompatibleConfig::ollama(), "ollama");
        assert!(provider.is_ok());
    }
}
