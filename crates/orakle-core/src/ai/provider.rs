use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use super::types::{CompletionRequest, CompletionResponse, StreamChunk};

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("request to provider failed: {0}")]
    Request(String),
    #[error("provider returned a non-success status: {0}")]
    Status(String),
    #[error("failed to parse provider response: {0}")]
    Decode(String),
    #[error("stream was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// Type alias for a streamed completion: a fallible stream of text deltas.
pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Trait implemented by every LLM backend the middleware talks to.
///
/// The streaming parser reads the primary chat stream through this trait;
/// the skill matcher and the dispatcher open independent sessions through it
/// for refinement and interpretation calls respectively. No session state
/// crosses call boundaries: each call site holds its own `Arc<dyn
/// LLMProvider>` clone.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Complete a prompt and return the full response (used by the matcher's
    /// phase-2 refinement call, which needs a single parseable object).
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Stream a completion (used by the primary chat session and the
    /// dispatcher's interpretation session).
    async fn stream(&self, request: CompletionRequest) -> Result<StreamResponse>;

    /// Human-readable provider name, e.g. `"openai"`.
    fn provider_name(&self) -> &str;
}
