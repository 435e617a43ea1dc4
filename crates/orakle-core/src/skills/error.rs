//! Error types for the skill registry.

use thiserror::Error;

/// Errors that can occur while fetching, validating, or looking up skills.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("failed to reach skills host: {0}")]
    FetchFailed(String),

    #[error("skills host returned a non-success status: {0}")]
    HostStatus(String),

    #[error("invalid skill descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("embedding provider error: {0}")]
    Embedding(#[from] super::embeddings::EmbeddingError),

    #[error("failed to decode skills host response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("registry has not completed an initial load")]
    NotLoaded,

    #[error("duplicate skill_id in catalog: {0}")]
    DuplicateSkillId(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
