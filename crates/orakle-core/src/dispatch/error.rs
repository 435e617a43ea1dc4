use thiserror::Error;

/// Errors a single dispatch can produce. All of these are localized to the
/// dispatch that produced them — they surface as an `error` event and the
/// turn continues with any remaining directives.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Matcher(#[from] crate::matcher::MatcherError),

    #[error("skill call failed: {0}")]
    SkillCallFailed(String),

    #[error("skill host returned a non-success status: {0}")]
    SkillCallStatus(String),

    #[error("interpretation call failed: {0}")]
    Interpretation(#[from] crate::ai::provider::LLMError),

    #[error("dispatch was aborted")]
    Aborted,
}

pub type DispatchResult<T> = Result<T, DispatchError>;
