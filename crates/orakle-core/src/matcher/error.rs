use thiserror::Error;

/// Errors the hybrid matcher can surface. `ResolutionFailed` is the
/// terminal outcome of the phase-2 retry contract: one malformed LLM
/// response gets a tighter-prompt retry, a second failure becomes this.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("no skill candidates above the similarity floor")]
    NoCandidates,

    #[error("skill-resolution-failed: {0}")]
    ResolutionFailed(String),

    #[error("required parameter missing for skill {skill_id}: {parameter}")]
    MissingRequiredParameter { skill_id: String, parameter: String },

    #[error("LLM call failed during skill matching: {0}")]
    Llm(#[from] crate::ai::provider::LLMError),

    #[error(transparent)]
    Registry(#[from] crate::skills::RegistryError),
}

pub type MatcherResult<T> = Result<T, MatcherError>;
