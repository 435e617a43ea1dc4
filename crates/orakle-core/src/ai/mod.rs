//! LLM client abstraction: a provider trait plus a streaming-capable
//! OpenAI-compatible implementation. The matcher, dispatcher, and stream
//! parser all talk to the LLM exclusively through [`provider::LLMProvider`].

pub mod provider;
pub mod providers;
pub mod types;
