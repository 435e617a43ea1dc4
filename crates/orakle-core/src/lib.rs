//! Core middleware for brokering LLM ↔ skill interactions.
//!
//! This crate contains everything that does not need an HTTP server: the
//! skill registry, the hybrid matcher, the streaming directive parser, the
//! dispatcher, the event multiplexer, and the service supervisor. The HTTP
//! façade lives in `orakle-daemon`, which depends on this crate.

pub mod ai;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod matcher;
pub mod skills;
pub mod stream;
pub mod supervisor;

pub mod prelude {
    pub use crate::ai::provider::LLMProvider;
    pub use crate::ai::types::{CompletionRequest, CompletionResponse, Message, MessageRole};
    pub use crate::config::{OrakleConfig, load_or_init_config};
    pub use crate::dispatch::Dispatcher;
    pub use crate::events::{Event, EventKind, LoadingState};
    pub use crate::matcher::{HybridMatcher, MatchDecision};
    pub use crate::skills::{SkillDescriptor, SkillRegistry};
    pub use crate::stream::{ParserEvent, StreamParser};
    pub use crate::supervisor::{ServiceSupervisor, ServiceStatus};
}
