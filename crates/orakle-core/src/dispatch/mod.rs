//! Drives a single directive through matching, the skill call, and
//! interpretation, emitting events for the HTTP façade as it goes.

mod error;

pub use error::{DispatchError, DispatchResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;

use crate::ai::provider::LLMProvider;
use crate::ai::types::{CompletionRequest, Message};
use crate::events::{EventKind, EventMultiplexer, LoadingState, StreamRole};
use crate::matcher::HybridMatcher;

/// Ties a directive to its resolved skill, extracted parameters, and the
/// abort flag the façade sets on turn cancellation. Exists for the
/// lifetime of one dispatch: created when the stream parser finalizes a
/// directive, dropped when the dispatch completes or aborts.
pub struct DispatchRecord {
    pub correlation_id: String,
    pub directive_text: String,
    pub abort: Arc<AtomicBool>,
}

impl DispatchRecord {
    pub fn new(correlation_id: impl Into<String>, directive_text: impl Into<String>, abort: Arc<AtomicBool>) -> Self {
        Self { correlation_id: correlation_id.into(), directive_text: directive_text.into(), abort }
    }

    fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

pub struct Dispatcher {
    matcher: Arc<HybridMatcher>,
    http_client: Client,
    skills_host_base_url: String,
    call_timeout: Duration,
    interpreter: Arc<dyn LLMProvider>,
}

impl Dispatcher {
    pub fn new(matcher: Arc<HybridMatcher>, http_client: Client, skills_host_base_url: impl Into<String>, call_timeout: Duration, interpreter: Arc<dyn LLMProvider>) -> Self {
        Self { matcher, http_client, skills_host_base_url: skills_host_base_url.into(), call_timeout, interpreter }
    }

    /// Run one directive to completion, emitting events on `events` as it
    /// goes. Never returns an error for caller-visible skill/interpretation
    /// failures — those are surfaced as `error` events and `Ok(())` is
    /// returned so the turn continues with any remaining directives.
    /// Resolution failures inside the matcher itself are also surfaced as
    /// events rather than propagated, for the same reason.
    pub async fn dispatch(&self, record: &DispatchRecord, events: &EventMultiplexer) -> DispatchResult<()> {
        events.emit(EventKind::Loading { state: LoadingState::Start, correlation_id: record.correlation_id.clone() });

        if record.is_aborted() {
            events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
            return Err(DispatchError::Aborted);
        }

        let decision = match self.matcher.match_directive(&record.directive_text).await {
            Ok(decision) => decision,
            Err(err) => {
                events.emit(EventKind::Error { message: err.to_string(), correlation_id: Some(record.correlation_id.clone()) });
                events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
                return Ok(());
            }
        };

        events.emit(EventKind::Command { skill_id: decision.skill_id.clone(), correlation_id: record.correlation_id.clone() });
        events.emit(EventKind::Stream {
            role: StreamRole::Intention,
            text: decision.intention.clone(),
            correlation_id: Some(record.correlation_id.clone()),
        });

        if record.is_aborted() {
            events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
            return Err(DispatchError::Aborted);
        }

        let skill_result = match self.call_skill(&decision.skill_id, &decision.parameters).await {
            Ok(result) => result,
            Err(err) => {
                events.emit(EventKind::Error { message: err.to_string(), correlation_id: Some(record.correlation_id.clone()) });
                events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
                return Ok(());
            }
        };

        if record.is_aborted() {
            events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
            return Err(DispatchError::Aborted);
        }

        if let Err(err) = self.interpret_result(record, &decision.intention, &skill_result, events).await {
            events.emit(EventKind::Error { message: err.to_string(), correlation_id: Some(record.correlation_id.clone()) });
            events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
            return Ok(());
        }

        events.emit(EventKind::Completed { correlation_id: record.correlation_id.clone() });
        events.emit(EventKind::Loading { state: LoadingState::Stop, correlation_id: record.correlation_id.clone() });
        Ok(())
    }

    /// HTTP call to the skill's route at the skills host, with the matcher's
    /// extracted parameters as the JSON body.
    async fn call_skill(&self, skill_id: &str, parameters: &std::collections::HashMap<String, Value>) -> DispatchResult<Value> {
        let descriptor = self
            .matcher
            .registry()
            .find(skill_id)
            .ok_or_else(|| DispatchError::SkillCallFailed(format!("skill {skill_id:?} vanished from the catalog before dispatch")))?;

        let url = format!("{}{}", self.skills_host_base_url, descriptor.route);
        let request = match descriptor.method {
            crate::skills::TransportMethod::Get => self.http_client.get(&url).query(parameters),
            crate::skills::TransportMethod::Post => self.http_client.post(&url).json(parameters),
        };

        let response = request
            .timeout(self.call_timeout)
            .send()
            .await
            .map_err(|e| DispatchError::SkillCallFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError::SkillCallStatus(response.status().to_string()));
        }

        response.json::<Value>().await.map_err(|e| DispatchError::SkillCallFailed(e.to_string()))
    }

    /// Opens a second LLM stream asking it to interpret the skill's
    /// structured result for the user, streaming tokens as `stream` events
    /// tagged `SkillResult`. Checked against the abort flag at every token.
    async fn interpret_result(&self, record: &DispatchRecord, directive_text: &str, skill_result: &Value, events: &EventMultiplexer) -> DispatchResult<()> {
        let system_prompt = "Interpret the following skill result for the user in plain language. \
             Be concise and do not mention internal field names verbatim unless asked.";
        let user_prompt = format!("Original request: {directive_text}\n\nSkill result (JSON):\n{skill_result}");

        let request = CompletionRequest::new("", vec![Message::system(system_prompt), Message::user(user_prompt)]).with_temperature(0.4);

        let mut stream = self.interpreter.stream(request).await?;

        loop {
            if record.is_aborted() {
                return Err(DispatchError::Aborted);
            }
            match stream.next().await {
                Some(Ok(chunk)) => {
                    events.emit(EventKind::Stream {
                        role: StreamRole::SkillResult,
                        text: chunk.delta,
                        correlation_id: Some(record.correlation_id.clone()),
                    });
                    if chunk.finish_reason.is_some() {
                        break;
                    }
                }
                Some(Err(err)) => return Err(DispatchError::Interpretation(err)),
                None => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LLMError, Result as LLMResult};
    use crate::ai::types::{CompletionResponse, StreamChunk};
    use crate::config::MatcherConfig;
    use crate::skills::{HashEmbeddingProvider, SkillRegistry};
    use async_trait::async_trait;
    use tokio_stream::wrappers::ReceiverStream;

    struct ScriptedProvider {
        chunks: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, _request: CompletionRequest) -> LLMResult<CompletionResponse> {
            Ok(CompletionResponse { content: String::new(), model: "test".to_owned(), finish_reason: None })
        }

        async fn stream(&self, _request: CompletionRequest) -> LLMResult<crate::ai::provider::StreamResponse> {
            let pieces = std::mem::take(&mut *self.chunks.lock().unwrap());
            let (tx, rx) = tokio::sync::mpsc::channel(pieces.len().max(1));
            let total = pieces.len();
            tokio::spawn(async move {
                for (i, piece) in pieces.into_iter().enumerate() {
                    let finish_reason = if i + 1 == total { Some("stop".to_owned()) } else { None };
                    let _ = tx.send(Ok(StreamChunk { delta: piece, finish_reason })).await;
                }
            });
            Ok(Box::pin(ReceiverStream::new(rx)))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn test_dispatcher(interpreter: Arc<dyn LLMProvider>) -> Dispatcher {
        let registry = Arc::new(SkillRegistry::new(Client::new(), "http://127.0.0.1:0/capabilities", Arc::new(HashEmbeddingProvider::new())));
        let matcher = Arc::new(HybridMatcher::new(registry, Arc::new(HashEmbeddingProvider::new()), interpreter.clone(), MatcherConfig::default()));
        Dispatcher::new(matcher, Client::new(), "http://127.0.0.1:0", Duration::from_secs(5), interpreter)
    }

    #[tokio::test]
    async fn interpret_result_emits_stream_events_in_order() {
        let provider = Arc::new(ScriptedProvider { chunks: std::sync::Mutex::new(vec!["The ".to_owned(), "weather is sunny.".to_owned()]) });
        let dispatcher = test_dispatcher(provider);
        let record = DispatchRecord::new("c1", "what's the weather", Arc::new(AtomicBool::new(false)));
        let (events, mut rx) = EventMultiplexer::new_turn();

        dispatcher.interpret_result(&record, "what's the weather", &serde_json::json!({"temp_c": 22}), &events).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match first.kind {
            EventKind::Stream { text, role: StreamRole::SkillResult, .. } => assert_eq!(text, "The "),
            other => panic!("unexpected event: {other:?}"),
        }
        match second.kind {
            EventKind::Stream { text, role: StreamRole::SkillResult, .. } => assert_eq!(text, "weather is sunny."),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn interpret_result_aborts_before_streaming_when_flag_already_set() {
        let provider = Arc::new(ScriptedProvider { chunks: std::sync::Mutex::new(vec!["should not appear".to_owned()]) });
        let dispatcher = test_dispatcher(provider);
        let abort = Arc::new(AtomicBool::new(true));
        let record = DispatchRecord::new("c1", "anything", abort);
        let (events, _rx) = EventMultiplexer::new_turn();

        let result = dispatcher.interpret_result(&record, "anything", &serde_json::json!({}), &events).await;
        assert!(matches!(result, Err(DispatchError::Aborted)));
    }

    #[tokio::test]
    async fn dispatch_reports_loading_start_and_stop_on_no_candidates() {
        let provider = Arc::new(ScriptedProvider { chunks: std::sync::Mutex::new(vec![]) });
        let dispatcher = test_dispatcher(provider);
        let record = DispatchRecord::new("c1", "do something nobody has a skill for", Arc::new(AtomicBool::new(false)));
        let (events, mut rx) = EventMultiplexer::new_turn();

        dispatcher.dispatch(&record, &events).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert!(matches!(first.kind, EventKind::Loading { state: LoadingState::Start, .. }));
        assert!(matches!(second.kind, EventKind::Error { .. }));
        assert!(matches!(third.kind, EventKind::Loading { state: LoadingState::Stop, .. }));
    }
}
