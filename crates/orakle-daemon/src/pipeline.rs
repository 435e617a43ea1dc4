//! Drives one `/framework/chat` turn end to end: opens the primary LLM
//! stream, feeds its tokens through the stream parser, emits narrative as
//! `stream` events, and spawns one dispatch task per directive — joined
//! back into the turn's event multiplexer. Grounded on the teacher's
//! per-connection task split in `gateway::ws::handle_socket`, adapted from
//! a bidirectional websocket loop to a one-shot unidirectional turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use orakle_core::ai::provider::LLMProvider;
use orakle_core::ai::types::{CompletionRequest, Message};
use orakle_core::dispatch::{DispatchRecord, Dispatcher};
use orakle_core::events::{EventKind, EventMultiplexer, StreamRole};
use orakle_core::stream::{ParserEvent, StreamParser};

/// Run one turn: open the primary stream for `user_message`, parse it, and
/// drive every directive through `dispatcher`, emitting all events on
/// `events`. Returns once every narrative chunk has been read and every
/// spawned dispatch has completed (or the abort flag was observed).
pub async fn run_turn(llm: Arc<dyn LLMProvider>, dispatcher: Arc<Dispatcher>, user_message: String, abort: Arc<AtomicBool>, events: EventMultiplexer) {
    let system_prompt = "You are Orakle, a helpful assistant with access to skills. \
         When a skill would help answer the user, emit a directive of the form \
         `<<<ORAKLE <natural language request> ORAKLE`. Otherwise respond normally.";
    let request = CompletionRequest::new("", vec![Message::system(system_prompt), Message::user(user_message)]).with_temperature(0.7);

    let mut stream = match llm.stream(request).await {
        Ok(stream) => stream,
        Err(err) => {
            events.emit(EventKind::Error { message: err.to_string(), correlation_id: None });
            return;
        }
    };

    let mut parser = StreamParser::new();
    let mut in_flight = Vec::new();

    loop {
        if abort.load(Ordering::SeqCst) {
            break;
        }
        match stream.next().await {
            Some(Ok(chunk)) => {
                for parser_event in parser.feed(&chunk.delta) {
                    handle_parser_event(parser_event, &dispatcher, &abort, &events, &mut in_flight);
                }
                if chunk.finish_reason.is_some() {
                    break;
                }
            }
            Some(Err(err)) => {
                events.emit(EventKind::Error { message: err.to_string(), correlation_id: None });
                break;
            }
            None => break,
        }
    }

    for parser_event in parser.finish() {
        handle_parser_event(parser_event, &dispatcher, &abort, &events, &mut in_flight);
    }

    for handle in in_flight {
        let _ = handle.await;
    }

    if abort.load(Ordering::SeqCst) {
        events.emit(EventKind::Abort);
    }
}

fn handle_parser_event(
    event: ParserEvent,
    dispatcher: &Arc<Dispatcher>,
    abort: &Arc<AtomicBool>,
    events: &EventMultiplexer,
    in_flight: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    match event {
        ParserEvent::Narrative(text) => {
            if !text.is_empty() {
                events.emit(EventKind::Stream { role: StreamRole::Narrative, text, correlation_id: None });
            }
        }
        ParserEvent::Directive(body) => {
            let correlation_id = Uuid::new_v4().to_string();
            let record = DispatchRecord::new(correlation_id, body, abort.clone());
            let dispatcher = dispatcher.clone();
            let events = events.clone();
            in_flight.push(tokio::spawn(async move {
                let _ = dispatcher.dispatch(&record, &events).await;
            }));
        }
        ParserEvent::UnterminatedDirective(_) => {
            events.emit(EventKind::Error { message: "stream closed with an unterminated directive".to_owned(), correlation_id: None });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orakle_core::ai::provider::{LLMError, Result as LLMResult};
    use orakle_core::ai::types::{CompletionResponse, StreamChunk};
    use orakle_core::ai::provider::StreamResponse;
    use orakle_core::config::MatcherConfig;
    use orakle_core::skills::{HashEmbeddingProvider, SkillRegistry};
    use orakle_core::matcher::HybridMatcher;
    use reqwest::Client;
    use tokio_stream::wrappers::ReceiverStream;

    struct ScriptedProvider {
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, _request: CompletionRequest) -> LLMResult<CompletionResponse> {
            Ok(CompletionResponse { content: String::new(), model: "test".to_owned(), finish_reason: None })
        }

        async fn stream(&self, _request: CompletionRequest) -> LLMResult<StreamResponse> {
            let pieces: Vec<String> = self.chunks.iter().map(|s| s.to_string()).collect();
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

    fn test_dispatcher(llm: Arc<dyn LLMProvider>) -> Arc<Dispatcher> {
        let registry = Arc::new(SkillRegistry::new(Client::new(), "http://127.0.0.1:0/capabilities", Arc::new(HashEmbeddingProvider::new())));
        let matcher = Arc::new(HybridMatcher::new(registry, Arc::new(HashEmbeddingProvider::new()), llm.clone(), MatcherConfig::default()));
        Arc::new(Dispatcher::new(matcher, Client::new(), "http://127.0.0.1:0", std::time::Duration::from_secs(5), llm))
    }

    #[tokio::test]
    async fn pure_narrative_turn_emits_only_stream_events() {
        let provider = Arc::new(ScriptedProvider { chunks: vec!["Hello, ", "who are you?"] });
        let dispatcher = test_dispatcher(provider.clone());
        let (events, mut rx) = EventMultiplexer::new_turn();
        let abort = Arc::new(AtomicBool::new(false));

        run_turn(provider, dispatcher, "hi".to_owned(), abort, events).await;

        let mut saw_any = false;
        while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await {
            saw_any = true;
            assert!(matches!(event.kind, EventKind::Stream { role: StreamRole::Narrative, .. }));
        }
        assert!(saw_any);
    }

    #[tokio::test]
    async fn directive_in_stream_spawns_a_dispatch() {
        let provider = Arc::new(ScriptedProvider { chunks: vec!["before <<<ORAKLE do a thing ORAKLE after"] });
        let dispatcher = test_dispatcher(provider.clone());
        let (events, mut rx) = EventMultiplexer::new_turn();
        let abort = Arc::new(AtomicBool::new(false));

        run_turn(provider, dispatcher, "do it".to_owned(), abort, events).await;

        let mut saw_loading_start = false;
        while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await {
            if matches!(event.kind, EventKind::Loading { state: orakle_core::events::LoadingState::Start, .. }) {
                saw_loading_start = true;
            }
        }
        assert!(saw_loading_start);
    }
}
