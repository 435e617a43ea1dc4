//! `POST /framework/chat`: opens a long-lived `application/x-ndjson`
//! response and drives the C3→C2→C4 pipeline, translating the internal
//! event stream into the wire envelope `{type, event, content}` fixed by
//! the spec. Grounded on the teacher's `Body::from_stream` ndjson pattern
//! and `gateway::ws`'s per-connection task split.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use bytes::Bytes;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use orakle_core::events::{Event, EventKind, EventMultiplexer, EventReceiver, LoadingState, StreamRole};

use crate::pipeline::run_turn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub use_tts: bool,
}

/// A per-turn stream that sets its abort flag when dropped before natural
/// completion — the signal the rest of the pipeline watches for a caller
/// that closed the HTTP connection mid-turn.
struct TurnStream {
    rx: EventReceiver,
    abort: Arc<AtomicBool>,
    completed: bool,
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        if !self.completed {
            self.abort.store(true, Ordering::SeqCst);
        }
    }
}

pub async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    if !state.supervisor.status(orakle_core::supervisor::ServiceId::SkillsHost).await.map(|s| s.is_healthy()).unwrap_or(false) {
        tracing::warn!("skills host unhealthy at turn start; narrative-only responses will still be served");
    }

    let (events, rx) = EventMultiplexer::new_turn();
    let abort = Arc::new(AtomicBool::new(false));

    let llm = state.llm.clone();
    let dispatcher = state.dispatcher.clone();
    let turn_abort = abort.clone();
    let user_message = req.message;
    tokio::spawn(async move {
        run_turn(llm, dispatcher, user_message, turn_abort, events).await;
    });

    let turn_stream = TurnStream { rx, abort, completed: false };
    let stream = futures::stream::unfold(turn_stream, |mut turn| async move {
        match turn.rx.recv().await {
            Some(event) => {
                let mut line = serde_json::to_vec(&to_wire_envelope(event)).unwrap_or_default();
                line.push(b'\n');
                Some((Ok::<Bytes, std::io::Error>(Bytes::from(line)), turn))
            }
            None => {
                turn.completed = true;
                None
            }
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response())
}

/// Translate one internal [`Event`] into the caller-facing envelope.
fn to_wire_envelope(event: Event) -> Value {
    match event.kind {
        EventKind::Stream { role, text, correlation_id } => {
            let skill_related = matches!(role, StreamRole::Intention | StreamRole::SkillResult);
            json!({
                "type": "message",
                "event": "stream",
                "content": {
                    "content": {
                        "content": text,
                        "flags": { "skill": skill_related },
                        "messageId": correlation_id,
                    }
                }
            })
        }
        EventKind::Loading { state, correlation_id } => {
            let state_str = match state {
                LoadingState::Start => "start",
                LoadingState::Stop => "stop",
            };
            json!({ "type": "signal", "event": "loading", "content": { "state": state_str, "correlationId": correlation_id } })
        }
        EventKind::Command { skill_id, correlation_id } => {
            json!({ "type": "signal", "event": "command", "content": { "name": skill_id, "correlationId": correlation_id } })
        }
        EventKind::Completed { correlation_id } => {
            json!({ "type": "signal", "event": "completed", "content": { "correlationId": correlation_id } })
        }
        EventKind::Error { message, correlation_id } => {
            json!({ "type": "signal", "event": "error", "content": { "message": message, "correlationId": correlation_id } })
        }
        EventKind::Abort => {
            json!({ "type": "signal", "event": "abort", "content": {} })
        }
    }
}
