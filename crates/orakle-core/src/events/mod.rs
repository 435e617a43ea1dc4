//! Per-turn event stream: assigns monotonic sequence numbers to everything
//! the streaming parser and dispatcher produce, and forwards it to the
//! HTTP façade's single reader for that turn.
//!
//! Narrowed from the teacher's all-subscriber `broadcast` bus
//! (`event_bus::tokio_bus::TokioBroadcastBus`) to a single-consumer `mpsc`
//! channel: exactly one reader owns a turn, so a single-writer sequence
//! counter is the simplest way to guarantee strict ordering.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Whether a loading indicator is starting or stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    Start,
    Stop,
}

/// A tagged role for a `stream` event's text, so the UI can render the
/// pre-skill "intention" line, a skill's interpreted result, and plain
/// narrative differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRole {
    Narrative,
    Intention,
    SkillResult,
}

/// One event kind in a turn's stream. Internally tagged so the wire form
/// is a flat `{"type": "...", ...}` object per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Stream { role: StreamRole, text: String, correlation_id: Option<String> },
    Loading { state: LoadingState, correlation_id: String },
    Command { skill_id: String, correlation_id: String },
    Completed { correlation_id: String },
    Error { message: String, correlation_id: Option<String> },
    Abort,
}

/// A single event in a turn's stream, carrying the sequence number the
/// multiplexer assigned at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Per-turn event sink: callers (the stream parser's narrative path, and
/// each dispatch) send `EventKind`s here; the multiplexer assigns sequence
/// numbers and forwards to its single consumer.
#[derive(Clone)]
pub struct EventMultiplexer {
    sender: mpsc::UnboundedSender<Event>,
    sequence: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

/// The consuming half, owned exclusively by the façade's response writer
/// for this turn.
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventMultiplexer {
    /// Create a fresh multiplexer for one turn, paired with its receiver.
    pub fn new_turn() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, sequence: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0)) }, EventReceiver { receiver })
    }

    /// Enqueue an event kind, assigning it the next sequence number. A send
    /// failure means the receiver (and the HTTP response) is already gone;
    /// callers treat that as "the turn is over" rather than an error.
    pub fn emit(&self, kind: EventKind) {
        let sequence = self.sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let _ = self.sender.send(Event { sequence, kind });
    }
}

impl EventReceiver {
    /// Drain queued events for this turn discarding them, used on abort
    /// before emitting the single `abort` event and closing the stream.
    pub fn drain(&mut self) {
        while self.receiver.try_recv().is_ok() {}
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_are_monotonic() {
        let (mux, mut rx) = EventMultiplexer::new_turn();
        mux.emit(EventKind::Command { skill_id: "weather.lookup".to_owned(), correlation_id: "c1".to_owned() });
        mux.emit(EventKind::Completed { correlation_id: "c1".to_owned() });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }

    #[tokio::test]
    async fn drain_discards_queued_events() {
        let (mux, mut rx) = EventMultiplexer::new_turn();
        mux.emit(EventKind::Stream { role: StreamRole::Narrative, text: "hi".to_owned(), correlation_id: None });
        mux.emit(EventKind::Stream { role: StreamRole::Narrative, text: "there".to_owned(), correlation_id: None });
        rx.drain();
        mux.emit(EventKind::Abort);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Abort);
    }

    #[test]
    fn event_serializes_as_flat_tagged_object() {
        let event = Event { sequence: 3, kind: EventKind::Completed { correlation_id: "abc".to_owned() } };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "completed");
        assert_eq!(value["sequence"], 3);
        assert_eq!(value["correlation_id"], "abc");
    }

    #[tokio::test]
    async fn clone_shares_the_same_sequence_counter() {
        let (mux, mut rx) = EventMultiplexer::new_turn();
        let mux2 = mux.clone();
        mux.emit(EventKind::Abort);
        mux2.emit(EventKind::Abort);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }
}
