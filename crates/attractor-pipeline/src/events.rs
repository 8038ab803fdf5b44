//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, metrics collectors, UI, etc.) can subscribe to
//! pipeline execution progress without coupling to the engine internals.
//! Delivery is best-effort: a lagging or absent subscriber never aborts the
//! runner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_core::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// The kind of event carried by a [`PipelineEvent`] envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PipelineStarted,
    PipelineCompleted,
    PipelineFailed,
    PipelineRestarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    StageRetrying,
    CheckpointSaved,
    ToolHookPre,
    ToolHookPost,
    // Enrichment kinds, carried in the same uniform envelope.
    EdgeSelected,
    GoalGateChecked,
    ContextUpdated,
}

/// A single pipeline event: a uniform envelope around a kind-specific `data` bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub kind: EventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub pipeline_id: String,
    pub data: HashMap<String, String>,
}

impl PipelineEvent {
    pub fn new(
        kind: EventKind,
        pipeline_id: impl Into<String>,
        data: HashMap<String, String>,
    ) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now(),
            pipeline_id: pipeline_id.into(),
            data,
        }
    }
}

/// Build a `data` map from `key, value` pairs, the common case for emitting
/// small fixed-shape events.
#[macro_export]
macro_rules! event_data {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(map.insert($key.to_string(), $value.to_string());)*
        map
    }};
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
    closed: Arc<AtomicBool>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    /// Emitting after [`close`](Self::close) is a no-op.
    pub fn emit(&self, event: PipelineEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver registered eagerly,
    /// so events emitted after this call but before the first `recv` are not
    /// lost (subject to the channel's capacity).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// A lazy stream of events. The backing receiver is registered the moment
    /// this is called (not on first poll), so nothing emitted between this
    /// call and the stream's first poll is missed. Stops yielding once
    /// [`close`](Self::close) has been called and the channel has drained.
    pub fn events(&self) -> impl Stream<Item = PipelineEvent> {
        let closed = self.closed.clone();
        BroadcastStream::new(self.subscribe())
            .filter_map(|r| r.ok())
            .take_while(move |_| !closed.load(Ordering::Acquire))
    }

    /// Signal all current consumers to terminate. Further `emit` calls and
    /// in-flight `events()` streams stop producing once this is observed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::new(
            EventKind::PipelineStarted,
            "pipe-1",
            event_data! { "node_count" => 3 },
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::PipelineStarted);
        assert_eq!(event.pipeline_id, "pipe-1");
        assert_eq!(event.data.get("node_count"), Some(&"3".to_string()));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(PipelineEvent::new(
            EventKind::CheckpointSaved,
            "pipe-1",
            event_data! { "node_id" => "n1" },
        ));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        let json1 = serde_json::to_string(&e1).unwrap();
        let json2 = serde_json::to_string(&e2).unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(PipelineEvent::new(
            EventKind::PipelineFailed,
            "pipe-1",
            event_data! { "error" => "something went wrong" },
        ));
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = PipelineEvent::new(
            EventKind::StageCompleted,
            "pipe-1",
            event_data! { "node_id" => "node_42", "status" => "ok", "duration_ms" => 123 },
        );

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: PipelineEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.kind, EventKind::StageCompleted);
        assert_eq!(deserialized.data.get("node_id"), Some(&"node_42".to_string()));
        assert_eq!(deserialized.data.get("status"), Some(&"ok".to_string()));
    }

    #[test]
    fn event_kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&EventKind::ToolHookPre).unwrap();
        assert_eq!(json, "\"TOOL_HOOK_PRE\"");
        let json = serde_json::to_string(&EventKind::EdgeSelected).unwrap();
        assert_eq!(json, "\"EDGE_SELECTED\"");
    }

    #[tokio::test]
    async fn enrichment_kinds_round_trip_through_uniform_envelope() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::new(
            EventKind::GoalGateChecked,
            "pipe-1",
            event_data! { "node_id" => "n1", "satisfied" => true },
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::GoalGateChecked);
        assert_eq!(event.data.get("satisfied"), Some(&"true".to_string()));
    }

    #[tokio::test]
    async fn events_stream_yields_emitted_events() {
        let emitter = EventEmitter::new(16);
        let stream = emitter.events();
        tokio::pin!(stream);

        emitter.emit(PipelineEvent::new(
            EventKind::StageStarted,
            "pipe-1",
            event_data! { "node_id" => "n1" },
        ));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, EventKind::StageStarted);
    }

    #[tokio::test]
    async fn close_stops_further_emits() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();
        assert!(!emitter.is_closed());

        emitter.close();
        assert!(emitter.is_closed());

        emitter.emit(PipelineEvent::new(
            EventKind::PipelineCompleted,
            "pipe-1",
            HashMap::new(),
        ));
        assert!(rx.try_recv().is_err());
    }
}
