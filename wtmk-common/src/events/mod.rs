//! Event types for the WTMK event system
//!
//! Provides shared event definitions and the EventBus used by wtmk-bo to
//! broadcast batch progress to SSE clients and other observers.

mod batch_types;

pub use batch_types::{BatchMode, BatchStatus, BatchSummary, ItemSnapshot, ItemStatus};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// WTMK event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. All events use this central enum for type safety and
/// exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WtmkEvent {
    /// Orchestration session attached to a batch and entered Running
    ///
    /// Triggers:
    /// - SSE: Switch UI to the progress view
    BatchSessionStarted {
        /// Batch UUID being orchestrated
        batch_id: Uuid,
        /// Presentation mode (batch vs single document)
        mode: BatchMode,
        /// Whether this session resumed an already-processing batch
        /// (no new processing trigger was issued)
        resumed: bool,
        /// When the session started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Monitor tick published a fresh snapshot
    ///
    /// Emitted once per successful poll tick. Each payload replaces the
    /// previous one wholesale; `summary.terminal_count()` never decreases
    /// across updates for the same batch.
    ///
    /// Triggers:
    /// - SSE: Update progress bars and per-item rows
    BatchProgressUpdate {
        /// Batch UUID
        batch_id: Uuid,
        /// Cached batch status from this tick's read
        batch_status: BatchStatus,
        /// Per-item observed state
        items: Vec<ItemSnapshot>,
        /// Aggregated summary over `items`
        summary: BatchSummary,
        /// When the snapshot was taken
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch reached `completed`
    ///
    /// Triggers:
    /// - SSE: Navigate to the result/download view
    BatchSessionCompleted {
        /// Batch UUID
        batch_id: Uuid,
        /// Presentation mode, for result-step labeling
        mode: BatchMode,
        /// Final aggregated summary
        summary: BatchSummary,
        /// When completion was observed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch reached `failed` without user cancellation
    ///
    /// Triggers:
    /// - SSE: Show failure state with per-item errors
    BatchSessionFailed {
        /// Batch UUID
        batch_id: Uuid,
        /// Human-readable failure description
        reason: String,
        /// When the failure was observed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User cancelled the session
    ///
    /// Advisory only: the batch is marked `failed` from the client's point
    /// of view, but backend-side work on in-flight items may continue.
    ///
    /// Triggers:
    /// - SSE: Show cancelled state (distinct from failure)
    BatchSessionCancelled {
        /// Batch UUID
        batch_id: Uuid,
        /// Items already terminal when cancellation took effect
        items_finished: usize,
        /// Items abandoned mid-flight
        items_abandoned: usize,
        /// When cancellation took effect
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Monitor crossed the consecutive-failure threshold
    ///
    /// The poll loop keeps running on last-known-good state; this event
    /// surfaces degraded connectivity to the Batch Store so sustained
    /// failure is never silent.
    ///
    /// Triggers:
    /// - SSE: Show a stale-data / connectivity warning
    MonitorDegraded {
        /// Batch UUID being monitored
        batch_id: Uuid,
        /// Consecutive failed ticks at time of emission
        consecutive_failures: u32,
        /// Most recent fetch error
        last_error: String,
        /// When the threshold was crossed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl WtmkEvent {
    /// Event type name for SSE `event:` field routing
    pub fn event_type(&self) -> &str {
        match self {
            WtmkEvent::BatchSessionStarted { .. } => "BatchSessionStarted",
            WtmkEvent::BatchProgressUpdate { .. } => "BatchProgressUpdate",
            WtmkEvent::BatchSessionCompleted { .. } => "BatchSessionCompleted",
            WtmkEvent::BatchSessionFailed { .. } => "BatchSessionFailed",
            WtmkEvent::BatchSessionCancelled { .. } => "BatchSessionCancelled",
            WtmkEvent::MonitorDegraded { .. } => "MonitorDegraded",
        }
    }

    /// Batch this event concerns
    pub fn batch_id(&self) -> Uuid {
        match self {
            WtmkEvent::BatchSessionStarted { batch_id, .. }
            | WtmkEvent::BatchProgressUpdate { batch_id, .. }
            | WtmkEvent::BatchSessionCompleted { batch_id, .. }
            | WtmkEvent::BatchSessionFailed { batch_id, .. }
            | WtmkEvent::BatchSessionCancelled { batch_id, .. }
            | WtmkEvent::MonitorDegraded { batch_id, .. } => *batch_id,
        }
    }
}

/// Broadcast bus for WTMK events
///
/// Cheap to clone; all clones share one underlying channel. Subscribers
/// receive events emitted after they subscribe. When the channel is full
/// the oldest buffered event is dropped for lagging receivers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WtmkEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WtmkEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscriber is
    /// currently listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: WtmkEvent,
    ) -> Result<usize, broadcast::error::SendError<WtmkEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Progress ticks are non-critical: if nothing is listening right now
    /// the next tick carries a fresher snapshot anyway.
    pub fn emit_lossy(&self, event: WtmkEvent) {
        let _ = self.tx.send(event);
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event(batch_id: Uuid) -> WtmkEvent {
        WtmkEvent::BatchProgressUpdate {
            batch_id,
            batch_status: BatchStatus::Processing,
            items: Vec::new(),
            summary: BatchSummary::default(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn event_type_matches_variant_name() {
        let id = Uuid::new_v4();
        assert_eq!(progress_event(id).event_type(), "BatchProgressUpdate");
        let cancelled = WtmkEvent::BatchSessionCancelled {
            batch_id: id,
            items_finished: 2,
            items_abandoned: 1,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(cancelled.event_type(), "BatchSessionCancelled");
        assert_eq!(cancelled.batch_id(), id);
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let id = Uuid::new_v4();
        bus.emit(progress_event(id)).expect("subscriber exists");

        let received = rx.recv().await.expect("event delivered");
        assert_eq!(received.batch_id(), id);
    }

    #[test]
    fn emit_lossy_does_not_panic_without_subscribers() {
        let bus = EventBus::new(4);
        for _ in 0..10 {
            bus.emit_lossy(progress_event(Uuid::new_v4()));
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(progress_event(Uuid::new_v4())).unwrap();
        assert_eq!(json["type"], "BatchProgressUpdate");
        assert_eq!(json["batch_status"], "processing");
    }
}
