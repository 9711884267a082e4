//! Observer notifications for presentation layers.
//!
//! The core publishes coordinator events on a Tokio broadcast channel. Emitting
//! never awaits and never blocks: a subscriber that falls behind is lagged
//! (skips events) instead of stalling the registry or the aggregator. Events
//! are emitted from whichever task performed the mutation; subscribers must
//! not assume any particular thread.

use examhall_proto::ParticipantIdentity;
use tokio::sync::broadcast;

use crate::lifecycle::ExamState;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Something observable changed in the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// A session was admitted or removed.
    OnlineParticipantsChanged {
        /// Snapshot taken right after the change
        online: Vec<ParticipantIdentity>,
    },

    /// A submission was stored or the store was cleared.
    SubmissionCountChanged {
        /// Exam the count refers to, `None` once cleared without an exam
        exam_id: Option<String>,
        /// Distinct participants with a stored submission
        count: usize,
    },

    /// The exam lifecycle moved to a new state.
    ExamStateChanged {
        /// Exam the transition belongs to
        exam_id: String,
        /// State entered
        state: ExamState,
    },
}

/// Non-blocking fan-out of [`CoordinatorEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers reached.
    pub fn emit(&self, event: CoordinatorEvent) -> usize {
        tracing::trace!(?event, "coordinator event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        let reached =
            bus.emit(CoordinatorEvent::SubmissionCountChanged { exam_id: None, count: 0 });
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn clones_share_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let other = bus.clone();

        other.emit(CoordinatorEvent::ExamStateChanged {
            exam_id: "quiz1".to_string(),
            state: ExamState::InProgress,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, CoordinatorEvent::ExamStateChanged { state: ExamState::InProgress, .. }));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::with_capacity(1);
        let mut rx = bus.subscribe();

        bus.emit(CoordinatorEvent::SubmissionCountChanged { exam_id: None, count: 1 });
        bus.emit(CoordinatorEvent::SubmissionCountChanged { exam_id: None, count: 2 });

        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(1))));
        let latest = rx.recv().await.unwrap();
        assert_eq!(latest, CoordinatorEvent::SubmissionCountChanged { exam_id: None, count: 2 });
    }
}
