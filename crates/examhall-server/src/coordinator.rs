//! Exam lifecycle coordinator.
//!
//! Owns the coordinator's shared services (registry, lifecycle, aggregator)
//! and executes the lifecycle's actions. Cheap to clone; every clone drives
//! the same exam.
//!
//! ## Locking
//!
//! The lifecycle mutex is the outer lock. Login, start, end and countdown
//! expiry all hold it while they touch the registry, which gives a total order
//! between "participant admitted" and "exam content broadcast": a participant
//! either is registered before the start broadcast and receives it, or logs in
//! afterwards and receives the same content as its late-join payload. Never
//! both, never neither. Neither lock is held across socket I/O; delivering to
//! a session only queues the envelope for its writer task.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use examhall_core::{
    Admission, ConnectionId, CoordinatorEvent, Environment, EventBus, ExamContent, ExamLifecycle,
    ExamState, GradingSummary, LifecycleAction, LifecycleError, SessionRegistry, Storage,
    StorageError, SubmissionAggregator, SubmissionError, SubmitOutcome, grade_exam,
};
use examhall_proto::{Answer, Envelope, ParticipantIdentity, Payload, PublishedExam};
use thiserror::Error;
use tokio::{sync::broadcast, task::AbortHandle};

use crate::connection::ChannelSink;

/// Errors from operator actions.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Transition rejected by the lifecycle
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Storage collaborator failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No stored exam with this id
    #[error("exam {0} not found")]
    ExamNotFound(String),
}

/// Operator-facing status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    /// Lifecycle state
    pub state: ExamState,
    /// Current or last exam
    pub exam_id: Option<String>,
    /// Admitted sessions
    pub online: usize,
    /// Stored submissions for the current exam
    pub submissions: usize,
    /// Milliseconds left on the running exam
    pub remaining_millis: Option<i64>,
}

struct Countdown {
    instance_id: u64,
    handle: AbortHandle,
}

struct Inner<E, S> {
    env: E,
    events: EventBus,
    registry: SessionRegistry<ChannelSink>,
    lifecycle: Mutex<ExamLifecycle>,
    submissions: SubmissionAggregator<S>,
    countdown: Mutex<Option<Countdown>>,
    next_conn: AtomicU64,
}

/// Handle to the coordinator's shared state.
pub struct Coordinator<E, S> {
    inner: Arc<Inner<E, S>>,
}

impl<E, S> Clone for Coordinator<E, S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: Environment, S: Storage> Coordinator<E, S> {
    /// Create a coordinator in `WAITING` with no sessions.
    pub fn new(env: E, storage: S) -> Self {
        let events = EventBus::new();
        Self {
            inner: Arc::new(Inner {
                env,
                registry: SessionRegistry::new(events.clone()),
                lifecycle: Mutex::new(ExamLifecycle::new()),
                submissions: SubmissionAggregator::new(storage, events.clone()),
                countdown: Mutex::new(None),
                next_conn: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Environment driving timestamps and the countdown.
    pub fn env(&self) -> &E {
        &self.inner.env
    }

    /// Storage collaborator.
    pub fn storage(&self) -> &S {
        self.inner.submissions.storage()
    }

    /// Allocate an id for a newly accepted connection. Ids are never reused.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.inner.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    /// Observer notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    fn lifecycle(&self) -> MutexGuard<'_, ExamLifecycle> {
        self.inner.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn envelope(&self, payload: Payload) -> Envelope {
        Envelope::new(payload, self.inner.env.wall_clock_millis())
    }

    /// Admit a participant and queue its join payload.
    ///
    /// An accepted participant gets the login response followed by either the
    /// running exam's content or a waiting notice. A rejected one gets the
    /// rejection and its connection is closed by the registry.
    pub fn login(
        &self,
        conn: ConnectionId,
        sink: ChannelSink,
        identity: ParticipantIdentity,
        peer_addr: &str,
    ) -> Admission {
        let lifecycle = self.lifecycle();
        let now = self.inner.env.wall_clock_millis();
        let admission = self.inner.registry.register(conn, sink, identity, peer_addr, now);

        if admission.is_accepted() {
            let payload = lifecycle.join_payload();
            tracing::debug!(conn_id = conn, kind = %payload.kind(), "sending join payload");
            self.inner.registry.send_to(conn, &Envelope::new(payload, now));
        }
        admission
    }

    /// Forget a connection. Idempotent.
    pub fn disconnect(&self, conn: ConnectionId) -> Option<ParticipantIdentity> {
        self.inner.registry.unregister(conn)
    }

    /// Record an answer batch from connection `conn`.
    ///
    /// Batches from connections that never logged in are ignored.
    pub fn submit(
        &self,
        conn: ConnectionId,
        answers: Vec<Answer>,
    ) -> Result<SubmitOutcome, SubmissionError> {
        let Some(participant) = self.inner.registry.participant(conn) else {
            tracing::warn!(conn_id = conn, "submission from unauthenticated connection, ignoring");
            return Ok(SubmitOutcome::Ignored);
        };
        self.inner.submissions.submit(&participant.external_id, answers)
    }

    /// Start `content` now.
    pub fn start_exam(&self, content: ExamContent) -> Result<PublishedExam, CoordinatorError> {
        let mut lifecycle = self.lifecycle();
        let actions = lifecycle.start(content, self.inner.env.wall_clock_millis())?;
        let published = lifecycle.published().cloned();
        self.apply(actions);

        published.ok_or(CoordinatorError::Lifecycle(LifecycleError::NotInProgress {
            state: lifecycle.state(),
        }))
    }

    /// Load `exam_id` from storage and start it.
    pub fn start_stored_exam(&self, exam_id: &str) -> Result<PublishedExam, CoordinatorError> {
        let content = self
            .storage()
            .load_exam(exam_id)?
            .ok_or_else(|| CoordinatorError::ExamNotFound(exam_id.to_string()))?;
        self.start_exam(content)
    }

    /// Operator end of the running exam.
    pub fn end_exam(&self) -> Result<(), CoordinatorError> {
        let mut lifecycle = self.lifecycle();
        let actions = lifecycle.end()?;
        self.apply(actions);
        Ok(())
    }

    /// Countdown of `instance_id` reached zero.
    pub fn countdown_expired(&self, instance_id: u64) {
        let mut lifecycle = self.lifecycle();
        let actions = lifecycle.timer_expired(instance_id);
        if actions.is_empty() {
            tracing::debug!(instance_id, "stale countdown ignored");
        }
        self.apply(actions);
    }

    /// Grade the finished exam and send each online participant its result.
    ///
    /// Only batches of the finished run are graded. Every one of them was
    /// persisted before it was counted.
    pub fn grade(&self) -> Result<GradingSummary, CoordinatorError> {
        let (exam, submissions) = {
            let lifecycle = self.lifecycle();
            (lifecycle.finished_exam()?.clone(), self.inner.submissions.snapshot())
        };
        let summary = grade_exam(&exam, &submissions);

        for (participant, report) in &summary.reports {
            let envelope = self.envelope(Payload::ResultPublish(report.clone()));
            if !self.inner.registry.send_to_participant(participant, &envelope) {
                tracing::info!(participant = %participant, "result not delivered, participant offline");
            }
        }

        tracing::info!(exam_id = %exam.exam_id, graded = summary.participants_graded(), "{summary}");
        Ok(summary)
    }

    /// Snapshot for the operator.
    pub fn status(&self) -> CoordinatorStatus {
        let lifecycle = self.lifecycle();
        let now = self.inner.env.wall_clock_millis();
        CoordinatorStatus {
            state: lifecycle.state(),
            exam_id: lifecycle.exam_id().map(str::to_string),
            online: self.inner.registry.len(),
            submissions: self.inner.submissions.count(),
            remaining_millis: lifecycle.published().map(|p| p.remaining_millis(now)),
        }
    }

    /// Online participants, ordered by id.
    pub fn online(&self) -> Vec<ParticipantIdentity> {
        self.inner.registry.list_online()
    }

    /// Distinct participants with a stored submission.
    pub fn submission_count(&self) -> usize {
        self.inner.submissions.count()
    }

    /// Stored exam definitions.
    pub fn exams(&self) -> Result<Vec<ExamContent>, CoordinatorError> {
        Ok(self.storage().list_exams()?)
    }

    /// Execute lifecycle actions. Caller holds the lifecycle lock.
    fn apply(&self, actions: Vec<LifecycleAction>) {
        for action in actions {
            match action {
                LifecycleAction::ResetSubmissions { exam_id, instance_id } => {
                    self.inner.submissions.begin_exam(&exam_id, instance_id);
                },
                LifecycleAction::CloseSubmissions => self.inner.submissions.close(),
                LifecycleAction::Broadcast(payload) => {
                    let kind = payload.kind();
                    let report = self.inner.registry.broadcast(&self.envelope(payload));
                    tracing::info!(%kind, delivered = report.delivered, failed = report.failed.len(), "broadcast");
                },
                LifecycleAction::ArmTimer { instance_id, duration } => {
                    let coordinator = self.clone();
                    let env = self.inner.env.clone();
                    let task = tokio::spawn(async move {
                        env.sleep(duration).await;
                        coordinator.countdown_expired(instance_id);
                    });
                    tracing::debug!(instance_id, duration_ms = duration.as_millis(), "countdown armed");
                    let previous = self
                        .countdown()
                        .replace(Countdown { instance_id, handle: task.abort_handle() });
                    if let Some(previous) = previous {
                        previous.handle.abort();
                    }
                },
                LifecycleAction::CancelTimer { instance_id } => {
                    let mut countdown = self.countdown();
                    if countdown.as_ref().is_some_and(|c| c.instance_id == instance_id) {
                        if let Some(c) = countdown.take() {
                            c.handle.abort();
                            tracing::debug!(instance_id, "countdown cancelled");
                        }
                    }
                },
                LifecycleAction::StateChanged { exam_id, state } => {
                    tracing::info!(exam_id = %exam_id, %state, "exam state changed");
                    self.inner.events.emit(CoordinatorEvent::ExamStateChanged { exam_id, state });
                },
            }
        }
    }

    fn countdown(&self) -> MutexGuard<'_, Option<Countdown>> {
        self.inner.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
