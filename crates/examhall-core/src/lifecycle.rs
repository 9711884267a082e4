//! Exam lifecycle state machine.
//!
//! `WAITING -> IN_PROGRESS -> FINISHED`, one instance per coordinator. The
//! machine is pure: every transition returns [`LifecycleAction`]s and the
//! caller performs them (broadcasting, arming the countdown, clearing
//! submissions). Timer expiry and manual end both funnel through
//! [`ExamLifecycle::finish`] under the caller's lock, so whichever arrives
//! second finds the exam no longer in progress and does nothing.
//!
//! Every start creates a fresh instance with its own id. A countdown armed
//! for an earlier instance carries that instance's id and is ignored if it
//! fires late.

use std::{fmt, time::Duration};

use examhall_proto::{Payload, PublishedExam};
use thiserror::Error;

use crate::exam::ExamContent;

/// Notice sent to participants that log in while no exam is running.
pub const WAITING_NOTICE: &str = "Waiting for the exam to start.";

/// Coordinator-wide exam state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamState {
    /// No exam running yet
    Waiting,
    /// Exam content published, countdown running
    InProgress,
    /// Last exam ended; terminal for that instance
    Finished,
}

impl fmt::Display for ExamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "WAITING",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        })
    }
}

/// What ended an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    /// Operator request
    Manual,
    /// Countdown reached zero
    TimerExpired,
}

/// Rejected lifecycle operation. No state was changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Exam content has no questions.
    #[error("exam {exam_id} has no questions")]
    NoQuestions {
        /// Rejected exam
        exam_id: String,
    },

    /// Another exam is still running.
    #[error("exam {running} is already in progress")]
    ExamInProgress {
        /// Exam currently running
        running: String,
    },

    /// End requested while no exam is running.
    #[error("no exam in progress (state {state})")]
    NotInProgress {
        /// State at the time of the request
        state: ExamState,
    },

    /// Grading requested before the exam finished.
    #[error("no finished exam to grade (state {state})")]
    NotFinished {
        /// State at the time of the request
        state: ExamState,
    },
}

/// Effects the caller must perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Point submission aggregation at this exam run and drop earlier
    /// submissions
    ResetSubmissions {
        /// New active exam
        exam_id: String,
        /// Run the submissions belong to
        instance_id: u64,
    },

    /// Stop accepting submissions
    CloseSubmissions,

    /// Send to every registered session
    Broadcast(Payload),

    /// Fire [`ExamLifecycle::timer_expired`] after `duration`
    ArmTimer {
        /// Instance the countdown belongs to
        instance_id: u64,
        /// Time until expiry
        duration: Duration,
    },

    /// Cancel the countdown of this instance
    CancelTimer {
        /// Instance whose countdown to cancel
        instance_id: u64,
    },

    /// Notify observers
    StateChanged {
        /// Exam concerned
        exam_id: String,
        /// State entered
        state: ExamState,
    },
}

/// Working data of one exam run.
#[derive(Debug, Clone)]
struct ExamInstance {
    id: u64,
    content: ExamContent,
    published: PublishedExam,
}

/// The lifecycle state machine.
#[derive(Debug)]
pub struct ExamLifecycle {
    state: ExamState,
    current: Option<ExamInstance>,
    next_instance_id: u64,
}

impl Default for ExamLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamLifecycle {
    /// Start in `WAITING` with no exam.
    pub fn new() -> Self {
        Self { state: ExamState::Waiting, current: None, next_instance_id: 1 }
    }

    /// Current state.
    pub fn state(&self) -> ExamState {
        self.state
    }

    /// Id of the current (running or last finished) exam.
    pub fn exam_id(&self) -> Option<&str> {
        self.current.as_ref().map(|i| i.content.exam_id.as_str())
    }

    /// Id of the current instance.
    pub fn instance_id(&self) -> Option<u64> {
        self.current.as_ref().map(|i| i.id)
    }

    /// Published content of the running exam.
    pub fn published(&self) -> Option<&PublishedExam> {
        match self.state {
            ExamState::InProgress => self.current.as_ref().map(|i| &i.published),
            ExamState::Waiting | ExamState::Finished => None,
        }
    }

    /// Authoritative content of the last finished exam, for grading.
    pub fn finished_exam(&self) -> Result<&ExamContent, LifecycleError> {
        match (self.state, self.current.as_ref()) {
            (ExamState::Finished, Some(instance)) => Ok(&instance.content),
            (state, _) => Err(LifecycleError::NotFinished { state }),
        }
    }

    /// What a participant joining right now should receive.
    ///
    /// While an exam runs this is the exact content the start broadcast
    /// carried, including its original start time, so a late or reconnecting
    /// participant sees the same exam and the same deadline.
    pub fn join_payload(&self) -> Payload {
        match self.published() {
            Some(published) => Payload::ExamStart(published.clone()),
            None => Payload::WaitingNotice(WAITING_NOTICE.to_string()),
        }
    }

    /// `WAITING | FINISHED -> IN_PROGRESS`.
    ///
    /// `start_millis` becomes the published start time.
    pub fn start(
        &mut self,
        content: ExamContent,
        start_millis: i64,
    ) -> Result<Vec<LifecycleAction>, LifecycleError> {
        if let (ExamState::InProgress, Some(running)) = (self.state, self.current.as_ref()) {
            return Err(LifecycleError::ExamInProgress { running: running.content.exam_id.clone() });
        }
        if content.questions.is_empty() {
            return Err(LifecycleError::NoQuestions { exam_id: content.exam_id });
        }

        let id = self.next_instance_id;
        self.next_instance_id += 1;

        let published = content.publish(start_millis);
        let exam_id = content.exam_id.clone();
        let duration = Duration::from_secs(u64::from(content.duration_minutes) * 60);

        self.current = Some(ExamInstance { id, content, published: published.clone() });
        self.state = ExamState::InProgress;

        Ok(vec![
            LifecycleAction::ResetSubmissions { exam_id: exam_id.clone(), instance_id: id },
            LifecycleAction::Broadcast(Payload::ExamStart(published)),
            LifecycleAction::ArmTimer { instance_id: id, duration },
            LifecycleAction::StateChanged { exam_id, state: ExamState::InProgress },
        ])
    }

    /// Manual `IN_PROGRESS -> FINISHED`.
    pub fn end(&mut self) -> Result<Vec<LifecycleAction>, LifecycleError> {
        self.finish(EndTrigger::Manual)
            .ok_or(LifecycleError::NotInProgress { state: self.state })
    }

    /// Countdown expiry for `instance_id`.
    ///
    /// Returns no actions if the exam already ended or the timer belongs to an
    /// earlier instance.
    pub fn timer_expired(&mut self, instance_id: u64) -> Vec<LifecycleAction> {
        if self.instance_id() != Some(instance_id) {
            return Vec::new();
        }
        self.finish(EndTrigger::TimerExpired).unwrap_or_default()
    }

    fn finish(&mut self, trigger: EndTrigger) -> Option<Vec<LifecycleAction>> {
        if self.state != ExamState::InProgress {
            return None;
        }
        let instance = self.current.as_ref()?;
        let exam_id = instance.content.exam_id.clone();
        let instance_id = instance.id;

        self.state = ExamState::Finished;
        tracing::info!(exam_id = %exam_id, ?trigger, "exam finished");

        let mut actions = Vec::with_capacity(4);
        if trigger == EndTrigger::Manual {
            actions.push(LifecycleAction::CancelTimer { instance_id });
        }
        actions.push(LifecycleAction::CloseSubmissions);
        actions.push(LifecycleAction::Broadcast(Payload::ExamEnd));
        actions.push(LifecycleAction::StateChanged { exam_id, state: ExamState::Finished });
        Some(actions)
    }
}
