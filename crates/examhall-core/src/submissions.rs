//! Submission aggregation.
//!
//! One answer batch per participant for the active exam. A resubmission
//! replaces the previous batch wholesale. The durable write happens first and
//! outside the lock; only when it succeeds does the in-memory map change and
//! observers hear about it, so the visible count never runs ahead of storage.
//!
//! Batches belong to one exam run. Restarting an exam with the same id starts
//! a new run, and a write that was in flight for the old run is discarded.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use examhall_proto::Answer;
use thiserror::Error;

use crate::{
    events::{CoordinatorEvent, EventBus},
    storage::{Storage, StorageError},
};

/// Errors from [`SubmissionAggregator::submit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The batch was not persisted and nothing was recorded
    #[error("submission from {participant} not stored: {source}")]
    Persistence {
        /// Submitting participant
        participant: String,
        /// Storage failure
        #[source]
        source: StorageError,
    },
}

/// Result of a submission that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Batch stored; `count` distinct participants have submitted
    Stored {
        /// Count after this submission
        count: usize,
        /// Whether this participant had submitted before
        replaced: bool,
    },
    /// No exam accepting submissions; nothing was stored
    Ignored,
}

#[derive(Debug, Default)]
struct AggregatorState {
    exam_id: Option<String>,
    run: u64,
    accepting: bool,
    batches: HashMap<String, Vec<Answer>>,
}

/// Thread-safe per-participant answer store for the active exam.
#[derive(Debug)]
pub struct SubmissionAggregator<S> {
    storage: S,
    state: Mutex<AggregatorState>,
    events: EventBus,
}

impl<S: Storage> SubmissionAggregator<S> {
    /// Create an aggregator with no active exam.
    pub fn new(storage: S, events: EventBus) -> Self {
        Self { storage, state: Mutex::new(AggregatorState::default()), events }
    }

    /// Storage collaborator.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make run `run` of `exam_id` the active exam, dropping all earlier
    /// submissions.
    pub fn begin_exam(&self, exam_id: &str, run: u64) {
        {
            let mut state = self.lock();
            state.exam_id = Some(exam_id.to_string());
            state.run = run;
            state.accepting = true;
            state.batches.clear();
        }
        self.notify(Some(exam_id.to_string()), 0);
    }

    /// Stop accepting submissions. Stored batches stay visible.
    pub fn close(&self) {
        self.lock().accepting = false;
    }

    /// Wipe in-memory submissions and notify observers.
    pub fn clear(&self) {
        let exam_id = {
            let mut state = self.lock();
            state.batches.clear();
            state.exam_id.clone()
        };
        self.notify(exam_id, 0);
    }

    /// Record `answers` as the complete batch of `participant`.
    pub fn submit(
        &self,
        participant: &str,
        answers: Vec<Answer>,
    ) -> Result<SubmitOutcome, SubmissionError> {
        let Some((exam_id, run)) = self.accepting_exam() else {
            tracing::warn!(participant, "submission received with no active exam, ignoring");
            return Ok(SubmitOutcome::Ignored);
        };

        if let Err(source) = self.storage.save_submission_batch(&exam_id, participant, &answers) {
            tracing::error!(participant, exam_id = %exam_id, error = %source, "failed to persist submission");
            return Err(SubmissionError::Persistence { participant: participant.to_string(), source });
        }

        let (count, replaced) = {
            let mut state = self.lock();
            // The exam may have ended or restarted while storage was writing.
            if !state.accepting || state.run != run {
                tracing::warn!(participant, exam_id = %exam_id, "exam changed during submission, ignoring");
                return Ok(SubmitOutcome::Ignored);
            }
            let replaced = state.batches.insert(participant.to_string(), answers).is_some();
            (state.batches.len(), replaced)
        };

        tracing::info!(participant, exam_id = %exam_id, count, replaced, "submission stored");
        self.notify(Some(exam_id), count);
        Ok(SubmitOutcome::Stored { count, replaced })
    }

    /// Distinct participants with a stored submission.
    pub fn count(&self) -> usize {
        self.lock().batches.len()
    }

    /// Active (or last) exam id.
    pub fn exam_id(&self) -> Option<String> {
        self.lock().exam_id.clone()
    }

    /// Copy of every batch of the current (or last) run.
    pub fn snapshot(&self) -> HashMap<String, Vec<Answer>> {
        self.lock().batches.clone()
    }

    /// Copy of the batch stored for `participant`.
    pub fn batch(&self, participant: &str) -> Option<Vec<Answer>> {
        self.lock().batches.get(participant).cloned()
    }

    fn accepting_exam(&self) -> Option<(String, u64)> {
        let state = self.lock();
        if state.accepting { state.exam_id.clone().map(|id| (id, state.run)) } else { None }
    }

    fn notify(&self, exam_id: Option<String>, count: usize) {
        self.events.emit(CoordinatorEvent::SubmissionCountChanged { exam_id, count });
    }
}
