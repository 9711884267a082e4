//! Persistence collaborator.
//!
//! The core treats storage as a set of synchronous calls that may fail. The
//! submission aggregator calls [`Storage::save_submission_batch`] before
//! touching its in-memory state, so a failed write never shows up as a
//! submitted participant.
//!
//! Two implementations ship with the core: [`MemoryStorage`] for tests and
//! single-process deployments, and [`ChaoticStorage`], a wrapper that fails
//! writes on demand.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use examhall_proto::Answer;
use thiserror::Error;

use crate::exam::ExamContent;

/// Errors from storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend could not complete the write
    #[error("storage write failed: {0}")]
    WriteFailed(String),

    /// Backend could not complete the read
    #[error("storage read failed: {0}")]
    ReadFailed(String),
}

/// Durable store for exams and submissions.
pub trait Storage: Send + Sync + 'static {
    /// Replace the stored batch of `participant_id` for `exam_id`.
    fn save_submission_batch(
        &self,
        exam_id: &str,
        participant_id: &str,
        answers: &[Answer],
    ) -> Result<(), StorageError>;

    /// All stored batches for `exam_id`, keyed by participant.
    fn load_submissions(&self, exam_id: &str) -> Result<HashMap<String, Vec<Answer>>, StorageError>;

    /// Look up an exam definition.
    fn load_exam(&self, exam_id: &str) -> Result<Option<ExamContent>, StorageError>;

    /// Insert an exam, replacing any exam with the same id.
    fn save_exam(&self, exam: &ExamContent) -> Result<(), StorageError>;

    /// Remove an exam. Returns whether it existed.
    fn delete_exam(&self, exam_id: &str) -> Result<bool, StorageError>;

    /// Every stored exam, ordered by id.
    fn list_exams(&self) -> Result<Vec<ExamContent>, StorageError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    exams: BTreeMap<String, ExamContent>,
    submissions: HashMap<String, HashMap<String, Vec<Answer>>>,
}

/// In-memory storage. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MemoryInner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }
}

impl Storage for MemoryStorage {
    fn save_submission_batch(
        &self,
        exam_id: &str,
        participant_id: &str,
        answers: &[Answer],
    ) -> Result<(), StorageError> {
        self.with(|inner| {
            inner
                .submissions
                .entry(exam_id.to_string())
                .or_default()
                .insert(participant_id.to_string(), answers.to_vec());
        });
        Ok(())
    }

    fn load_submissions(&self, exam_id: &str) -> Result<HashMap<String, Vec<Answer>>, StorageError> {
        Ok(self.with(|inner| inner.submissions.get(exam_id).cloned().unwrap_or_default()))
    }

    fn load_exam(&self, exam_id: &str) -> Result<Option<ExamContent>, StorageError> {
        Ok(self.with(|inner| inner.exams.get(exam_id).cloned()))
    }

    fn save_exam(&self, exam: &ExamContent) -> Result<(), StorageError> {
        self.with(|inner| inner.exams.insert(exam.exam_id.clone(), exam.clone()));
        Ok(())
    }

    fn delete_exam(&self, exam_id: &str) -> Result<bool, StorageError> {
        Ok(self.with(|inner| inner.exams.remove(exam_id).is_some()))
    }

    fn list_exams(&self) -> Result<Vec<ExamContent>, StorageError> {
        Ok(self.with(|inner| inner.exams.values().cloned().collect()))
    }
}

/// Storage wrapper that fails every write while switched on.
///
/// Reads always pass through. Clones share the switch.
#[derive(Debug, Clone)]
pub struct ChaoticStorage<S> {
    inner: S,
    failing: Arc<AtomicBool>,
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner`, initially healthy.
    pub fn new(inner: S) -> Self {
        Self { inner, failing: Arc::new(AtomicBool::new(false)) }
    }

    /// Turn write failures on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_write(&self, what: &str) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed(format!("injected fault during {what}")));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn save_submission_batch(
        &self,
        exam_id: &str,
        participant_id: &str,
        answers: &[Answer],
    ) -> Result<(), StorageError> {
        self.check_write("save_submission_batch")?;
        self.inner.save_submission_batch(exam_id, participant_id, answers)
    }

    fn load_submissions(&self, exam_id: &str) -> Result<HashMap<String, Vec<Answer>>, StorageError> {
        self.inner.load_submissions(exam_id)
    }

    fn load_exam(&self, exam_id: &str) -> Result<Option<ExamContent>, StorageError> {
        self.inner.load_exam(exam_id)
    }

    fn save_exam(&self, exam: &ExamContent) -> Result<(), StorageError> {
        self.check_write("save_exam")?;
        self.inner.save_exam(exam)
    }

    fn delete_exam(&self, exam_id: &str) -> Result<bool, StorageError> {
        self.check_write("delete_exam")?;
        self.inner.delete_exam(exam_id)
    }

    fn list_exams(&self) -> Result<Vec<ExamContent>, StorageError> {
        self.inner.list_exams()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::fixtures::quiz1;

    #[test]
    fn save_exam_replaces_by_id() {
        let storage = MemoryStorage::new();
        let mut exam = quiz1();
        storage.save_exam(&exam).unwrap();

        exam.title = "Quiz 1 (revised)".to_string();
        storage.save_exam(&exam).unwrap();

        let exams = storage.list_exams().unwrap();
        assert_eq!(exams.len(), 1);
        assert_eq!(exams[0].title, "Quiz 1 (revised)");
    }

    #[test]
    fn delete_reports_existence() {
        let storage = MemoryStorage::new();
        storage.save_exam(&quiz1()).unwrap();

        assert_eq!(storage.delete_exam("quiz1"), Ok(true));
        assert_eq!(storage.delete_exam("quiz1"), Ok(false));
        assert_eq!(storage.load_exam("quiz1"), Ok(None));
    }

    #[test]
    fn submission_batches_are_replaced_not_merged() {
        let storage = MemoryStorage::new();
        storage.save_submission_batch("quiz1", "S1", &[Answer::new("q1", "A")]).unwrap();
        storage.save_submission_batch("quiz1", "S1", &[Answer::new("q2", "B")]).unwrap();

        let stored = storage.load_submissions("quiz1").unwrap();
        assert_eq!(stored["S1"], vec![Answer::new("q2", "B")]);
    }

    #[test]
    fn chaotic_storage_fails_writes_only() {
        let storage = ChaoticStorage::new(MemoryStorage::new());
        storage.save_exam(&quiz1()).unwrap();

        storage.set_failing(true);
        assert!(matches!(
            storage.save_submission_batch("quiz1", "S1", &[]),
            Err(StorageError::WriteFailed(_))
        ));
        assert!(storage.load_exam("quiz1").unwrap().is_some());

        storage.set_failing(false);
        assert!(storage.save_submission_batch("quiz1", "S1", &[]).is_ok());
    }
}
