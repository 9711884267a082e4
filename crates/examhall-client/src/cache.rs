//! On-disk answer cache.
//!
//! Answers typed during an exam are written to one JSON file per exam and
//! participant, so a restarted client picks up where it left off. A cached
//! sheet is tied to the exam run's start time; a later run of the same exam
//! never sees it.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use examhall_proto::PublishedExam;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the answer cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading, writing or removing a cache file failed
    #[error("answer cache {path}: {source}")]
    Io {
        /// File concerned
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Cache file is not a cached sheet
    #[error("answer cache {path} is corrupt: {source}")]
    Corrupt {
        /// File concerned
        path: PathBuf,
        /// Decode error
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSheet {
    exam_id: String,
    start_time: i64,
    answers: BTreeMap<String, String>,
}

/// Directory of cached answer sheets.
#[derive(Debug, Clone)]
pub struct AnswerCache {
    dir: PathBuf,
}

impl AnswerCache {
    /// Cache rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$HOME/.examhall/cache`, if a home directory is known.
    pub fn default_dir() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| Path::new(&home).join(".examhall").join("cache"))
    }

    fn path(&self, exam_id: &str, participant: &str) -> PathBuf {
        let safe = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect()
        };
        self.dir.join(format!("{}_{}.json", safe(exam_id), safe(participant)))
    }

    /// Replace the cached sheet of `participant` for this exam run.
    pub fn save(
        &self,
        exam: &PublishedExam,
        participant: &str,
        answers: &BTreeMap<String, String>,
    ) -> Result<(), CacheError> {
        let path = self.path(&exam.exam_id, participant);
        let sheet = CachedSheet {
            exam_id: exam.exam_id.clone(),
            start_time: exam.start_time,
            answers: answers.clone(),
        };
        let json = serde_json::to_vec_pretty(&sheet)
            .map_err(|source| CacheError::Corrupt { path: path.clone(), source })?;

        fs::create_dir_all(&self.dir)
            .and_then(|()| fs::write(&path, json))
            .map_err(|source| CacheError::Io { path, source })
    }

    /// Cached answers of `participant` for this exam run.
    ///
    /// A missing file, or one left by a different run, yields no answers.
    pub fn load(
        &self,
        exam: &PublishedExam,
        participant: &str,
    ) -> Result<BTreeMap<String, String>, CacheError> {
        let path = self.path(&exam.exam_id, participant);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let sheet: CachedSheet = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Corrupt { path: path.clone(), source })?;

        if sheet.exam_id != exam.exam_id || sheet.start_time != exam.start_time {
            tracing::debug!(path = %path.display(), "cached sheet belongs to another run, ignoring");
            return Ok(BTreeMap::new());
        }
        Ok(sheet.answers)
    }

    /// Drop the cached sheet. Missing files are fine.
    pub fn clear(&self, exam_id: &str, participant: &str) -> Result<(), CacheError> {
        let path = self.path(exam_id, participant);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use examhall_proto::{PublishedQuestion, QuestionType};

    use super::*;

    fn exam(start_time: i64) -> PublishedExam {
        PublishedExam {
            exam_id: "quiz/1".to_string(),
            title: "Quiz 1".to_string(),
            duration_minutes: 10,
            start_time,
            questions: vec![PublishedQuestion {
                id: "q1".to_string(),
                exam_id: "quiz/1".to_string(),
                title: "Pick one".to_string(),
                kind: QuestionType::SingleChoice,
                options: vec!["red".to_string(), "blue".to_string()],
                score: 5,
            }],
        }
    }

    fn answers() -> BTreeMap<String, String> {
        BTreeMap::from([("q1".to_string(), "B".to_string())])
    }

    #[test]
    fn saved_sheet_loads_for_same_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnswerCache::new(dir.path().join("nested"));

        cache.save(&exam(1_000), "S1", &answers()).unwrap();
        assert_eq!(cache.load(&exam(1_000), "S1").unwrap(), answers());
        assert!(cache.load(&exam(1_000), "S2").unwrap().is_empty());
    }

    #[test]
    fn other_run_of_same_exam_starts_blank() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnswerCache::new(dir.path());

        cache.save(&exam(1_000), "S1", &answers()).unwrap();
        assert!(cache.load(&exam(2_000), "S1").unwrap().is_empty());
    }

    #[test]
    fn clear_removes_sheet_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnswerCache::new(dir.path());

        cache.save(&exam(1_000), "S1", &answers()).unwrap();
        cache.clear("quiz/1", "S1").unwrap();
        cache.clear("quiz/1", "S1").unwrap();
        assert!(cache.load(&exam(1_000), "S1").unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnswerCache::new(dir.path());
        fs::write(cache.path("quiz/1", "S1"), b"not json").unwrap();

        assert!(matches!(cache.load(&exam(1_000), "S1"), Err(CacheError::Corrupt { .. })));
    }
}
