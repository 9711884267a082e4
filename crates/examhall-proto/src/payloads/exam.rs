//! Published exam content.
//!
//! These are the only exam types that can travel over the wire. They have no
//! answer-key field at all, so a published question cannot leak the key no
//! matter how it is built or serialized.

use serde::{Deserialize, Serialize};

use super::null_as_default;

/// Question format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    /// Exactly one option is correct
    SingleChoice,
    /// Any subset of options may be correct
    MultiChoice,
    /// True/false
    Judge,
    /// Free text
    FillIn,
}

/// A question as participants see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedQuestion {
    /// Question identifier
    pub id: String,
    /// Exam the question belongs to
    #[serde(default, deserialize_with = "null_as_default")]
    pub exam_id: String,
    /// Question text
    pub title: String,
    /// Question format
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Answer options (empty for fill-in questions)
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    /// Points awarded for a correct answer
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: u32,
}

/// An exam as participants see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedExam {
    /// Exam identifier
    pub exam_id: String,
    /// Exam title
    pub title: String,
    /// Allowed duration in minutes
    pub duration_minutes: u32,
    /// Official start, unix milliseconds
    pub start_time: i64,
    /// Questions without answer keys
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<PublishedQuestion>,
}

impl PublishedExam {
    /// Official end of the exam, unix milliseconds.
    pub fn ends_at_millis(&self) -> i64 {
        self.start_time.saturating_add(i64::from(self.duration_minutes) * 60_000)
    }

    /// Milliseconds left at `now_millis`, clamped at zero.
    pub fn remaining_millis(&self, now_millis: i64) -> i64 {
        self.ends_at_millis().saturating_sub(now_millis).max(0)
    }

    /// Maximum attainable score.
    pub fn max_score(&self) -> u32 {
        self.questions.iter().map(|q| q.score).fold(0, u32::saturating_add)
    }
}
