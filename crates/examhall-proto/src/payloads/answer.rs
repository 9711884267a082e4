//! Answer submission and result publication payloads.

use serde::{Deserialize, Serialize};

use super::null_as_default;

/// One answer in a submission batch.
///
/// Choice questions carry option letters (`"A"`, `"AB"`), fill-in questions
/// carry free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Question being answered
    pub question_id: String,
    /// Answer content
    #[serde(rename = "answer", default, deserialize_with = "null_as_default")]
    pub answer_text: String,
}

impl Answer {
    /// Create an answer.
    pub fn new(question_id: impl Into<String>, answer_text: impl Into<String>) -> Self {
        Self { question_id: question_id.into(), answer_text: answer_text.into() }
    }
}

/// Graded result sent to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    /// Graded exam
    pub exam_id: String,
    /// Points earned
    pub total_score: u32,
    /// Points available
    pub max_score: u32,
}
