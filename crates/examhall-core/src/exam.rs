//! Authoritative exam content.
//!
//! [`ExamContent`] carries answer keys and therefore deliberately does not
//! implement `Serialize`. The only way to put exam content into an envelope is
//! [`ExamContent::publish`], which produces the wire types from
//! `examhall_proto`, and those have no answer-key field to fill.

use examhall_proto::{PublishedExam, PublishedQuestion, QuestionType};
use serde::Deserialize;

/// A question with its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question identifier, unique within the exam
    pub id: String,
    /// Question text
    pub title: String,
    /// Question format
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Answer options (empty for fill-in questions)
    #[serde(default)]
    pub options: Vec<String>,
    /// Points awarded for a correct answer
    #[serde(default)]
    pub score: u32,
    /// Expected answer; `None` means the question cannot be auto-graded
    #[serde(rename = "correctAnswer", default)]
    pub answer_key: Option<String>,
}

/// Exam definition as held by the coordinator.
///
/// Loaded from operator-supplied JSON files, which use the same camelCase
/// field names as the wire format plus `correctAnswer` on each question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamContent {
    /// Exam identifier
    pub exam_id: String,
    /// Exam title
    pub title: String,
    /// Allowed duration in minutes
    pub duration_minutes: u32,
    /// Questions with answer keys
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl ExamContent {
    /// Parse an exam definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Strip answer keys and stamp the official start time.
    pub fn publish(&self, start_millis: i64) -> PublishedExam {
        PublishedExam {
            exam_id: self.exam_id.clone(),
            title: self.title.clone(),
            duration_minutes: self.duration_minutes,
            start_time: start_millis,
            questions: self
                .questions
                .iter()
                .map(|q| PublishedQuestion {
                    id: q.id.clone(),
                    exam_id: self.exam_id.clone(),
                    title: q.title.clone(),
                    kind: q.kind,
                    options: q.options.clone(),
                    score: q.score,
                })
                .collect(),
        }
    }

    /// Sum of all question scores.
    pub fn max_score(&self) -> u32 {
        self.questions.iter().map(|q| q.score).fold(0, u32::saturating_add)
    }

    /// Look up a question by id.
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}
