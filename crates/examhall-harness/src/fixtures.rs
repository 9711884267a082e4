//! Exam content shared by the simulation tests.

use examhall_core::ExamContent;
use examhall_proto::Answer;

/// Two-question quiz: `q1` single choice worth 5 (key `B`), `q2` multiple
/// choice worth 10 (key `ABD`).
pub fn quiz(exam_id: &str, duration_minutes: u32) -> ExamContent {
    ExamContent::from_json(&format!(
        r#"{{
            "examId": "{exam_id}",
            "title": "Quiz {exam_id}",
            "durationMinutes": {duration_minutes},
            "questions": [
                {{"id": "q1", "title": "Which is a prime?", "type": "SINGLE_CHOICE",
                  "options": ["4", "7", "9"], "score": 5, "correctAnswer": "B"}},
                {{"id": "q2", "title": "Which are even?", "type": "MULTI_CHOICE",
                  "options": ["2", "4", "5", "6"], "score": 10, "correctAnswer": "ABD"}}
            ]
        }}"#
    ))
    .unwrap_or_else(|e| unreachable!("fixture exam is valid JSON: {e}"))
}

/// Answers scoring full marks on [`quiz`].
pub fn perfect_answers() -> Vec<Answer> {
    vec![Answer::new("q1", "b"), Answer::new("q2", "DBA")]
}

/// Answers scoring only `q1` on [`quiz`].
pub fn partial_answers() -> Vec<Answer> {
    vec![Answer::new("q1", "B"), Answer::new("q2", "AB")]
}
