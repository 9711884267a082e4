//! Answer grading.
//!
//! Grading runs only after an exam has finished. Scoring is per question and
//! all-or-nothing.

use std::{collections::HashMap, fmt};

use examhall_proto::{Answer, QuestionType, ScoreReport};

use crate::exam::{ExamContent, Question};

/// Points earned by `submitted` on `question`.
///
/// A question without an answer key, or a blank answer, scores zero. Choice,
/// judge and fill-in answers are compared trimmed and case-insensitively.
/// Multi-choice answers are compared as sorted characters so `"BA"` matches
/// `"AB"`.
pub fn score_answer(question: &Question, submitted: &str) -> u32 {
    let Some(key) = question.answer_key.as_deref() else {
        return 0;
    };
    let key = key.trim();
    let submitted = submitted.trim();
    if submitted.is_empty() {
        return 0;
    }

    let correct = match question.kind {
        QuestionType::SingleChoice | QuestionType::Judge | QuestionType::FillIn => {
            key.to_lowercase() == submitted.to_lowercase()
        },
        QuestionType::MultiChoice => sorted_chars(key) == sorted_chars(submitted),
    };

    if correct { question.score } else { 0 }
}

fn sorted_chars(s: &str) -> Vec<char> {
    let mut chars: Vec<char> = s.chars().collect();
    chars.sort_unstable();
    chars
}

/// Score one participant's batch. Answers to unknown questions are ignored.
pub fn grade_submission(exam: &ExamContent, answers: &[Answer]) -> ScoreReport {
    let total_score = answers
        .iter()
        .filter_map(|a| exam.question(&a.question_id).map(|q| score_answer(q, &a.answer_text)))
        .fold(0, u32::saturating_add);

    ScoreReport { exam_id: exam.exam_id.clone(), total_score, max_score: exam.max_score() }
}

/// Outcome of grading every submission for one exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingSummary {
    /// Graded exam
    pub exam_id: String,
    /// Per-participant reports keyed by external id
    pub reports: HashMap<String, ScoreReport>,
    /// Answers that matched a question of the exam
    pub answers_graded: usize,
}

impl GradingSummary {
    /// Number of participants graded.
    pub fn participants_graded(&self) -> usize {
        self.reports.len()
    }
}

impl fmt::Display for GradingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return f.write_str("No new submissions to grade.");
        }
        write!(
            f,
            "Grading complete. Graded {} answers for {} students.",
            self.answers_graded,
            self.participants_graded()
        )
    }
}

/// Grade every participant's batch.
pub fn grade_exam<'a, I>(exam: &ExamContent, submissions: I) -> GradingSummary
where
    I: IntoIterator<Item = (&'a String, &'a Vec<Answer>)>,
{
    let mut reports = HashMap::new();
    let mut answers_graded = 0;

    for (participant, answers) in submissions {
        answers_graded += answers.iter().filter(|a| exam.question(&a.question_id).is_some()).count();
        reports.insert(participant.clone(), grade_submission(exam, answers));
    }

    GradingSummary { exam_id: exam.exam_id.clone(), reports, answers_graded }
}
