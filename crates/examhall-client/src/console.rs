//! Participant console.
//!
//! Commands typed by the participant and the local answer sheet they edit.
//! The binary owns the stdin loop; everything here is plain data.

use std::{collections::BTreeMap, fmt::Write as _};

use examhall_proto::{Answer, PublishedExam};

/// One participant command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantCommand {
    /// Record an answer locally
    Answer {
        /// Question being answered
        question_id: String,
        /// Answer text, e.g. `B` or `ACD`
        text: String,
    },
    /// Send the whole sheet to the coordinator
    Submit,
    /// Show the current exam and recorded answers
    Show,
    /// Show the command list
    Help,
    /// Disconnect and exit
    Quit,
}

/// Command summary printed by `help`.
pub const HELP: &str = "\
commands:
  answer <question-id> <text>   record an answer (multi-choice: letters, e.g. ACD)
  submit                        send all recorded answers
  show                          show the exam and your answers
  quit                          disconnect and exit";

impl ParticipantCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        if command.is_empty() {
            return Ok(None);
        }

        let parsed = match command.to_ascii_lowercase().as_str() {
            "answer" | "a" => {
                let rest = rest.trim_start();
                let (question_id, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let text = text.trim();
                if question_id.is_empty() || text.is_empty() {
                    return Err("usage: answer <question-id> <text>".to_string());
                }
                Self::Answer { question_id: question_id.to_string(), text: text.to_string() }
            },
            "submit" => Self::Submit,
            "show" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(parsed))
    }
}

/// Answers recorded for the current exam.
#[derive(Debug, Clone, Default)]
pub struct AnswerSheet {
    exam: Option<PublishedExam>,
    answers: BTreeMap<String, String>,
}

impl AnswerSheet {
    /// Empty sheet with no exam.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exam the sheet belongs to.
    pub fn exam(&self) -> Option<&PublishedExam> {
        self.exam.as_ref()
    }

    /// Whether the sheet belongs to this run of `exam`.
    pub fn is_for(&self, exam: &PublishedExam) -> bool {
        self.exam
            .as_ref()
            .is_some_and(|current| current.exam_id == exam.exam_id && current.start_time == exam.start_time)
    }

    /// Switch to `exam`. Answers are kept when the same exam is delivered
    /// again after a reconnect, and cleared for a different one.
    pub fn start(&mut self, exam: PublishedExam) {
        if !self.is_for(&exam) {
            self.answers.clear();
        }
        self.exam = Some(exam);
    }

    /// Merge answers recovered from the cache. Answers already on the sheet
    /// win; answers to unknown questions are dropped. Returns how many were
    /// taken.
    pub fn restore(&mut self, cached: BTreeMap<String, String>) -> usize {
        let Some(exam) = &self.exam else {
            return 0;
        };
        let mut restored = 0;
        for (question_id, text) in cached {
            if exam.questions.iter().any(|q| q.id == question_id)
                && !self.answers.contains_key(&question_id)
            {
                self.answers.insert(question_id, text);
                restored += 1;
            }
        }
        restored
    }

    /// Recorded answers keyed by question id.
    pub fn recorded(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    /// Record an answer, replacing any earlier one for the question.
    pub fn record(&mut self, question_id: &str, text: &str) -> Result<(), String> {
        let Some(exam) = &self.exam else {
            return Err("no exam in progress".to_string());
        };
        if !exam.questions.iter().any(|q| q.id == question_id) {
            return Err(format!("no question '{question_id}' in {}", exam.exam_id));
        }
        self.answers.insert(question_id.to_string(), text.to_string());
        Ok(())
    }

    /// Recorded answers in question-id order.
    pub fn answers(&self) -> Vec<Answer> {
        self.answers.iter().map(|(id, text)| Answer::new(id.clone(), text.clone())).collect()
    }

    /// Human-readable view of the exam and the recorded answers.
    pub fn render(&self, now_millis: i64) -> String {
        let Some(exam) = &self.exam else {
            return "no exam yet".to_string();
        };
        let remaining = exam.remaining_millis(now_millis) / 1000;
        let mut out = format!(
            "{} ({}), {} points, {:02}:{:02} left",
            exam.title,
            exam.exam_id,
            exam.max_score(),
            remaining / 60,
            remaining % 60
        );
        for q in &exam.questions {
            let _ = write!(out, "\n[{}] ({} pts, {:?}) {}", q.id, q.score, q.kind, q.title);
            for (i, option) in q.options.iter().enumerate() {
                let letter = char::from(b'A' + u8::try_from(i % 26).unwrap_or(0));
                let _ = write!(out, "\n    {letter}. {option}");
            }
            if let Some(answer) = self.answers.get(&q.id) {
                let _ = write!(out, "\n    your answer: {answer}");
            }
        }
        out
    }
}
