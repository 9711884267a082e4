//! Operator console.
//!
//! Line-oriented commands read from stdin by the server binary. Parsing and
//! execution are separate from the I/O so they can be tested directly.

use std::{fmt::Write as _, path::Path};

use examhall_core::{Environment, ExamContent, Storage};

use crate::{
    coordinator::{Coordinator, CoordinatorError},
    error::ServerError,
};

/// One operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// List stored exams
    Exams,
    /// Show lifecycle state and counts
    Status,
    /// List online participants
    Online,
    /// Start a stored exam
    Start(String),
    /// End the running exam
    End,
    /// Grade the finished exam and publish results
    Grade,
    /// Show the command list
    Help,
    /// Stop the server
    Quit,
}

impl OperatorCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };

        let parsed = match command.to_ascii_lowercase().as_str() {
            "exams" => Self::Exams,
            "status" => Self::Status,
            "online" => Self::Online,
            "start" => match words.next() {
                Some(exam_id) => Self::Start(exam_id.to_string()),
                None => return Err("usage: start <exam-id>".to_string()),
            },
            "end" => Self::End,
            "grade" => Self::Grade,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(parsed))
    }
}

/// Command summary printed by `help`.
pub const HELP: &str = "\
commands:
  exams             list stored exams
  status            show exam state, online and submission counts
  online            list online participants
  start <exam-id>   publish a stored exam and start the countdown
  end               end the running exam now
  grade             grade the finished exam and send results
  quit              stop the server";

/// Run `command` and render its output.
pub fn execute<E: Environment, S: Storage>(
    coordinator: &Coordinator<E, S>,
    command: &OperatorCommand,
) -> String {
    match run(coordinator, command) {
        Ok(output) => output,
        Err(e) => format!("error: {e}"),
    }
}

fn run<E: Environment, S: Storage>(
    coordinator: &Coordinator<E, S>,
    command: &OperatorCommand,
) -> Result<String, CoordinatorError> {
    let mut out = String::new();
    match command {
        OperatorCommand::Exams => {
            let exams = coordinator.exams()?;
            if exams.is_empty() {
                out.push_str("no exams loaded");
            }
            for exam in exams {
                let _ = writeln!(
                    out,
                    "{}  {}  ({} questions, {} min, {} points)",
                    exam.exam_id,
                    exam.title,
                    exam.questions.len(),
                    exam.duration_minutes,
                    exam.max_score()
                );
            }
        },
        OperatorCommand::Status => {
            let status = coordinator.status();
            let _ = write!(
                out,
                "state {} | exam {} | online {} | submitted {}",
                status.state,
                status.exam_id.as_deref().unwrap_or("-"),
                status.online,
                status.submissions
            );
            if let Some(remaining) = status.remaining_millis {
                let secs = remaining / 1000;
                let _ = write!(out, " | remaining {:02}:{:02}", secs / 60, secs % 60);
            }
        },
        OperatorCommand::Online => {
            let online = coordinator.online();
            if online.is_empty() {
                out.push_str("nobody online");
            }
            for p in online {
                let _ = writeln!(out, "{}  {}  {}", p.external_id, p.display_name, p.address);
            }
        },
        OperatorCommand::Start(exam_id) => {
            let published = coordinator.start_stored_exam(exam_id)?;
            let _ = write!(
                out,
                "exam {} started: {} questions, {} minutes",
                published.exam_id,
                published.questions.len(),
                published.duration_minutes
            );
        },
        OperatorCommand::End => {
            coordinator.end_exam()?;
            out.push_str("exam ended");
        },
        OperatorCommand::Grade => {
            let summary = coordinator.grade()?;
            let _ = write!(out, "{summary}");
            let mut reports: Vec<_> = summary.reports.iter().collect();
            reports.sort_by(|a, b| a.0.cmp(b.0));
            for (participant, report) in reports {
                let _ = write!(out, "\n  {participant}: {}/{}", report.total_score, report.max_score);
            }
        },
        OperatorCommand::Help => out.push_str(HELP),
        OperatorCommand::Quit => out.push_str("bye"),
    }
    Ok(out.trim_end().to_string())
}

/// Read an exam definition file.
pub fn load_exam_file(path: &Path) -> Result<ExamContent, ServerError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
    ExamContent::from_json(&text)
        .map_err(|e| ServerError::Config(format!("invalid exam file {}: {e}", path.display())))
}
