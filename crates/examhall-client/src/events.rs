//! Participant-side notifications.

use std::time::Duration;

use examhall_proto::{PublishedExam, ScoreReport};

/// Something the participant's front end may want to show.
///
/// Delivered on a Tokio broadcast channel from the controller's background
/// task. A slow subscriber lags and skips events; it never stalls the
/// session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    /// Stream to the coordinator established
    Connected,
    /// Login accepted
    LoggedIn {
        /// Coordinator's greeting
        message: String,
    },
    /// Login refused; no further reconnection attempts
    LoginRejected {
        /// Coordinator's reason
        reason: String,
    },
    /// No exam running yet
    Waiting(String),
    /// Exam content arrived (initial broadcast or late join)
    ExamStarted(PublishedExam),
    /// The exam is over; submissions are closed
    ExamEnded,
    /// Graded result
    Result(ScoreReport),
    /// Session dropped
    Disconnected,
    /// Retry scheduled
    Reconnecting {
        /// Retry number, starting at 0
        attempt: u32,
        /// Wait before the attempt
        delay: Duration,
    },
    /// Retries exhausted
    GaveUp {
        /// Retries spent
        attempts: u32,
    },
}
