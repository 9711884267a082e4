//! Message kinds.
//!
//! The set is closed: a frame announcing any other kind fails envelope
//! decoding and is dropped by the receiver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminator carried in every envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Participant asks to join with its identity
    #[serde(rename = "LOGIN_REQ")]
    LoginRequest,
    /// Coordinator accepts or rejects a login
    #[serde(rename = "LOGIN_RESP")]
    LoginResponse,
    /// No exam is running yet
    #[serde(rename = "EXAM_WAITING")]
    WaitingNotice,
    /// Published exam content
    #[serde(rename = "EXAM_START")]
    ExamStart,
    /// The running exam is over
    #[serde(rename = "EXAM_END")]
    ExamEnd,
    /// Participant answers for the running exam
    #[serde(rename = "ANSWER_SUBMIT")]
    AnswerSubmit,
    /// Graded result for one participant
    #[serde(rename = "RESULT_PUB")]
    ResultPublish,
    /// Keepalive
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
}

impl MessageKind {
    /// All kinds, in wire-declaration order.
    pub const ALL: [Self; 8] = [
        Self::LoginRequest,
        Self::LoginResponse,
        Self::WaitingNotice,
        Self::ExamStart,
        Self::ExamEnd,
        Self::AnswerSubmit,
        Self::ResultPublish,
        Self::Heartbeat,
    ];

    /// Wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginRequest => "LOGIN_REQ",
            Self::LoginResponse => "LOGIN_RESP",
            Self::WaitingNotice => "EXAM_WAITING",
            Self::ExamStart => "EXAM_START",
            Self::ExamEnd => "EXAM_END",
            Self::AnswerSubmit => "ANSWER_SUBMIT",
            Self::ResultPublish => "RESULT_PUB",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
