//! Typed message bodies.
//!
//! [`Payload`] is a closed sum type with one variant per [`MessageKind`].
//! Decoding dispatches on the kind read from the envelope header, so adding a
//! kind without a body decoder is a compile error.

pub mod answer;
pub mod exam;
pub mod session;

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

use self::{
    answer::{Answer, ScoreReport},
    exam::PublishedExam,
    session::{LoginResponse, ParticipantIdentity},
};
use crate::{MessageKind, ProtocolError, Result};

/// Body sent with every heartbeat.
pub const HEARTBEAT_BODY: &str = "ping";

/// Typed envelope body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Participant asks to join with its identity
    LoginRequest(ParticipantIdentity),
    /// Coordinator accepts or rejects a login
    LoginResponse(LoginResponse),
    /// Human readable notice while no exam is running
    WaitingNotice(String),
    /// Published exam content, never carrying answer keys
    ExamStart(PublishedExam),
    /// The running exam is over
    ExamEnd,
    /// Full answer batch for the running exam
    AnswerSubmit(Vec<Answer>),
    /// Graded result for the receiving participant
    ResultPublish(ScoreReport),
    /// Keepalive, body ignored on receipt
    Heartbeat,
}

impl Payload {
    /// Kind that announces this payload on the wire.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::LoginRequest(_) => MessageKind::LoginRequest,
            Self::LoginResponse(_) => MessageKind::LoginResponse,
            Self::WaitingNotice(_) => MessageKind::WaitingNotice,
            Self::ExamStart(_) => MessageKind::ExamStart,
            Self::ExamEnd => MessageKind::ExamEnd,
            Self::AnswerSubmit(_) => MessageKind::AnswerSubmit,
            Self::ResultPublish(_) => MessageKind::ResultPublish,
            Self::Heartbeat => MessageKind::Heartbeat,
        }
    }

    /// Encode the body as an untyped JSON value.
    pub fn encode_body(&self) -> Result<Value> {
        let value = match self {
            Self::LoginRequest(identity) => to_value(identity)?,
            Self::LoginResponse(response) => to_value(response)?,
            Self::WaitingNotice(notice) => Value::String(notice.clone()),
            Self::ExamStart(exam) => to_value(exam)?,
            Self::ExamEnd => Value::Null,
            Self::AnswerSubmit(answers) => to_value(answers)?,
            Self::ResultPublish(report) => to_value(report)?,
            Self::Heartbeat => Value::String(HEARTBEAT_BODY.to_string()),
        };
        Ok(value)
    }

    /// Resolve an untyped body once its kind is known.
    ///
    /// Unknown fields inside the body are ignored. Bodies of kinds that carry
    /// no information (`EXAM_END`, `HEARTBEAT`) are not inspected.
    pub fn decode(kind: MessageKind, body: Value) -> Result<Self> {
        let payload = match kind {
            MessageKind::LoginRequest => Self::LoginRequest(from_value(kind, body)?),
            MessageKind::LoginResponse => Self::LoginResponse(from_value(kind, body)?),
            MessageKind::WaitingNotice => match body {
                Value::String(notice) => Self::WaitingNotice(notice),
                Value::Null => Self::WaitingNotice(String::new()),
                other => {
                    return Err(ProtocolError::InvalidBody {
                        kind,
                        reason: format!("expected a string, got {other}"),
                    });
                },
            },
            MessageKind::ExamStart => Self::ExamStart(from_value(kind, body)?),
            MessageKind::ExamEnd => Self::ExamEnd,
            MessageKind::AnswerSubmit => Self::AnswerSubmit(from_value(kind, body)?),
            MessageKind::ResultPublish => Self::ResultPublish(from_value(kind, body)?),
            MessageKind::Heartbeat => Self::Heartbeat,
        };
        Ok(payload)
    }
}

fn to_value<T: Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn from_value<T: DeserializeOwned>(kind: MessageKind, body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| ProtocolError::InvalidBody { kind, reason: e.to_string() })
}

/// Deserialize `null` as the type's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_matches_variant() {
        let payloads = [
            Payload::LoginRequest(ParticipantIdentity::new("s1", "Ann")),
            Payload::LoginResponse(LoginResponse::accepted("ok")),
            Payload::WaitingNotice("wait".to_string()),
            Payload::ExamEnd,
            Payload::AnswerSubmit(vec![Answer::new("q1", "A")]),
            Payload::Heartbeat,
        ];

        for payload in payloads {
            let body = payload.encode_body().unwrap();
            let decoded = Payload::decode(payload.kind(), body).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn heartbeat_body_is_ping() {
        assert_eq!(Payload::Heartbeat.encode_body().unwrap(), json!("ping"));
        assert_eq!(Payload::ExamEnd.encode_body().unwrap(), Value::Null);
    }

    #[test]
    fn heartbeat_ignores_body_content() {
        let decoded = Payload::decode(MessageKind::Heartbeat, json!({"anything": 1})).unwrap();
        assert_eq!(decoded, Payload::Heartbeat);
    }

    #[test]
    fn wrong_body_shape_is_reported_with_kind() {
        let err = Payload::decode(MessageKind::AnswerSubmit, json!({"questionId": "q1"}))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidBody { kind: MessageKind::AnswerSubmit, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn waiting_notice_rejects_objects() {
        let err = Payload::decode(MessageKind::WaitingNotice, json!({"text": "hi"})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidBody { .. }));
    }

    #[test]
    fn answer_submit_ignores_unknown_fields() {
        let body = json!([{"questionId": "q1", "answer": "B", "confidence": 0.9}]);
        let decoded = Payload::decode(MessageKind::AnswerSubmit, body).unwrap();
        assert_eq!(decoded, Payload::AnswerSubmit(vec![Answer::new("q1", "B")]));
    }
}
