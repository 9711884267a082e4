//! Message envelope.
//!
//! [`RawEnvelope`] is the first decoding phase: it mirrors the JSON object on
//! the wire and leaves `body` untyped. [`Envelope`] is the second phase, with
//! the body resolved into a [`Payload`] that always agrees with the kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MessageKind, Payload, ProtocolError, Result};

/// Envelope as it appears on the wire, body not yet interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Construction time, unix milliseconds
    #[serde(default)]
    pub timestamp: i64,
    /// Kind-specific body
    #[serde(default)]
    pub body: Value,
}

impl RawEnvelope {
    /// Parse one frame's bytes. Unknown top-level fields are ignored.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Typed envelope.
///
/// The timestamp is fixed at construction and there is no setter. The kind is
/// derived from the payload, so the two cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    timestamp: i64,
    payload: Payload,
}

impl Envelope {
    /// Wrap a payload, stamping it with `timestamp` (unix milliseconds).
    pub fn new(payload: Payload, timestamp: i64) -> Self {
        Self { timestamp, payload }
    }

    /// Message kind.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Construction time, unix milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Typed body.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the envelope, returning the body.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// First phase of encoding: typed body to untyped JSON.
    pub fn to_raw(&self) -> Result<RawEnvelope> {
        Ok(RawEnvelope {
            kind: self.kind(),
            timestamp: self.timestamp,
            body: self.payload.encode_body()?,
        })
    }

    /// Second phase of decoding: resolve the body by kind.
    pub fn from_raw(raw: RawEnvelope) -> Result<Self> {
        let payload = Payload::decode(raw.kind, raw.body)?;
        Ok(Self { timestamp: raw.timestamp, payload })
    }

    /// Serialize to JSON text.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let raw = self.to_raw()?;
        serde_json::to_vec(&raw).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse JSON text, running both decoding phases.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_raw(RawEnvelope::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Answer, LoginResponse, ParticipantIdentity};

    #[test]
    fn wire_shape_matches_classroom_clients() {
        let envelope = Envelope::new(
            Payload::LoginResponse(LoginResponse::accepted("Login successful. Welcome!")),
            1_700_000_000_123,
        );

        let value: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "LOGIN_RESP",
                "timestamp": 1_700_000_000_123_i64,
                "body": {"success": true, "message": "Login successful. Welcome!"}
            })
        );
    }

    #[test]
    fn decodes_java_style_login() {
        let bytes = br#"{"type":"LOGIN_REQ","timestamp":1700000000000,
            "body":{"id":"2024001","name":"Ann","ip":null,"online":false,"grade":"7B"}}"#;

        let envelope = Envelope::from_bytes(bytes).unwrap();
        assert_eq!(envelope.kind(), MessageKind::LoginRequest);
        assert_eq!(envelope.timestamp(), 1_700_000_000_000);
        match envelope.payload() {
            Payload::LoginRequest(identity) => {
                assert_eq!(identity, &ParticipantIdentity::new("2024001", "Ann"));
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unknown_top_level_fields_are_ignored() {
        let bytes = br#"{"type":"HEARTBEAT","timestamp":5,"body":"ping","version":3}"#;
        let envelope = Envelope::from_bytes(bytes).unwrap();
        assert_eq!(envelope.payload(), &Payload::Heartbeat);
    }

    #[test]
    fn unknown_kind_fails_first_phase() {
        let err = Envelope::from_bytes(br#"{"type":"SCREEN_SHARE","body":null}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn two_phase_decode_defers_body() {
        let raw = RawEnvelope::from_slice(
            br#"{"type":"ANSWER_SUBMIT","timestamp":9,"body":[{"questionId":"q1","answer":"AB"}]}"#,
        )
        .unwrap();
        assert_eq!(raw.kind, MessageKind::AnswerSubmit);
        assert!(raw.body.is_array());

        let envelope = Envelope::from_raw(raw).unwrap();
        assert_eq!(envelope.into_payload(), Payload::AnswerSubmit(vec![Answer::new("q1", "AB")]));
    }
}
