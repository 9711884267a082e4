//! Error types for the examhall protocol.
//!
//! Frame-level errors ([`ProtocolError::FrameTooLarge`]) poison the byte
//! stream and must close the connection. Envelope-level errors (JSON or body
//! decoding) affect a single frame only; the length prefix keeps the stream
//! aligned for the next frame.

use thiserror::Error;

use crate::MessageKind;

/// Protocol-level errors that can occur during framing and envelope decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame length exceeds the configured maximum
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Size announced by the length prefix (or produced by the encoder)
        size: usize,
        /// Maximum allowed frame size
        max: usize,
    },

    /// Failed to serialize an envelope
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    /// Frame bytes are not a well-formed envelope
    #[error("failed to decode envelope: {0}")]
    Decode(String),

    /// Envelope body does not match the shape required by its kind
    #[error("invalid {kind} body: {reason}")]
    InvalidBody {
        /// Kind announced by the envelope
        kind: MessageKind,
        /// Why the body was rejected
        reason: String,
    },
}

impl ProtocolError {
    /// Returns true if the error desynchronizes the stream.
    ///
    /// Fatal errors require closing the connection. Everything else only
    /// discards the offending frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. })
    }
}

/// Convenient Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_oversized_frames_are_fatal() {
        assert!(ProtocolError::FrameTooLarge { size: 70_000, max: 65_535 }.is_fatal());
        assert!(!ProtocolError::Decode("eof".to_string()).is_fatal());
        assert!(
            !ProtocolError::InvalidBody {
                kind: MessageKind::AnswerSubmit,
                reason: "expected a list".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidBody {
            kind: MessageKind::LoginRequest,
            reason: "missing field".to_string(),
        };
        assert_eq!(err.to_string(), "invalid LOGIN_REQ body: missing field");
    }
}
