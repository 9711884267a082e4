//! Client error types.

use examhall_core::TransportError;
use examhall_proto::ProtocolError;
use thiserror::Error;

/// Errors from participant operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No live session to send on.
    #[error("not connected to the coordinator")]
    NotConnected,

    /// The coordinator refused the login; reconnection is disabled.
    #[error("login rejected: {reason}")]
    Rejected {
        /// Reason given by the coordinator.
        reason: String,
    },

    /// Retries exhausted without reaching the coordinator.
    #[error("gave up after {attempts} reconnection attempts")]
    GaveUp {
        /// Retries spent.
        attempts: u32,
    },

    /// The client was shut down.
    #[error("client shut down")]
    Shutdown,

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Frame encoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket or framing failure on the live session.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors end the client for good; transient ones clear up once a
    /// session is re-established.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Rejected { .. } | Self::GaveUp { .. } | Self::Shutdown | Self::Config(_) => true,
            Self::NotConnected | Self::Transport(_) => false,
            Self::Protocol(e) => e.is_fatal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_fatal() {
        assert!(ClientError::Rejected { reason: "dup".to_string() }.is_fatal());
        assert!(ClientError::GaveUp { attempts: 10 }.is_fatal());
        assert!(ClientError::Shutdown.is_fatal());
    }

    #[test]
    fn connectivity_errors_are_transient() {
        assert!(!ClientError::NotConnected.is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!ClientError::Transport(TransportError::Io(io)).is_fatal());
    }
}
