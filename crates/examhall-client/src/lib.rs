//! Examhall participant runtime.
//!
//! Keeps one session to the coordinator alive: connects, logs in, sends
//! heartbeats when idle and reconnects with exponential backoff after a
//! drop. A rejected login disables reconnection for good.
//!
//! ## Architecture
//!
//! ```text
//! examhall-client
//!   ├─ ReconnectingClient (supervisor task, single-flight connect, shutdown)
//!   ├─ session            (login, inbound dispatch, write-idle heartbeat)
//!   ├─ TcpConnector       (Tokio TCP)
//!   ├─ console            (participant commands and answer sheet)
//!   ├─ deadline           (auto-submit when the countdown runs out)
//!   └─ AnswerCache        (answers survive a client restart)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
pub mod console;
mod controller;
mod deadline;
mod error;
mod events;
mod session;
mod transport;

pub use cache::{AnswerCache, CacheError};
pub use controller::ReconnectingClient;
pub use deadline::{AUTO_SUBMIT_LEAD, SharedSheet, submit_at_deadline};
pub use error::ClientError;
pub use events::ParticipantEvent;
use examhall_core::{ReconnectPolicy, TimeoutConfig};
use examhall_proto::{DEFAULT_MAX_FRAME_SIZE, ParticipantIdentity};
pub use transport::TcpConnector;

/// Participant configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Coordinator address (`host:port`)
    pub server_address: String,
    /// Identity sent with every login
    pub identity: ParticipantIdentity,
    /// Idle windows; the participant enforces `write_idle`
    pub timeouts: TimeoutConfig,
    /// Backoff parameters
    pub reconnect: ReconnectPolicy,
    /// Largest accepted envelope in bytes
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Defaults for `identity` connecting to `server_address`.
    pub fn new(server_address: impl Into<String>, identity: ParticipantIdentity) -> Self {
        Self {
            server_address: server_address.into(),
            identity,
            timeouts: TimeoutConfig::default(),
            reconnect: ReconnectPolicy::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Reject configurations the coordinator would refuse or that cannot
    /// keep a session alive.
    pub fn validate(&self) -> Result<(), ClientError> {
        if let Some(field) = self.identity.missing_field() {
            return Err(ClientError::Config(format!("identity is missing {field}")));
        }
        self.timeouts.validate().map_err(|e| ClientError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_match_coordinator() {
        let config = ClientConfig::new("127.0.0.1:8888", ParticipantIdentity::new("S1", "Ann"));
        assert_eq!(config.timeouts.write_idle, Duration::from_secs(10));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_identity_is_invalid() {
        let config = ClientConfig::new("127.0.0.1:8888", ParticipantIdentity::new("", "Ann"));
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }
}
