//! Liveness configuration shared by both ends of a session.

use std::time::Duration;

use thiserror::Error;

/// Default coordinator read-idle window.
pub const DEFAULT_READ_IDLE: Duration = Duration::from_secs(30);

/// Default participant write-idle window.
pub const DEFAULT_WRITE_IDLE: Duration = Duration::from_secs(10);

/// Invalid timeout configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Heartbeats would not arrive before the coordinator gives up.
    #[error("write idle {write_idle:?} must be shorter than read idle {read_idle:?}")]
    HeartbeatTooSlow {
        /// Participant write-idle window
        write_idle: Duration,
        /// Coordinator read-idle window
        read_idle: Duration,
    },

    /// A zero window would fire immediately.
    #[error("idle windows must be non-zero")]
    ZeroWindow,
}

/// Per-direction idle windows.
///
/// The coordinator closes a session after `read_idle` without inbound data.
/// A participant sends a heartbeat after `write_idle` without outbound data.
/// Each window is a one-shot that re-arms on traffic in its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Coordinator side: inbound silence before the peer is presumed dead
    pub read_idle: Duration,
    /// Participant side: outbound silence before a heartbeat is sent
    pub write_idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { read_idle: DEFAULT_READ_IDLE, write_idle: DEFAULT_WRITE_IDLE }
    }
}

impl TimeoutConfig {
    /// Check that `write_idle < read_idle` and both are non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_idle.is_zero() || self.write_idle.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.write_idle >= self.read_idle {
            return Err(ConfigError::HeartbeatTooSlow {
                write_idle: self.write_idle,
                read_idle: self.read_idle,
            });
        }
        Ok(())
    }
}
