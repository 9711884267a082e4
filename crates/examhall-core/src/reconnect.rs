//! Reconnection policy state machine.
//!
//! Pure bookkeeping for the participant's single outbound connection: which
//! phase it is in, how many retries have been spent, and how long to back off
//! next. The async controller in `examhall-client` owns the sockets and the
//! sleeping; it asks this machine what to do at every step.
//!
//! ```text
//!   Idle ──connect──▶ Connecting ──connected──▶ Connected
//!                       ▲    │                     │
//!                       │  failed                 lost
//!               backoff │    ▼                     │
//!               elapsed └── Backoff ◀──────────────┘
//!                            │ retries exhausted
//!                            ▼
//!                          GaveUp
//! ```
//!
//! `disable()` and `shutdown()` are one-way flags checked on every
//! transition; once set, no further attempt is ever scheduled.

use std::time::Duration;

/// Default base delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default number of retries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Retries allowed after consecutive failures
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: DEFAULT_BASE_DELAY, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (starting at 0): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Externally visible controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconnectState {
    /// Never connected
    Idle,
    /// Attempt in flight
    Connecting,
    /// Session up
    Connected,
    /// Waiting before the next attempt
    Backoff,
    /// Reconnection disabled after a terminal rejection
    Disabled,
    /// Retries exhausted
    GaveUp,
    /// Shut down by the owner
    Shutdown,
}

/// What the controller should do after a failure or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Sleep `delay`, then call [`ReconnectMachine::backoff_elapsed`]
    Retry {
        /// Retry number, starting at 0
        attempt: u32,
        /// Time to wait
        delay: Duration,
    },
    /// Retries exhausted; surface to the user
    GiveUp,
    /// Disabled or shut down; do nothing
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    Backoff,
    GaveUp,
}

/// Reconnection bookkeeping.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    phase: Phase,
    retries: u32,
    disabled: bool,
    shutdown: bool,
}

impl ReconnectMachine {
    /// Create an idle machine.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, phase: Phase::Idle, retries: 0, disabled: false, shutdown: false }
    }

    /// Backoff parameters.
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Current state. Terminal flags win over the connection phase unless a
    /// session is still up.
    pub fn state(&self) -> ReconnectState {
        if self.shutdown {
            return ReconnectState::Shutdown;
        }
        match self.phase {
            Phase::Connected => ReconnectState::Connected,
            _ if self.disabled => ReconnectState::Disabled,
            Phase::Idle => ReconnectState::Idle,
            Phase::Connecting => ReconnectState::Connecting,
            Phase::Backoff => ReconnectState::Backoff,
            Phase::GaveUp => ReconnectState::GaveUp,
        }
    }

    /// Retries spent since the last successful connection.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether reconnection has been disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Whether the owner shut the controller down.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Request a connection. Returns true if the caller should start an
    /// attempt now.
    ///
    /// A no-op while an attempt is in flight, a session is up or a retry is
    /// already scheduled, and after disable or shutdown. After giving up, a
    /// new request starts over with a fresh retry budget.
    pub fn connect(&mut self) -> bool {
        if self.shutdown || self.disabled {
            return false;
        }
        match self.phase {
            Phase::Idle | Phase::GaveUp => {
                self.phase = Phase::Connecting;
                self.retries = 0;
                true
            },
            Phase::Connecting | Phase::Connected | Phase::Backoff => false,
        }
    }

    /// The attempt succeeded. Resets the retry budget.
    pub fn connected(&mut self) {
        if self.shutdown {
            return;
        }
        self.phase = Phase::Connected;
        self.retries = 0;
    }

    /// The attempt failed or the live session dropped.
    pub fn connection_lost(&mut self) -> ReconnectDecision {
        if self.shutdown || self.disabled {
            self.phase = Phase::Idle;
            return ReconnectDecision::Stop;
        }
        if self.retries >= self.policy.max_attempts {
            self.phase = Phase::GaveUp;
            return ReconnectDecision::GiveUp;
        }

        let attempt = self.retries;
        self.retries += 1;
        self.phase = Phase::Backoff;
        ReconnectDecision::Retry { attempt, delay: self.policy.delay_for(attempt) }
    }

    /// The backoff delay passed. Returns true if the caller should attempt
    /// now; false if shutdown or disable happened meanwhile.
    pub fn backoff_elapsed(&mut self) -> bool {
        if self.shutdown || self.disabled || self.phase != Phase::Backoff {
            return false;
        }
        self.phase = Phase::Connecting;
        true
    }

    /// Permanently stop reconnecting. A live session stays up until it drops.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    /// Permanently stop. Idempotent; returns true on the first call.
    pub fn shutdown(&mut self) -> bool {
        let first = !self.shutdown;
        self.shutdown = true;
        first
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn machine(max_attempts: u32) -> ReconnectMachine {
        ReconnectMachine::new(ReconnectPolicy { base_delay: Duration::from_secs(1), max_attempts })
    }

    #[test]
    fn connect_is_single_flight() {
        let mut m = machine(3);
        assert!(m.connect());
        assert!(!m.connect());
        m.connected();
        assert!(!m.connect());
        assert_eq!(m.state(), ReconnectState::Connected);
    }

    #[test]
    fn delays_double_from_base() {
        let mut m = machine(10);
        m.connect();

        let delays: Vec<u64> = (0..4)
            .map(|_| {
                let ReconnectDecision::Retry { delay, .. } = m.connection_lost() else {
                    panic!("expected retry");
                };
                assert!(m.backoff_elapsed());
                delay.as_secs()
            })
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn success_resets_retry_budget() {
        let mut m = machine(10);
        m.connect();
        m.connection_lost();
        m.backoff_elapsed();
        m.connection_lost();
        m.backoff_elapsed();
        assert_eq!(m.retries(), 2);

        m.connected();
        assert_eq!(m.retries(), 0);
        assert_eq!(
            m.connection_lost(),
            ReconnectDecision::Retry { attempt: 0, delay: Duration::from_secs(1) }
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut m = machine(2);
        m.connect();
        assert!(matches!(m.connection_lost(), ReconnectDecision::Retry { attempt: 0, .. }));
        m.backoff_elapsed();
        assert!(matches!(m.connection_lost(), ReconnectDecision::Retry { attempt: 1, .. }));
        m.backoff_elapsed();
        assert_eq!(m.connection_lost(), ReconnectDecision::GiveUp);
        assert_eq!(m.state(), ReconnectState::GaveUp);
        assert!(!m.backoff_elapsed());

        assert!(m.connect(), "explicit connect starts over");
        assert_eq!(m.retries(), 0);
    }

    #[test]
    fn disable_makes_drops_noops() {
        let mut m = machine(10);
        m.connect();
        m.connected();
        m.disable();
        assert_eq!(m.state(), ReconnectState::Connected);

        assert_eq!(m.connection_lost(), ReconnectDecision::Stop);
        assert_eq!(m.state(), ReconnectState::Disabled);
        assert!(!m.connect());
    }

    #[test]
    fn shutdown_during_backoff_cancels_retry() {
        let mut m = machine(10);
        m.connect();
        m.connection_lost();

        assert!(m.shutdown());
        assert!(!m.shutdown(), "second shutdown is a no-op");
        assert!(!m.backoff_elapsed());
        assert!(!m.connect());
        assert_eq!(m.state(), ReconnectState::Shutdown);
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(40), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    proptest! {
        #[test]
        fn prop_backoff_schedule(max_attempts in 1u32..16, base_ms in 1u64..2_000) {
            let policy = ReconnectPolicy { base_delay: Duration::from_millis(base_ms), max_attempts };
            let mut m = ReconnectMachine::new(policy);
            prop_assert!(m.connect());

            for n in 0..max_attempts {
                match m.connection_lost() {
                    ReconnectDecision::Retry { attempt, delay } => {
                        prop_assert_eq!(attempt, n);
                        prop_assert!(delay >= Duration::from_millis(base_ms) * 2u32.pow(n));
                    },
                    other => prop_assert!(false, "unexpected {:?} after {} failures", other, n),
                }
                prop_assert!(m.backoff_elapsed());
            }

            prop_assert_eq!(m.connection_lost(), ReconnectDecision::GiveUp);
            prop_assert!(!m.backoff_elapsed());
        }
    }
}
