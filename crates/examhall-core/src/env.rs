//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples session logic from system resources
//! (clocks, randomness, sleeping). The coordinator and participant runtimes are
//! generic over it, so the same code runs against real time in production and
//! against Turmoil's virtual clock in simulation.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses OS entropy in production
/// 3. Minimal panics: Methods are infallible except in exceptional
///    circumstances (e.g., incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current monotonic time.
    ///
    /// Used for idle windows and countdowns. Never used on the wire.
    fn now(&self) -> Instant;

    /// Returns wall-clock time as unix milliseconds.
    ///
    /// Envelope timestamps and published exam start times come from here.
    /// Unlike `now()` this may jump if the system clock is adjusted.
    fn wall_clock_millis(&self) -> i64;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this (countdown, backoff), never the state
    /// machines themselves.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for connection identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
