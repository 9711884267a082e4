//! Production Environment implementation using system time and RNG.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::env::Environment;

/// Production environment using system clocks and OS randomness.
///
/// - `now()` reads Tokio's clock, so it follows a paused test runtime
/// - `wall_clock_millis()` reads `SystemTime`
/// - `sleep()` is `tokio::time::sleep()`
/// - `random_bytes()` uses `getrandom`
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        tokio::time::Instant::now().into_std()
    }

    fn wall_clock_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Connection ids only need to be distinct, not secret.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
