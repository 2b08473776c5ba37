//! Production Environment implementation using system time and RNG.
//!
//! This module provides `SystemEnv`, the production implementation of the
//! `Environment` trait that uses the tokio clock and OS randomness.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use vigil_core::Environment;

/// Production environment using the tokio clock and cryptographic RNG.
///
/// This implementation:
/// - Reads monotonic time from `tokio::time::Instant`, so a paused test
///   runtime drives session deadlines the same way it drives intervals.
///   That clock stops while the machine sleeps; the session timer also
///   checks `Utc::now()` so a sleeping laptop still expires on time
/// - Uses `tokio::time::sleep()` for async sleeping
/// - Uses `getrandom` for proctoring log event identifiers
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
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Event ids only deduplicate log deliveries; zeros degrade that
            // but never block a session.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
