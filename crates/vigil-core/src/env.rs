//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples session logic from system resources
//! (monotonic time, wall-clock time, randomness). This enables:
//!
//! - Deterministic Simulation: the harness provides a virtual clock that tests
//!   advance by hand, so a 90-minute exam expires in microseconds.
//!
//! - Production Runtime: the tokio-backed implementation uses real system
//!   resources without any code changes to the session logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Abstract environment providing time, randomness, and async primitives.
///
/// Session deadlines are fixed on both `now()` and `wall_clock()` and expire
/// on whichever runs out first: setting the system clock back must not extend
/// an exam, and neither may a monotonic clock that stalls while the host
/// sleeps.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current monotonic time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: This method MUST return values that never decrease
    ///   within a single execution context.
    ///
    /// Time spent while the host is suspended may or may not be counted;
    /// `wall_clock()` covers the gap.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time.
    ///
    /// Timestamps records sent to the backend and bounds the session
    /// deadline from above. It may jump in either direction.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not session logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during simulations: Given the same RNG seed, this produces
    ///   the same sequence of bytes
    /// - Unpredictability in production: Uses OS entropy
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for client-side event identifiers that let the backend discard
    /// duplicate proctoring log deliveries.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
