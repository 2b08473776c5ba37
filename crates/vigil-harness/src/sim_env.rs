//! Virtual-clock environment.
//!
//! Time only moves when a test calls [`SimEnv::advance`] (or awaits
//! [`Environment::sleep`], which advances instantly). Randomness comes from a
//! seeded ChaCha stream, so a seed reproduces every client event id.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeDelta, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vigil_core::Environment;

/// Wall-clock origin of every simulation (2025-01-01T00:00:00Z).
const SIM_EPOCH_SECS: i64 = 1_735_689_600;

#[derive(Debug)]
struct SimState {
    elapsed: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic [`Environment`]. Clones share one clock and one RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    origin: Instant,
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment seeded with zero.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with a specific RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(SimState {
                elapsed: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.elapsed = state.elapsed.saturating_add(by);
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let epoch = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(SIM_EPOCH_SECS);
        epoch + TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::zero())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
