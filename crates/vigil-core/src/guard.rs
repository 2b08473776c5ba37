//! Submit guard.
//!
//! Manual submit, timer expiry and forced termination are unordered with
//! respect to each other. The guard is a single atomic flag: the first
//! caller to win the compare-and-set owns the submission; everyone else is a
//! no-op. A failed submission parks the flag in `Failed`, from which only an
//! explicit retry can take it back in flight.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const IN_FLIGHT: u8 = 1;
const FAILED: u8 = 2;
const CONFIRMED: u8 = 3;

/// Observable guard phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    /// No submission yet.
    Idle,
    /// A submission request is outstanding.
    InFlight,
    /// The last request failed; a retry is allowed.
    Failed,
    /// The server confirmed the submission.
    Confirmed,
}

/// Single-flag check-and-set guard.
#[derive(Debug, Default)]
pub struct SubmitGuard {
    state: AtomicU8,
}

impl SubmitGuard {
    /// Create an idle guard.
    pub fn new() -> Self {
        Self { state: AtomicU8::new(IDLE) }
    }

    /// Claim the first submission. Returns `true` for exactly one caller.
    pub fn try_begin(&self) -> bool {
        self.transition(IDLE, IN_FLIGHT)
    }

    /// Claim a retry after a failure.
    pub fn try_retry(&self) -> bool {
        self.transition(FAILED, IN_FLIGHT)
    }

    /// Mark the outstanding request failed.
    pub fn fail(&self) -> bool {
        self.transition(IN_FLIGHT, FAILED)
    }

    /// Mark the outstanding request confirmed.
    pub fn confirm(&self) -> bool {
        self.transition(IN_FLIGHT, CONFIRMED)
    }

    /// Current phase.
    pub fn phase(&self) -> SubmitPhase {
        match self.state.load(Ordering::Acquire) {
            IDLE => SubmitPhase::Idle,
            IN_FLIGHT => SubmitPhase::InFlight,
            FAILED => SubmitPhase::Failed,
            _ => SubmitPhase::Confirmed,
        }
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state.compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }
}
