//! Fuzz target for the session controller against the reference model
//!
//! # Strategy
//!
//! - Operation sequences: answers (valid, invalid, unknown question), flags,
//!   integrity signals, time jumps, submit outcomes, retries and teardown in
//!   any order
//! - Every step is applied to both [`ModelSession`] and [`RealSession`]
//!
//! # Invariants
//!
//! - Model and controller agree on every result and every observable state
//! - At most one submission is started; retries resend the same payload
//! - No transition out of `Submitted` or `Terminated`
//! - The escalating violation count never exceeds the limit
//! - NEVER panic on an out-of-order completion

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vigil_core::SessionStatus;
use vigil_harness::{ModelSession, Operation, RealSession};

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    /// Reduced to 1..=8 questions.
    questions: u8,
    /// Reduced to 1..=5 tab switches.
    limit: u8,
    /// Reduced to 1..=1024 seconds.
    duration: u16,
    ops: Vec<Operation>,
}

fuzz_target!(|input: FuzzInput| {
    let questions = usize::from(input.questions % 8) + 1;
    let limit = u32::from(input.limit % 5) + 1;
    let duration = u64::from(input.duration % 1024) + 1;

    let mut model = ModelSession::new(questions, duration, limit);
    let Ok(mut real) = RealSession::open(questions, duration, limit, input.seed) else {
        panic!("scenario session failed to open");
    };

    for op in &input.ops {
        let before = real.status();

        let model_result = model.apply(op);
        let real_result = real.apply(op);
        assert_eq!(model_result, real_result, "result divergence on {op:?}");

        let state = real.observable_state();
        assert_eq!(model.observable_state(), state, "state divergence on {op:?}");

        if before.is_terminal() {
            assert_eq!(state.status, before, "left terminal state on {op:?}");
        }
        assert!(state.violation_count <= limit);

        if let Some(first) = state.submissions.first() {
            assert!(state.submissions.iter().all(|s| s == first));
            assert_ne!(state.status, SessionStatus::InProgress);
        }
    }
});
