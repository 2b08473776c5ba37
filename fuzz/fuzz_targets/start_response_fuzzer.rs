//! Fuzz target for Exam Service start-response decoding
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary input as a JSON body
//! - Shape coverage: untagged options, `_id` aliases and loose question
//!   type spellings all go through the same conversion
//!
//! # Invariants
//!
//! - Decoding and conversion NEVER panic
//! - Every converted multiple-choice question has at least one option
//! - Every converted question accepts each of its listed choices

#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_client::types::StartExamResponse;
use vigil_core::{OpenedSession, QuestionKind};

fuzz_target!(|data: &[u8]| {
    let Ok(response) = serde_json::from_slice::<StartExamResponse>(data) else {
        return;
    };
    let Ok(session) = OpenedSession::try_from(response) else {
        return;
    };

    for question in &session.questions {
        if let QuestionKind::Mcq { options } = &question.kind {
            assert!(!options.is_empty());
        }
        for choice in question.kind.choices() {
            assert!(question.kind.accepts(&choice));
        }
    }
});
