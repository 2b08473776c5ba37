//! Reference model for model-based testing.
//!
//! The model is a simplified implementation that captures the intended
//! session semantics without timers, guards or monitors. It serves as the
//! oracle against which the real controller is verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Behavior not mechanism: Captures WHAT, not HOW
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod session;

pub use operation::{
    ModelSignal, Operation, OperationError, OperationResult, QuestionIndex, is_mcq, option_label,
    option_valid, question_id,
};
pub use session::{ModelSession, ModelSubmission, ObservableState};
