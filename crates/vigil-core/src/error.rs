//! Core error types.

use thiserror::Error;

use crate::{
    exam::{ExamId, OptionId, QuestionId},
    preflight::SystemCheck,
    session::SessionStatus,
};

/// Errors from session controller operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Event is not valid in the current status.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the state error.
        reason: String,
    },

    /// Readiness token was produced for another exam.
    #[error("readiness token is for exam {actual}, session is for {expected}")]
    TokenMismatch {
        /// Exam of the session.
        expected: ExamId,
        /// Exam the token was produced for.
        actual: ExamId,
    },

    /// Readiness token does not satisfy the exam's requirements.
    #[error("not ready: {reason}")]
    NotReady {
        /// What is missing.
        reason: String,
    },

    /// Question is not part of this session.
    #[error("unknown question: {question_id}")]
    UnknownQuestion {
        /// The question that was not found.
        question_id: QuestionId,
    },

    /// Option is not a legal answer for the question.
    #[error("option {option_id} is not valid for question {question_id}")]
    InvalidOption {
        /// Question answered.
        question_id: QuestionId,
        /// Rejected option.
        option_id: OptionId,
    },

    /// Navigation target does not exist.
    #[error("question index {index} out of range (total {total})")]
    NavigationOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of questions.
        total: usize,
    },

    /// Answers are frozen once submission started.
    #[error("answers are not accepted while {status}")]
    AnswersClosed {
        /// Status at the time of the attempt.
        status: SessionStatus,
    },
}

impl SessionError {
    /// Returns true if this error is fatal (the session cannot proceed).
    ///
    /// Fatal errors mean the session could not be opened. Everything else is
    /// a rejected user action the UI can report and move past.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::TokenMismatch { .. } | Self::NotReady { .. } => true,

            Self::InvalidState { .. }
            | Self::UnknownQuestion { .. }
            | Self::InvalidOption { .. }
            | Self::NavigationOutOfRange { .. }
            | Self::AnswersClosed { .. } => false,
        }
    }
}

/// Reasons the pre-flight gate refuses to move forward.
///
/// `Display` output is the user-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// One or more configured system checks have not passed.
    #[error("system checks not passed: {}", describe_checks(.failing))]
    ChecksNotPassed {
        /// Checks still pending or failed.
        failing: Vec<SystemCheck>,
    },

    /// No identity photo was captured.
    #[error("capture a photo of yourself to continue")]
    IdentityNotCaptured,

    /// Photo captured but not confirmed.
    #[error("confirm your identity photo to continue")]
    IdentityNotConfirmed,

    /// Rules checkbox not ticked.
    #[error("acknowledge the exam rules to continue")]
    RulesNotAcknowledged,

    /// Gate already produced its token.
    #[error("pre-flight checks are already complete")]
    AlreadyReady,

    /// Token requested before the gate reached `Ready`.
    #[error("pre-flight checks are not complete")]
    NotReady,

    /// Identity capture requested while the camera is not held.
    #[error("camera is not available for identity capture")]
    CameraUnavailable,
}

fn describe_checks(checks: &[SystemCheck]) -> String {
    checks.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}
