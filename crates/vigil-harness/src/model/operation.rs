//! Operations for model-based testing.
//!
//! Operations represent everything that can happen to an open session. They
//! are generated randomly by proptest (or decoded from fuzz input) and
//! applied to both the model and the real controller.

use arbitrary::Arbitrary;

/// Question index as generated. Reduced modulo `questions + 1`, so the top
/// value names a question the exam does not have.
pub type QuestionIndex = u8;

/// Operations that can be applied to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Student picks an option.
    Answer {
        /// Target question.
        question: QuestionIndex,
        /// Option choice; some values are invalid for the question kind.
        option: u8,
    },

    /// Student toggles the review flag.
    ToggleFlag {
        /// Target question.
        question: QuestionIndex,
    },

    /// Platform raises an integrity signal.
    Signal(ModelSignal),

    /// Time passes, then the timer ticks.
    AdvanceTime {
        /// Seconds to advance.
        secs: u8,
    },

    /// Student presses submit.
    Submit,

    /// The in-flight submission completes.
    SubmitOutcome {
        /// Whether the server accepted it.
        success: bool,
    },

    /// Student retries a failed submission.
    Retry,

    /// Host tears the session down.
    Teardown,
}

/// Integrity signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelSignal {
    /// Tab switch.
    VisibilityLost,
    /// Right click.
    ContextMenu,
    /// Copy.
    CopyAttempt,
}

/// Identifier of the question at zero-based `index`.
pub fn question_id(index: usize) -> String {
    format!("q{}", index + 1)
}

/// Whether the question at zero-based `index` is multiple choice.
///
/// Matches the alternating layout of [`crate::scenario::questions`].
pub fn is_mcq(index: usize) -> bool {
    index % 2 == 0
}

/// Option label for a raw choice. The last label of each range is invalid.
pub fn option_label(index: usize, raw: u8) -> String {
    if is_mcq(index) {
        ["a", "b", "c", "d", "z"][usize::from(raw % 5)].to_string()
    } else {
        ["true", "false", "maybe"][usize::from(raw % 3)].to_string()
    }
}

/// Whether a label produced by [`option_label`] is accepted.
pub fn option_valid(index: usize, label: &str) -> bool {
    if is_mcq(index) {
        matches!(label, "a" | "b" | "c" | "d")
    } else {
        matches!(label, "true" | "false")
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation accepted (possibly as a no-op).
    Ok,

    /// Operation rejected.
    Error(OperationError),
}

/// Expected rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Question not in the exam.
    UnknownQuestion,

    /// Option not valid for the question.
    InvalidOption,

    /// Answers are frozen during submission.
    AnswersClosed,

    /// Session not in a state that accepts the operation.
    InvalidState,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
