//! Exam metadata and question types.
//!
//! These are the engine-side shapes of what the Exam Service returns. Wire
//! decoding lives in `vigil-client`; everything here is already validated.

use std::{fmt, time::Duration};

/// Default number of tab switches tolerated before a forced submission.
pub const DEFAULT_TAB_SWITCH_LIMIT: u32 = 3;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(
    /// Exam identifier from the catalog.
    ExamId
);
string_id!(
    /// Student identifier.
    StudentId
);
string_id!(
    /// Server-issued attempt identifier (`resultId` on the wire).
    ResultId
);
string_id!(
    /// Question identifier.
    QuestionId
);
string_id!(
    /// Answer option identifier.
    OptionId
);

/// A selectable option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    /// Option identifier sent back on answer.
    pub id: OptionId,
    /// Display text.
    pub text: String,
}

/// Shape of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    /// Multiple choice with a closed option list.
    Mcq {
        /// Options in display order.
        options: Vec<AnswerOption>,
    },
    /// True/false. Answers are the option ids `"true"` and `"false"`.
    TrueFalse,
}

impl QuestionKind {
    /// Option id for a `true` answer to a [`QuestionKind::TrueFalse`] question.
    pub const TRUE: &'static str = "true";
    /// Option id for a `false` answer to a [`QuestionKind::TrueFalse`] question.
    pub const FALSE: &'static str = "false";

    /// Whether `option` is a legal answer for this kind.
    pub fn accepts(&self, option: &OptionId) -> bool {
        match self {
            Self::Mcq { options } => options.iter().any(|o| &o.id == option),
            Self::TrueFalse => matches!(option.as_str(), Self::TRUE | Self::FALSE),
        }
    }

    /// Options rendered for this kind, in display order.
    pub fn choices(&self) -> Vec<OptionId> {
        match self {
            Self::Mcq { options } => options.iter().map(|o| o.id.clone()).collect(),
            Self::TrueFalse => vec![OptionId::from(Self::TRUE), OptionId::from(Self::FALSE)],
        }
    }
}

/// A question as presented to the student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Question identifier.
    pub id: QuestionId,
    /// Prompt text.
    pub text: String,
    /// Question shape.
    pub kind: QuestionKind,
}

/// Proctoring configuration of an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProctoringSettings {
    /// Integrity and camera monitoring are active at all.
    pub enabled: bool,
    /// A working camera is mandatory.
    pub camera_required: bool,
    /// The identity-verification stage of the pre-flight gate is required.
    pub identity_verification: bool,
    /// Tab switches tolerated before forced submission.
    pub tab_switch_limit: u32,
}

impl ProctoringSettings {
    /// Settings for an exam without any proctoring.
    pub fn unproctored() -> Self {
        Self {
            enabled: false,
            camera_required: false,
            identity_verification: false,
            tab_switch_limit: DEFAULT_TAB_SWITCH_LIMIT,
        }
    }

    /// Whether the in-exam camera monitor runs.
    pub fn camera_monitored(&self) -> bool {
        self.enabled && self.camera_required
    }

    /// Whether the pre-flight identity stage runs.
    pub fn requires_identity(&self) -> bool {
        self.enabled && self.identity_verification
    }
}

impl Default for ProctoringSettings {
    fn default() -> Self {
        Self::unproctored()
    }
}

/// Exam metadata consumed by the pre-flight gate and the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSettings {
    /// Exam identifier.
    pub id: ExamId,
    /// Display title.
    pub title: String,
    /// Nominal duration from the catalog. The start call is authoritative.
    pub duration: Duration,
    /// Instruction lines shown on the first gate stage.
    pub instructions: Vec<String>,
    /// Proctoring configuration.
    pub proctoring: ProctoringSettings,
}

/// Server response to opening an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    /// Attempt identifier.
    pub result_id: ResultId,
    /// Student the attempt belongs to.
    pub student_id: StudentId,
    /// Time the server grants for this attempt.
    pub duration: Duration,
    /// Questions in display order.
    pub questions: Vec<Question>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq() -> QuestionKind {
        QuestionKind::Mcq {
            options: vec![
                AnswerOption { id: "a".into(), text: "Alpha".to_string() },
                AnswerOption { id: "b".into(), text: "Beta".to_string() },
            ],
        }
    }

    #[test]
    fn mcq_accepts_listed_options_only() {
        let kind = mcq();
        assert!(kind.accepts(&"a".into()));
        assert!(kind.accepts(&"b".into()));
        assert!(!kind.accepts(&"c".into()));
        assert!(!kind.accepts(&"true".into()));
    }

    #[test]
    fn true_false_accepts_boolean_ids() {
        let kind = QuestionKind::TrueFalse;
        assert!(kind.accepts(&"true".into()));
        assert!(kind.accepts(&"false".into()));
        assert!(!kind.accepts(&"a".into()));
        assert_eq!(kind.choices(), vec![OptionId::from("true"), OptionId::from("false")]);
    }

    #[test]
    fn camera_monitoring_requires_proctoring() {
        let settings = ProctoringSettings { camera_required: true, ..ProctoringSettings::unproctored() };
        assert!(!settings.camera_monitored());

        let settings = ProctoringSettings { enabled: true, ..settings };
        assert!(settings.camera_monitored());
    }
}
