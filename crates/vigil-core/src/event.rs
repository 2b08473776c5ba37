//! Session controller events and actions.
//!
//! Events flow in from the driver (user input, ticks, platform signals,
//! device and network completions). Actions flow out and are executed by the
//! driver; the controller never performs I/O itself.

use std::time::Duration;

use crate::{
    answers::{Navigation, SubmittedAnswer},
    camera::{CameraCommand, CameraFailure, Snapshot, SnapshotPurpose},
    exam::{ExamId, OpenedSession, OptionId, QuestionId, ResultId},
    integrity::IntegritySignal,
    preflight::ReadinessToken,
    session::SessionStatus,
    violation::ViolationReport,
};

/// What started the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitTrigger {
    /// The student pressed submit.
    Manual,
    /// The countdown reached zero.
    TimerExpired,
    /// The tab-switch limit was reached.
    ViolationLimit,
}

impl SubmitTrigger {
    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::TimerExpired => "timer_expired",
            Self::ViolationLimit => "violation_limit",
        }
    }

    /// Whether the student did not choose to submit.
    pub fn is_automatic(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

/// Submission addressed to the Exam Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// Exam being submitted.
    pub exam_id: ExamId,
    /// Attempt identifier.
    pub result_id: ResultId,
    /// Answer snapshot taken when the winning trigger fired.
    pub answers: Vec<SubmittedAnswer>,
    /// Winning trigger.
    pub trigger: SubmitTrigger,
    /// 1 for the first send, incremented on each manual retry.
    pub attempt: u32,
}

/// Server acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Attempt identifier echoed by the server.
    pub result_id: ResultId,
    /// Score, when the server grades synchronously.
    pub score: Option<u32>,
    /// Maximum attainable score, when reported.
    pub max_score: Option<u32>,
}

/// Camera device completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// The in-exam stream was acquired.
    Acquired,
    /// Acquisition failed, or a live stream dropped.
    Failed(CameraFailure),
    /// The snapshot schedule fired.
    SnapshotDue,
    /// A requested frame was captured.
    SnapshotCaptured {
        /// The frame.
        snapshot: Snapshot,
        /// Why it was requested.
        purpose: SnapshotPurpose,
    },
    /// A requested frame could not be captured.
    SnapshotFailed {
        /// Why it was requested.
        purpose: SnapshotPurpose,
        /// Platform-reported reason.
        reason: String,
    },
}

/// Input to [`crate::session::SessionController::handle`].
#[derive(Debug)]
pub enum SessionEvent {
    /// Open the session with the gate's token and the server's start
    /// response.
    Open {
        /// Consumed readiness token.
        token: ReadinessToken,
        /// Attempt opened by the Exam Service.
        session: OpenedSession,
    },
    /// Timer cadence fired.
    Tick,
    /// The student selected an option.
    Answer {
        /// Question answered.
        question_id: QuestionId,
        /// Selected option.
        option_id: OptionId,
    },
    /// The student moved between questions.
    Navigate(Navigation),
    /// The student toggled the review flag of a question.
    ToggleFlag {
        /// Flagged question.
        question_id: QuestionId,
    },
    /// A platform integrity signal.
    Signal(IntegritySignal),
    /// Camera device completion.
    Camera(CameraEvent),
    /// The student pressed submit.
    SubmitRequested,
    /// The student asked to retry a failed submission.
    RetrySubmit,
    /// The Exam Service confirmed the submission.
    SubmitConfirmed {
        /// Server acknowledgement.
        receipt: SubmissionReceipt,
    },
    /// The submission request failed.
    SubmitFailed {
        /// Failure description.
        reason: String,
    },
    /// The host is going away (tab closed, view destroyed).
    Teardown,
}

/// User-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Countdown update.
    Clock {
        /// Time left.
        remaining: Duration,
        /// Formatted as `mm:ss` or `h:mm:ss`.
        display: String,
    },
    /// A low-time threshold was crossed.
    LowTime {
        /// Time left.
        remaining: Duration,
    },
    /// Transient tab-switch warning.
    Warning {
        /// Text to show.
        message: String,
        /// Violations still tolerated.
        remaining: u32,
        /// Auto-dismiss delay.
        dismiss_after: Duration,
    },
    /// The student refused camera access.
    CameraDenied,
    /// The camera failed for another reason.
    CameraError {
        /// Platform-reported reason.
        reason: String,
    },
    /// Submission started.
    Submitting {
        /// Winning trigger.
        trigger: SubmitTrigger,
    },
    /// Submission failed; a retry is possible.
    SubmitFailed {
        /// Failure description.
        reason: String,
    },
    /// Submission confirmed.
    Submitted {
        /// Winning trigger.
        trigger: SubmitTrigger,
        /// Server acknowledgement.
        receipt: SubmissionReceipt,
    },
}

/// Final state of a closed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Exam.
    pub exam_id: ExamId,
    /// Attempt, absent when the session never opened.
    pub result_id: Option<ResultId>,
    /// Terminal status.
    pub status: SessionStatus,
    /// Submission trigger, if a submission started.
    pub trigger: Option<SubmitTrigger>,
    /// Questions answered at close.
    pub answered: usize,
    /// Escalating violations counted.
    pub violation_count: u32,
    /// Entries in the violation log.
    pub violations_logged: usize,
}

/// Output of [`crate::session::SessionController::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Start the timer cadence.
    StartTimer {
        /// Tick period.
        every: Duration,
    },
    /// Stop the timer cadence.
    StopTimer,
    /// Subscribe to platform integrity signals.
    AttachSignals,
    /// Drop the platform signal subscriptions.
    DetachSignals,
    /// Drive the in-exam camera.
    Camera(CameraCommand),
    /// Persist one answer, fire-and-forget.
    PersistAnswer {
        /// Attempt identifier.
        result_id: ResultId,
        /// The answer.
        answer: SubmittedAnswer,
    },
    /// Forward a violation to the proctoring log, fire-and-forget.
    ForwardViolation(Box<ViolationReport>),
    /// Send the submission and report the outcome back.
    Submit(SubmissionRequest),
    /// Show something to the student.
    Notify(Notice),
    /// The session reached a terminal state and can be dropped.
    Close(SessionSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_manual_trigger_is_user_initiated() {
        assert!(!SubmitTrigger::Manual.is_automatic());
        assert!(SubmitTrigger::TimerExpired.is_automatic());
        assert!(SubmitTrigger::ViolationLimit.is_automatic());
        assert_eq!(SubmitTrigger::ViolationLimit.as_str(), "violation_limit");
    }
}
