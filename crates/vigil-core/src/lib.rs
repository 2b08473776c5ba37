//! Vigil Core
//!
//! Sans-IO state machines for proctored exam sessions. Takes a student from
//! pre-flight checks through a time-boxed, monitored answer collection to a
//! single submission.
//!
//! # Architecture
//!
//! Every component is a pure state machine that:
//! - Receives events from the caller (user input, ticks, platform signals,
//!   device and network completions)
//! - Produces actions for the caller to execute (HTTP calls, camera commands,
//!   notifications)
//! - Uses the `Environment` trait for time and randomness (deterministic
//!   testing)
//!
//! # Components
//!
//! - [`PreflightGate`]: readiness wizard producing a [`ReadinessToken`]
//! - [`SessionController`]: owns the session and drives everything below
//! - [`Timer`]: countdown to an absolute deadline
//! - [`IntegrityMonitor`]: violation log and escalation policy
//! - [`CameraMonitor`]: in-exam camera lifecycle and snapshots
//! - [`AnswerStore`]: answers, navigation and review flags
//! - [`SubmitGuard`]: at-most-once submission flag

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod answers;
pub mod camera;
pub mod env;
pub mod error;
pub mod event;
pub mod exam;
pub mod guard;
pub mod integrity;
pub mod preflight;
pub mod session;
pub mod timer;
pub mod violation;

pub use answers::{AnswerStore, Navigation, PaletteSummary, SubmittedAnswer};
pub use camera::{
    CameraCommand, CameraFailure, CameraMonitor, CameraState, Snapshot, SnapshotPurpose,
};
pub use env::Environment;
pub use error::{GateError, SessionError};
pub use event::{
    CameraEvent, Notice, SessionAction, SessionEvent, SessionSummary, SubmissionReceipt,
    SubmissionRequest, SubmitTrigger,
};
pub use exam::{
    AnswerOption, ExamId, ExamSettings, OpenedSession, OptionId, ProctoringSettings, Question,
    QuestionId, QuestionKind, ResultId, StudentId,
};
pub use guard::{SubmitGuard, SubmitPhase};
pub use integrity::{Assessment, Escalation, IntegrityMonitor, IntegritySignal};
pub use preflight::{
    CheckStatus, GateAction, GateConfig, GateStage, PreflightGate, ReadinessToken, SystemCheck,
};
pub use session::{SessionController, SessionPolicy, SessionStatus};
pub use timer::{ClockReading, Timer, TimerTick, format_remaining};
pub use violation::{Severity, ViolationEvent, ViolationKind, ViolationRecord, ViolationReport};
