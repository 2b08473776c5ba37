//! Violation values.
//!
//! A [`ViolationEvent`] is a plain value: it is copied into the session's
//! append-only log (without evidence) and forwarded to the proctoring log
//! service (with evidence when a snapshot could be taken).

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{
    camera::Snapshot,
    exam::{ExamId, ResultId},
};

/// Category of an integrity-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// The exam page lost visibility (tab or window switch).
    TabSwitch,
    /// Context menu was requested.
    RightClick,
    /// Clipboard copy was attempted.
    CopyAttempt,
    /// The camera could not be used, so no face can be observed.
    FaceNotDetected,
}

impl ViolationKind {
    /// Wire name for the proctoring log service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::RightClick => "right_click",
            Self::CopyAttempt => "copy_paste",
            Self::FaceNotDetected => "face_not_detected",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to each violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Audit only.
    Low,
    /// Counts toward escalation.
    Medium,
    /// Evidence quality degraded.
    High,
    /// Reserved for backend-side classification.
    Critical,
}

impl Severity {
    /// Wire name for the proctoring log service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationEvent {
    /// Category.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// When it was detected.
    pub timestamp: DateTime<Utc>,
    /// Corroborating camera frame, if one was captured.
    pub evidence: Option<Snapshot>,
}

impl ViolationEvent {
    /// Log entry for this event. Evidence is not retained in the log.
    pub fn record(&self) -> ViolationRecord {
        ViolationRecord {
            kind: self.kind,
            description: self.description.clone(),
            severity: self.severity,
            timestamp: self.timestamp,
        }
    }
}

/// Entry of the session's append-only violation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationRecord {
    /// Category.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// When it was detected.
    pub timestamp: DateTime<Utc>,
}

/// A violation addressed to the proctoring log service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationReport {
    /// Exam the session belongs to.
    pub exam_id: ExamId,
    /// Attempt identifier.
    pub result_id: ResultId,
    /// Position in the session's violation log (0-based).
    pub sequence: u64,
    /// Random client-side identifier so retried deliveries can be deduplicated.
    pub client_event_id: u64,
    /// Escalating violations counted so far, including this one.
    pub violation_count: u32,
    /// Configured escalation limit.
    pub tab_switch_limit: u32,
    /// The event itself.
    pub event: ViolationEvent,
}
