//! Integrity monitor.
//!
//! Translates platform signals into violations and applies the escalation
//! policy. Only tab switches escalate: each one increments the violation
//! count and the one that reaches the limit forces submission. Context-menu
//! and copy attempts are suppressed and logged for audit, never counted.
//!
//! The monitor owns the violation count and log. It never touches session
//! state: it returns an [`Assessment`] and the session controller acts on it.

use chrono::{DateTime, Utc};

use crate::violation::{Severity, ViolationEvent, ViolationKind, ViolationRecord};

/// Integrity-relevant signal raised by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegritySignal {
    /// The exam page lost visibility.
    VisibilityLost,
    /// Context menu requested.
    ContextMenu,
    /// Clipboard copy attempted.
    CopyAttempt,
}

impl IntegritySignal {
    /// Whether the platform must cancel the underlying browser action.
    ///
    /// Platform handlers call this inline, before the event is queued, since
    /// cancellation is only possible while the handler runs.
    pub fn prevents_default(self) -> bool {
        match self {
            Self::VisibilityLost => false,
            Self::ContextMenu | Self::CopyAttempt => true,
        }
    }

    /// Whether this signal counts toward forced termination.
    pub fn escalates(self) -> bool {
        matches!(self, Self::VisibilityLost)
    }

    fn violation(self) -> (ViolationKind, Severity, &'static str) {
        match self {
            Self::VisibilityLost => {
                (ViolationKind::TabSwitch, Severity::Medium, "Switched away from the exam tab")
            },
            Self::ContextMenu => {
                (ViolationKind::RightClick, Severity::Low, "Attempted to open the context menu")
            },
            Self::CopyAttempt => {
                (ViolationKind::CopyAttempt, Severity::Low, "Attempted to copy exam content")
            },
        }
    }
}

/// What the controller must do about a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Audit only.
    Logged,
    /// Show a transient warning with the violations left before submission.
    Warn {
        /// Escalating violations still tolerated.
        remaining: u32,
    },
    /// The limit was reached: submit now.
    ForceSubmit,
}

/// Outcome of observing a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Violation to forward.
    pub event: ViolationEvent,
    /// Required reaction.
    pub escalation: Escalation,
}

/// Violation tally and escalation policy for one session.
#[derive(Debug, Clone)]
pub struct IntegrityMonitor {
    limit: u32,
    count: u32,
    log: Vec<ViolationRecord>,
}

impl IntegrityMonitor {
    /// Create a monitor. A limit of zero is treated as one.
    pub fn new(tab_switch_limit: u32) -> Self {
        Self { limit: tab_switch_limit.max(1), count: 0, log: Vec::new() }
    }

    /// Escalation limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Escalating violations so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Append-only violation log.
    pub fn log(&self) -> &[ViolationRecord] {
        &self.log
    }

    /// Observe a platform signal.
    pub fn observe(&mut self, signal: IntegritySignal, at: DateTime<Utc>) -> Assessment {
        let (kind, severity, description) = signal.violation();
        let event = self.append(kind, severity, description.to_string(), at);

        let escalation = if signal.escalates() {
            self.count = self.count.saturating_add(1);
            if self.count >= self.limit {
                Escalation::ForceSubmit
            } else {
                Escalation::Warn { remaining: self.limit - self.count }
            }
        } else {
            Escalation::Logged
        };

        tracing::debug!(
            kind = %kind,
            count = self.count,
            limit = self.limit,
            ?escalation,
            "integrity signal observed"
        );

        Assessment { event, escalation }
    }

    /// Record that the camera became unusable.
    ///
    /// Logged with high severity but never escalated.
    pub fn record_camera_failure(&mut self, description: String, at: DateTime<Utc>) -> ViolationEvent {
        self.append(ViolationKind::FaceNotDetected, Severity::High, description, at)
    }

    fn append(
        &mut self,
        kind: ViolationKind,
        severity: Severity,
        description: String,
        at: DateTime<Utc>,
    ) -> ViolationEvent {
        let event = ViolationEvent { kind, description, severity, timestamp: at, evidence: None };
        self.log.push(event.record());
        event
    }
}

/// User-facing text for a tab-switch warning.
pub fn warning_message(remaining: u32) -> String {
    let noun = if remaining == 1 { "violation" } else { "violations" };
    format!(
        "Tab switching is not allowed. {remaining} more {noun} will submit your exam automatically."
    )
}
