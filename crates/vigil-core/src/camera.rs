//! Camera monitor.
//!
//! Tracks the in-exam capture device: acquisition outcome, the live preview,
//! the periodic snapshot schedule and the most recent snapshot. It owns no
//! device; it emits [`CameraCommand`]s for the driver that does.
//!
//! ```text
//! Initializing ──▶ Active ──▶ Error (stream dropped)
//!      │              │
//!      ├──▶ Denied    └──▶ Stopped
//!      └──▶ Error
//! ```

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Interval between scheduled snapshots.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

/// A still frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// JPEG bytes.
    pub image: Bytes,
    /// When the frame was captured.
    pub captured_at: DateTime<Utc>,
}

/// Why a capture device could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraFailure {
    /// The user refused the permission prompt.
    Denied,
    /// Any other acquisition or stream failure.
    Unavailable {
        /// Platform-reported reason.
        reason: String,
    },
}

impl CameraFailure {
    /// Description recorded in the violation log.
    pub fn describe(&self) -> String {
        match self {
            Self::Denied => "Camera access denied by the user".to_string(),
            Self::Unavailable { reason } => format!("Camera unavailable: {reason}"),
        }
    }
}

/// Why a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPurpose {
    /// Periodic evidence.
    Scheduled,
    /// Corroborates the violation with this log sequence number.
    Evidence {
        /// Violation log sequence.
        sequence: u64,
    },
}

/// Device operations requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    /// Acquire a capture stream.
    Acquire,
    /// Render the live preview.
    ShowPreview {
        /// Flip horizontally.
        mirrored: bool,
    },
    /// Start the periodic snapshot schedule.
    StartSchedule {
        /// Period.
        every: Duration,
    },
    /// Capture one still frame.
    Capture(SnapshotPurpose),
    /// Stop every track and release the device.
    Release,
}

/// Monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// Waiting for the acquisition outcome.
    Initializing,
    /// Stream live.
    Active,
    /// Permission refused.
    Denied,
    /// Acquisition or stream failure.
    Error,
    /// Monitoring stopped and device released.
    Stopped,
}

/// In-exam camera monitor.
#[derive(Debug, Clone)]
pub struct CameraMonitor {
    state: CameraState,
    interval: Duration,
    latest: Option<Snapshot>,
    /// A stream may be open even before `Acquired` is observed, so release
    /// is requested unless monitoring already stopped.
    released: bool,
}

impl CameraMonitor {
    /// Start monitoring. Returns the acquisition command.
    pub fn start(interval: Duration) -> (Self, CameraCommand) {
        let monitor =
            Self { state: CameraState::Initializing, interval, latest: None, released: false };
        (monitor, CameraCommand::Acquire)
    }

    /// Current state.
    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Most recent snapshot. Older ones are not retained.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Whether frames can be captured right now.
    pub fn is_active(&self) -> bool {
        self.state == CameraState::Active
    }

    /// The device stream was acquired.
    pub fn on_acquired(&mut self) -> Vec<CameraCommand> {
        if self.state != CameraState::Initializing {
            // Acquisition raced with stop; the driver must not keep the stream.
            return vec![CameraCommand::Release];
        }

        self.state = CameraState::Active;
        vec![
            CameraCommand::ShowPreview { mirrored: true },
            CameraCommand::StartSchedule { every: self.interval },
        ]
    }

    /// Acquisition failed, or a live stream dropped.
    ///
    /// Returns `true` when this is the first failure and must be reported.
    pub fn on_failure(&mut self, failure: &CameraFailure) -> bool {
        match self.state {
            CameraState::Initializing | CameraState::Active => {
                self.state = match failure {
                    CameraFailure::Denied => CameraState::Denied,
                    CameraFailure::Unavailable { .. } => CameraState::Error,
                };
                true
            },
            CameraState::Denied | CameraState::Error | CameraState::Stopped => false,
        }
    }

    /// The scheduled snapshot timer fired.
    pub fn snapshot_due(&self) -> Option<CameraCommand> {
        self.is_active().then_some(CameraCommand::Capture(SnapshotPurpose::Scheduled))
    }

    /// Request evidence for a violation. `None` when no frame can be taken.
    pub fn evidence(&self, sequence: u64) -> Option<CameraCommand> {
        self.is_active().then_some(CameraCommand::Capture(SnapshotPurpose::Evidence { sequence }))
    }

    /// A frame was captured. Replaces the retained snapshot.
    pub fn on_snapshot(&mut self, snapshot: Snapshot) {
        self.latest = Some(snapshot);
    }

    /// Stop monitoring. Returns the release command unless already released.
    pub fn stop(&mut self) -> Option<CameraCommand> {
        if self.released {
            return None;
        }
        self.released = true;
        if matches!(self.state, CameraState::Initializing | CameraState::Active) {
            self.state = CameraState::Stopped;
        }
        Some(CameraCommand::Release)
    }
}
