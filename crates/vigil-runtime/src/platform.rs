//! Platform seams.
//!
//! Everything the driver needs from the outside world sits behind a trait
//! here: the exam backend, the capture device, integrity signal sources,
//! system probes for the pre-flight checks, and the UI observer. Production
//! wires the HTTP client and a browser bridge; tests wire fakes.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use vigil_core::{
    CameraFailure, ExamId, ExamSettings, IntegritySignal, Notice, OpenedSession, ResultId,
    SessionSummary, SubmissionReceipt, SubmissionRequest, SubmittedAnswer, ViolationReport,
};

use crate::error::BackendError;

/// The Exam Service as seen by the driver.
#[async_trait]
pub trait ExamBackend: Send + Sync + 'static {
    /// Exam metadata for the pre-flight gate.
    async fn get_exam(&self, exam_id: &ExamId) -> Result<ExamSettings, BackendError>;

    /// Open an attempt. The server fixes the duration.
    async fn start_exam(&self, exam_id: &ExamId) -> Result<OpenedSession, BackendError>;

    /// Persist one answer.
    async fn record_answer(
        &self,
        result_id: &ResultId,
        answer: &SubmittedAnswer,
    ) -> Result<(), BackendError>;

    /// Submit the attempt.
    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionReceipt, BackendError>;

    /// Forward a violation to the proctoring log.
    async fn log_violation(&self, report: &ViolationReport) -> Result<(), BackendError>;
}

/// Why a frame could not be captured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The stream ended (device unplugged, permission revoked).
    #[error("camera stream ended: {0}")]
    StreamEnded(String),

    /// This frame failed; the stream is still live.
    #[error("frame capture failed: {0}")]
    Frame(String),
}

/// A capture device that hands out exclusive streams.
#[async_trait]
pub trait CaptureDevice: Send + Sync + 'static {
    /// Acquire the device.
    ///
    /// Most platforms allow one consumer at a time, so callers release the
    /// previous stream before acquiring again.
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, CameraFailure>;
}

/// An acquired camera stream.
#[async_trait]
pub trait CameraStream: Send + 'static {
    /// Render the live preview.
    fn show_preview(&mut self, mirrored: bool);

    /// Capture one JPEG still.
    async fn capture(&mut self) -> Result<Bytes, CaptureError>;

    /// Stop every track. Called exactly once per stream.
    fn stop(&mut self);
}

/// Exclusive ownership of an acquired stream. Dropping it stops the tracks.
pub(crate) struct HeldStream(pub(crate) Box<dyn CameraStream>);

impl Drop for HeldStream {
    fn drop(&mut self) {
        self.0.stop();
        tracing::debug!("camera stream stopped");
    }
}

/// A source of integrity signals (visibility, context menu, clipboard).
pub trait SignalSource: Send + Sync + 'static {
    /// Start delivering signals into `sink`.
    ///
    /// The returned [`Subscription`] removes the platform listeners when
    /// dropped.
    fn subscribe(&self, sink: SignalSink) -> Subscription;
}

/// Handle given to platform listeners for reporting signals.
///
/// Listeners call [`SignalSink::emit`] inline and cancel the browser action
/// when it returns true. Emission never blocks and never drops: signals have
/// their own unbounded queue, separate from commands and completions, so a
/// busy session still counts every tab switch.
#[derive(Debug, Clone)]
pub struct SignalSink {
    signals: mpsc::UnboundedSender<IntegritySignal>,
    open: Arc<AtomicBool>,
}

impl SignalSink {
    pub(crate) fn new(signals: mpsc::UnboundedSender<IntegritySignal>) -> Self {
        Self { signals, open: Arc::new(AtomicBool::new(true)) }
    }

    /// Report a signal. Returns whether the browser action must be prevented.
    pub fn emit(&self, signal: IntegritySignal) -> bool {
        if self.open.load(Ordering::Acquire) && self.signals.send(signal).is_err() {
            tracing::debug!(?signal, "signal after session closed");
        }
        signal.prevents_default()
    }

    /// Whether the session is still listening.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Live platform listener registration.
///
/// Dropping it closes the sink and runs the platform's removal hook, so a
/// listener that outlives its session can no longer report anything.
pub struct Subscription {
    open: Option<Arc<AtomicBool>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Subscription tied to `sink` that runs `remove` when dropped.
    pub fn new(sink: &SignalSink, remove: impl FnOnce() + Send + 'static) -> Self {
        Self { open: Some(Arc::clone(&sink.open)), on_drop: Some(Box::new(remove)) }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.open.is_some()).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(open) = self.open.take() {
            open.store(false, Ordering::Release);
        }
        if let Some(remove) = self.on_drop.take() {
            remove();
        }
    }
}

/// Probes backing the pre-flight system checks.
#[async_trait]
pub trait SystemProbe: Send + Sync + 'static {
    /// Browser user-agent string.
    fn user_agent(&self) -> String;

    /// Whether the page may enter fullscreen.
    async fn fullscreen_available(&self) -> bool;

    /// Whether notification permission is granted (prompting if needed).
    async fn notifications_permitted(&self) -> bool;
}

/// Receives user-facing output from the driver.
pub trait SessionObserver: Send + Sync + 'static {
    /// A notice for the student.
    fn notify(&self, notice: &Notice);

    /// The session closed. Called once.
    fn closed(&self, summary: &SessionSummary);
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::Clock { .. } => tracing::trace!(?notice, "notice"),
            _ => tracing::info!(?notice, "notice"),
        }
    }

    fn closed(&self, summary: &SessionSummary) {
        tracing::info!(
            exam_id = %summary.exam_id,
            status = %summary.status,
            answered = summary.answered,
            violations = summary.violation_count,
            "session closed"
        );
    }
}

/// The collaborators a session driver runs against.
#[derive(Clone)]
pub struct Platform {
    /// Exam Service.
    pub backend: Arc<dyn ExamBackend>,
    /// In-exam camera.
    pub camera: Arc<dyn CaptureDevice>,
    /// Integrity signal source.
    pub signals: Arc<dyn SignalSource>,
    /// UI sink.
    pub observer: Arc<dyn SessionObserver>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
