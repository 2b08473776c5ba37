//! Pre-flight runner.
//!
//! Executes the gate's check requests against the platform and holds the
//! identity-capture stream while the gate needs it. The stream is stopped
//! when the gate asks for release, when the runner finishes, or when it is
//! dropped, so the in-exam camera can acquire the device afterwards.

use std::sync::Arc;

use vigil_core::{
    CameraFailure, Environment, ExamSettings, GateAction, GateConfig, GateStage, PreflightGate,
    ReadinessToken, Snapshot, SystemCheck,
};

use crate::{
    error::RuntimeError,
    platform::{CaptureDevice, CaptureError, HeldStream, SystemProbe},
};

/// Drives a [`PreflightGate`] with real probes and a real camera.
pub struct PreflightRunner<E: Environment> {
    env: E,
    gate: PreflightGate,
    camera: Arc<dyn CaptureDevice>,
    probe: Arc<dyn SystemProbe>,
    stream: Option<HeldStream>,
}

impl<E: Environment> std::fmt::Debug for PreflightRunner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreflightRunner")
            .field("gate", &self.gate)
            .field("camera_held", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: Environment> PreflightRunner<E> {
    /// Runner for `exam` starting at the instructions stage.
    pub fn new(
        env: E,
        exam: &ExamSettings,
        config: GateConfig,
        camera: Arc<dyn CaptureDevice>,
        probe: Arc<dyn SystemProbe>,
    ) -> Self {
        Self { env, gate: PreflightGate::new(exam, config), camera, probe, stream: None }
    }

    /// The underlying gate, for rendering check results.
    pub fn gate(&self) -> &PreflightGate {
        &self.gate
    }

    /// Current stage.
    pub fn stage(&self) -> GateStage {
        self.gate.stage()
    }

    /// Whether the identity-capture stream is held.
    pub fn camera_held(&self) -> bool {
        self.stream.is_some()
    }

    /// Move forward one stage, running any checks the new stage needs.
    ///
    /// On rejection the stage is unchanged and the error's `Display` is the
    /// reason to show the student.
    pub async fn advance(&mut self) -> Result<GateStage, RuntimeError> {
        let actions = self.gate.advance()?;
        for action in actions {
            self.execute(action).await;
        }

        tracing::debug!(stage = ?self.gate.stage(), "pre-flight advanced");
        Ok(self.gate.stage())
    }

    /// Move back one stage.
    pub async fn back(&mut self) -> GateStage {
        for action in self.gate.back() {
            self.execute(action).await;
        }
        self.gate.stage()
    }

    /// Capture a still from the held stream as the identity photo.
    ///
    /// A stream that ended is released and fails the camera check.
    pub async fn capture_identity(&mut self) -> Result<(), RuntimeError> {
        let stream = self.stream.as_mut().ok_or(RuntimeError::NoCamera)?;

        let image = match stream.0.capture().await {
            Ok(image) => image,
            Err(CaptureError::StreamEnded(reason)) => {
                self.stream = None;
                self.gate.camera_failed(&CameraFailure::Unavailable { reason: reason.clone() });
                return Err(CaptureError::StreamEnded(reason).into());
            },
            Err(err) => return Err(err.into()),
        };

        self.gate.capture_identity(Snapshot { image, captured_at: self.env.wall_clock() })?;
        Ok(())
    }

    /// Student accepted the captured photo.
    pub fn confirm_identity(&mut self) -> Result<(), RuntimeError> {
        Ok(self.gate.confirm_identity()?)
    }

    /// Discard the photo.
    pub fn retake_identity(&mut self) {
        self.gate.retake_identity();
    }

    /// Set the rules acknowledgement checkbox.
    pub fn acknowledge_rules(&mut self, acknowledged: bool) {
        self.gate.acknowledge_rules(acknowledged);
    }

    /// Release the camera and hand over the readiness token.
    pub fn finish(mut self) -> Result<ReadinessToken, RuntimeError> {
        self.stream = None;
        Ok(self.gate.into_token()?)
    }

    async fn execute(&mut self, action: GateAction) {
        match action {
            GateAction::RunCheck(SystemCheck::Browser) => {
                let user_agent = self.probe.user_agent();
                self.gate.record_browser(&user_agent);
            },
            GateAction::RunCheck(SystemCheck::Camera) => match self.camera.acquire().await {
                Ok(stream) => {
                    let held = HeldStream(stream);
                    // A returned action means the gate no longer wants it.
                    if self.gate.camera_acquired().is_none() {
                        self.stream = Some(held);
                    }
                },
                Err(failure) => {
                    tracing::warn!(failure = %failure.describe(), "camera check failed");
                    self.gate.camera_failed(&failure);
                },
            },
            GateAction::RunCheck(SystemCheck::Fullscreen) => {
                let available = self.probe.fullscreen_available().await;
                self.gate.record_probe(SystemCheck::Fullscreen, available);
            },
            GateAction::RunCheck(SystemCheck::Notifications) => {
                let permitted = self.probe.notifications_permitted().await;
                self.gate.record_probe(SystemCheck::Notifications, permitted);
            },
            GateAction::ReleaseCamera => {
                self.stream = None;
            },
        }
    }
}
