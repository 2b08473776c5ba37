//! Pre-flight runner against fake devices and probes.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use vigil_core::{
    ExamSettings, GateConfig, GateError, GateStage, ProctoringSettings, SystemCheck,
};
use vigil_harness::{CameraBehavior, FakeCamera, FakeProbe, SimEnv, scenario};
use vigil_runtime::{CaptureError, PreflightRunner, RuntimeError};

fn runner(exam: &ExamSettings, camera: &FakeCamera, probe: FakeProbe) -> PreflightRunner<SimEnv> {
    PreflightRunner::new(
        SimEnv::new(),
        exam,
        GateConfig::default(),
        Arc::new(camera.clone()),
        Arc::new(probe),
    )
}

fn failing(err: RuntimeError) -> Vec<SystemCheck> {
    match err {
        RuntimeError::Gate(GateError::ChecksNotPassed { failing }) => failing,
        other => unreachable!("expected failing checks, got {other:?}"),
    }
}

#[tokio::test]
async fn denied_camera_blocks_proctored_exam() {
    let exam = scenario::exam(scenario::fully_proctored(3));
    let camera = FakeCamera::new(CameraBehavior::Denied);
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());

    assert_eq!(runner.advance().await.unwrap(), GateStage::SystemCheck);
    assert!(!runner.camera_held());

    let err = runner.advance().await.unwrap_err();
    assert_eq!(failing(err), vec![SystemCheck::Camera]);
    assert_eq!(runner.stage(), GateStage::SystemCheck);
}

#[tokio::test]
async fn camera_not_needed_without_camera_proctoring() {
    let exam = scenario::exam(scenario::signals_only(3));
    let camera = FakeCamera::new(CameraBehavior::Denied);
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());

    runner.advance().await.unwrap();
    assert_eq!(runner.advance().await.unwrap(), GateStage::Ready);
    assert_eq!(camera.acquisitions(), 0);

    let token = runner.finish().unwrap();
    assert!(token.all_checks_passed());
    assert!(token.identity_snapshot().is_none());
}

#[tokio::test]
async fn identity_only_exam_takes_the_photo_with_the_camera() {
    let proctoring = ProctoringSettings { camera_required: false, ..scenario::fully_proctored(3) };
    let exam = scenario::exam(proctoring);
    let camera = FakeCamera::working();
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());

    runner.advance().await.unwrap();
    assert_eq!(runner.advance().await.unwrap(), GateStage::IdentityVerification);
    assert!(runner.camera_held());
    assert_eq!(camera.acquisitions(), 1);

    runner.capture_identity().await.unwrap();
    runner.confirm_identity().unwrap();
    runner.acknowledge_rules(true);
    assert_eq!(runner.advance().await.unwrap(), GateStage::Ready);
    assert_eq!(camera.active_streams(), 0);

    let token = runner.finish().unwrap();
    assert!(token.identity_snapshot().is_some());
}

#[tokio::test]
async fn failed_probes_are_reported_together() {
    let exam = scenario::exam(scenario::fully_proctored(3));
    let camera = FakeCamera::working();
    let probe = FakeProbe {
        user_agent: "Lynx/2.9".to_string(),
        fullscreen: false,
        notifications: true,
    };
    let mut runner = runner(&exam, &camera, probe);

    runner.advance().await.unwrap();
    let mut checks = failing(runner.advance().await.unwrap_err());
    checks.sort();
    assert_eq!(checks, vec![SystemCheck::Browser, SystemCheck::Fullscreen]);
}

#[tokio::test]
async fn going_back_releases_the_camera() {
    let exam = scenario::exam(scenario::fully_proctored(3));
    let camera = FakeCamera::working();
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());

    runner.advance().await.unwrap();
    assert_eq!(camera.active_streams(), 1);

    assert_eq!(runner.back().await, GateStage::Instructions);
    assert!(!runner.camera_held());
    assert_eq!(camera.active_streams(), 0);

    // Re-entering the checks acquires again.
    runner.advance().await.unwrap();
    assert_eq!(camera.acquisitions(), 2);
    assert_eq!(camera.active_streams(), 1);
}

#[tokio::test]
async fn identity_steps_are_enforced_in_order() {
    let exam = scenario::exam(scenario::fully_proctored(3));
    let camera = FakeCamera::working();
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());
    runner.advance().await.unwrap();
    runner.advance().await.unwrap();

    let err = runner.advance().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Gate(GateError::IdentityNotCaptured)));

    runner.capture_identity().await.unwrap();
    let err = runner.advance().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Gate(GateError::IdentityNotConfirmed)));

    runner.retake_identity();
    runner.capture_identity().await.unwrap();
    runner.confirm_identity().unwrap();
    let err = runner.advance().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Gate(GateError::RulesNotAcknowledged)));

    runner.acknowledge_rules(true);
    assert_eq!(runner.advance().await.unwrap(), GateStage::Ready);
    assert_eq!(camera.captures(), 2);
    // Ready hands the device back before the exam starts.
    assert_eq!(camera.active_streams(), 0);

    let token = runner.finish().unwrap();
    assert!(token.identity_snapshot().is_some());
    assert!(token.acknowledged_rules());
}

#[tokio::test]
async fn ended_stream_fails_identity_capture() {
    let exam = scenario::exam(scenario::fully_proctored(3));
    let camera = FakeCamera::working();
    camera.end_stream_after(0);
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());
    runner.advance().await.unwrap();
    runner.advance().await.unwrap();

    let err = runner.capture_identity().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Capture(CaptureError::StreamEnded(_))));
    assert!(!runner.camera_held());
    assert_eq!(camera.active_streams(), 0);
    assert!(!runner.gate().check(SystemCheck::Camera).unwrap().passed());

    let err = runner.capture_identity().await.unwrap_err();
    assert!(matches!(err, RuntimeError::NoCamera));
}

#[tokio::test]
async fn dropping_the_runner_releases_the_camera() {
    let exam = scenario::exam(scenario::fully_proctored(3));
    let camera = FakeCamera::working();
    let mut runner = runner(&exam, &camera, FakeProbe::chrome());
    runner.advance().await.unwrap();
    assert_eq!(camera.active_streams(), 1);

    drop(runner);
    assert_eq!(camera.active_streams(), 0);
}
