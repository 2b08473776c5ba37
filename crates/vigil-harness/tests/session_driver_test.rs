//! End-to-end driver tests.
//!
//! A real [`SessionDriver`] on a paused tokio clock against in-memory fakes.
//! Timer ticks and snapshot schedules run on tokio time, so an hour-long
//! exam expires as soon as every task is idle.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use vigil_core::{
    ExamSettings, GateConfig, GateStage, IntegritySignal, Notice, ReadinessToken, SessionError,
    SessionStatus, SubmitTrigger, ViolationKind,
};
use vigil_harness::{FakePlatform, FakeProbe, scenario};
use vigil_runtime::{PreflightRunner, RuntimeConfig, RuntimeError, SessionDriver, SystemEnv};

/// Walk the real pre-flight runner to a token, holding and releasing the
/// shared fake camera on the way.
async fn preflight(env: &SystemEnv, exam: &ExamSettings, fakes: &FakePlatform) -> ReadinessToken {
    let mut runner = PreflightRunner::new(
        env.clone(),
        exam,
        GateConfig::default(),
        Arc::new(fakes.camera.clone()),
        Arc::new(FakeProbe::chrome()),
    );

    assert_eq!(runner.advance().await.unwrap(), GateStage::SystemCheck);
    assert!(runner.camera_held());
    assert_eq!(runner.advance().await.unwrap(), GateStage::IdentityVerification);

    runner.capture_identity().await.unwrap();
    runner.confirm_identity().unwrap();
    runner.acknowledge_rules(true);
    assert_eq!(runner.advance().await.unwrap(), GateStage::Ready);

    runner.finish().unwrap()
}

/// Let spawned network and camera tasks settle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_submits_recorded_answers() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(4, Duration::from_secs(120)));
    let token = scenario::ready_token(&env, &exam).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    handle.answer("q1", "b").await.unwrap();
    handle.answer("q2", "true").await.unwrap();
    handle.answer("q1", "c").await.unwrap();

    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Submitted);
    assert_eq!(summary.trigger, Some(SubmitTrigger::TimerExpired));
    assert_eq!(summary.answered, 2);

    let submissions = fakes.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].trigger, SubmitTrigger::TimerExpired);
    let q1 = submissions[0].answers.iter().find(|a| a.question_id.as_str() == "q1").unwrap();
    assert_eq!(q1.selected_option.as_str(), "c");

    assert_eq!(fakes.backend.starts(), 1);
    assert!(fakes.observer.clock_updates() >= 100);
    assert!(fakes.observer.saw(|n| matches!(n, Notice::LowTime { .. })));
    assert_eq!(fakes.observer.summaries(), vec![summary]);
    assert!(!fakes.signals.is_attached());
}

#[tokio::test(start_paused = true)]
async fn third_tab_switch_forces_submission() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::fully_proctored(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(4, Duration::from_secs(3600)));

    let token = preflight(&env, &exam, &fakes).await;
    assert_eq!(fakes.camera.active_streams(), 0);

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    handle.answer("q1", "a").await.unwrap();
    settle().await;

    // The exam camera reacquired the device the gate released.
    assert_eq!(fakes.camera.acquisitions(), 2);
    assert_eq!(fakes.camera.active_streams(), 1);
    assert_eq!(fakes.camera.preview_mirrored(), Some(true));

    assert_eq!(fakes.signals.fire(IntegritySignal::ContextMenu), Some(true));
    settle().await;
    for _ in 0..3 {
        assert_eq!(fakes.signals.fire(IntegritySignal::VisibilityLost), Some(false));
        settle().await;
    }

    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Submitted);
    assert_eq!(summary.trigger, Some(SubmitTrigger::ViolationLimit));
    assert_eq!(summary.violation_count, 3);
    assert_eq!(summary.violations_logged, 4);

    settle().await;
    assert_eq!(fakes.camera.active_streams(), 0);
    assert!(!fakes.signals.is_attached());
    assert_eq!(fakes.signals.removals(), 1);

    assert!(fakes.observer.saw(|n| matches!(n, Notice::Warning { remaining: 2, .. })));
    assert!(fakes.observer.saw(|n| matches!(n, Notice::Warning { remaining: 1, .. })));

    let violations = fakes.backend.violations();
    assert_eq!(violations.len(), 4);
    assert!(violations.iter().filter(|r| r.event.evidence.is_some()).count() >= 3);

    let submissions = fakes.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].answers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_submission_is_retried_by_hand() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    fakes.backend.fail_next_submits(1);
    let token = scenario::ready_token(&env, &exam).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    handle.answer("q2", "false").await.unwrap();
    handle.submit().await.unwrap();
    settle().await;

    assert!(fakes.observer.saw(|n| matches!(n, Notice::SubmitFailed { .. })));
    // Pressing submit again does not start a second submission.
    handle.submit().await.unwrap();
    settle().await;
    assert_eq!(fakes.backend.submissions().len(), 1);

    handle.retry_submit().await.unwrap();
    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Submitted);
    assert_eq!(summary.trigger, Some(SubmitTrigger::Manual));

    let attempts: Vec<u32> = fakes.backend.submissions().iter().map(|s| s.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);
    let submissions = fakes.backend.submissions();
    assert_eq!(submissions[0].answers, submissions[1].answers);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_tears_down() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::fully_proctored(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = preflight(&env, &exam, &fakes).await;

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    let second = handle.clone();
    settle().await;
    assert_eq!(fakes.camera.active_streams(), 1);

    drop(handle);
    drop(second);
    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Terminated);
    assert_eq!(summary.trigger, None);

    settle().await;
    assert!(fakes.backend.submissions().is_empty());
    assert_eq!(fakes.camera.active_streams(), 0);
    assert!(!fakes.signals.is_attached());
    assert_eq!(fakes.observer.summaries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_commands_leave_the_session_running() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = scenario::ready_token(&env, &exam).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    // Nothing can be answered before the session opens.
    let early = handle.answer("q1", "a").await.unwrap_err();
    assert!(matches!(early, RuntimeError::Session(SessionError::InvalidState { .. })));

    handle.start(token).await.unwrap();
    let invalid = handle.answer("q1", "z").await.unwrap_err();
    assert!(matches!(invalid, RuntimeError::Session(SessionError::InvalidOption { .. })));
    let unknown = handle.toggle_flag("q9").await.unwrap_err();
    assert!(matches!(unknown, RuntimeError::Session(SessionError::UnknownQuestion { .. })));

    handle.answer("q1", "a").await.unwrap();
    handle.teardown().await.unwrap();

    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Terminated);
    assert_eq!(summary.answered, 1);

    let late = handle.answer("q1", "b").await.unwrap_err();
    assert!(matches!(late, RuntimeError::DriverStopped));
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn token_for_another_exam_is_refused_before_start() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let other = ExamSettings { id: "exam-2".into(), ..exam.clone() };
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = scenario::ready_token(&env, &other).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    let err = handle.start(token).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Session(SessionError::TokenMismatch { .. })));
    assert_eq!(fakes.backend.starts(), 0);

    drop(handle);
    assert_eq!(running.await.unwrap().status, SessionStatus::Terminated);
}

#[tokio::test(start_paused = true)]
async fn camera_loss_mid_exam_is_logged_not_escalated() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::fully_proctored(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = preflight(&env, &exam, &fakes).await;
    // The identity photo was the last frame the device will deliver.
    fakes.camera.end_stream_after(fakes.camera.captures());

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    // First scheduled snapshot.
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(fakes.observer.saw(|n| matches!(n, Notice::CameraError { .. })));
    assert_eq!(fakes.camera.active_streams(), 0);

    handle.teardown().await.unwrap();
    let summary = running.await.unwrap();
    assert_eq!(summary.violation_count, 0);
    assert_eq!(summary.violations_logged, 1);

    settle().await;
    let violations = fakes.backend.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].event.kind, ViolationKind::FaceNotDetected);
}

#[tokio::test(start_paused = true)]
async fn offline_backend_does_not_block_answers() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = scenario::ready_token(&env, &exam).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    fakes.backend.set_offline(true);
    handle.answer("q1", "d").await.unwrap();
    fakes.signals.fire(IntegritySignal::CopyAttempt);
    settle().await;
    assert!(fakes.backend.persisted_answers().is_empty());
    assert!(fakes.backend.violations().is_empty());

    // The final submission still carries the answer.
    handle.submit().await.unwrap();
    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Submitted);
    assert_eq!(fakes.backend.submissions()[0].answers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn signal_burst_is_counted_with_a_small_queue() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = scenario::ready_token(&env, &exam).unwrap();
    let config = RuntimeConfig { queue_capacity: 1, ..scenario::runtime_config() };

    let (driver, handle) = SessionDriver::new(env, exam, &config, fakes.platform());
    let running = tokio::spawn(driver.run());
    handle.start(token).await.unwrap();

    // Fired back to back, before the driver gets a chance to drain anything.
    for _ in 0..3 {
        fakes.signals.fire(IntegritySignal::VisibilityLost);
    }

    let summary = running.await.unwrap();
    assert_eq!(summary.trigger, Some(SubmitTrigger::ViolationLimit));
    assert_eq!(summary.violation_count, 3);
}

#[tokio::test(start_paused = true)]
async fn stuck_frame_does_not_hold_up_commands() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::fully_proctored(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = preflight(&env, &exam, &fakes).await;
    fakes.camera.hang_captures();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(token).await.unwrap();
    settle().await;
    assert_eq!(fakes.camera.active_streams(), 1);

    // The evidence frame for this violation never arrives.
    fakes.signals.fire(IntegritySignal::ContextMenu);
    settle().await;

    handle.answer("q1", "a").await.unwrap();
    handle.teardown().await.unwrap();
    let summary = running.await.unwrap();
    assert_eq!(summary.status, SessionStatus::Terminated);
    assert_eq!(summary.violations_logged, 1);

    settle().await;
    assert_eq!(fakes.camera.active_streams(), 0);
    assert_eq!(fakes.backend.violations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn token_missing_identity_never_reaches_the_server() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::fully_proctored(3));
    // Same exam id, but the gate ran without the identity stage.
    let unverified = ExamSettings { proctoring: scenario::signals_only(3), ..exam.clone() };
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let token = scenario::ready_token(&env, &unverified).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    let err = handle.start(token).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Session(SessionError::NotReady { .. })));
    assert_eq!(fakes.backend.starts(), 0);

    drop(handle);
    assert_eq!(running.await.unwrap().status, SessionStatus::Terminated);
}

#[tokio::test(start_paused = true)]
async fn second_start_does_not_open_another_attempt() {
    let env = SystemEnv::default();
    let exam = scenario::exam(scenario::signals_only(3));
    let fakes = FakePlatform::new(&exam, scenario::opened(2, Duration::from_secs(3600)));
    let first = scenario::ready_token(&env, &exam).unwrap();
    let second = scenario::ready_token(&env, &exam).unwrap();

    let (driver, handle) =
        SessionDriver::new(env, exam, &scenario::runtime_config(), fakes.platform());
    let running = tokio::spawn(driver.run());

    handle.start(first).await.unwrap();
    let err = handle.start(second).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Session(SessionError::InvalidState { .. })));
    assert_eq!(fakes.backend.starts(), 1);

    handle.teardown().await.unwrap();
    running.await.unwrap();
}
