//! Scenario builders.
//!
//! Exams, opened sessions and readiness tokens for tests, without HTTP or a
//! camera.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use vigil_core::{
    AnswerOption, Environment, ExamSettings, GateConfig, OpenedSession, PreflightGate,
    ProctoringSettings, Question, QuestionKind, ReadinessToken, Snapshot, SystemCheck,
};
use vigil_runtime::{Platform, RuntimeConfig};

use crate::fakes::{FAKE_FRAME, FakeBackend, FakeCamera, FakeSignals, RecordingObserver};

/// Identifier used for every scenario exam.
pub const EXAM_ID: &str = "exam-1";

/// Identifier of the attempt the fake backend opens.
pub const RESULT_ID: &str = "result-1";

/// Proctoring with camera and identity verification.
pub fn fully_proctored(tab_switch_limit: u32) -> ProctoringSettings {
    ProctoringSettings {
        enabled: true,
        camera_required: true,
        identity_verification: true,
        tab_switch_limit,
    }
}

/// Integrity monitoring without a camera.
pub fn signals_only(tab_switch_limit: u32) -> ProctoringSettings {
    ProctoringSettings {
        enabled: true,
        camera_required: false,
        identity_verification: false,
        tab_switch_limit,
    }
}

/// Exam metadata. The advertised duration is ignored once the server
/// reports its own at start.
pub fn exam(proctoring: ProctoringSettings) -> ExamSettings {
    ExamSettings {
        id: EXAM_ID.into(),
        title: "Operating Systems".to_string(),
        duration: Duration::from_secs(60 * 60),
        instructions: vec!["Stay on this tab".to_string()],
        proctoring,
    }
}

/// `count` questions alternating MCQ (`q{i}` with options `a`..`d`) and
/// true/false.
pub fn questions(count: usize) -> Vec<Question> {
    (1..=count)
        .map(|i| {
            let kind = if i % 2 == 1 {
                QuestionKind::Mcq {
                    options: ["a", "b", "c", "d"]
                        .iter()
                        .map(|id| AnswerOption { id: (*id).into(), text: format!("Option {id}") })
                        .collect(),
                }
            } else {
                QuestionKind::TrueFalse
            };
            Question { id: format!("q{i}").into(), text: format!("Question {i}"), kind }
        })
        .collect()
}

/// What the server returns from start.
pub fn opened(count: usize, duration: Duration) -> OpenedSession {
    OpenedSession {
        result_id: RESULT_ID.into(),
        student_id: "student-1".into(),
        duration,
        questions: questions(count),
    }
}

/// Still image as the fake camera produces it.
pub fn frame<E: Environment>(env: &E) -> Snapshot {
    Snapshot { image: Bytes::from_static(FAKE_FRAME), captured_at: env.wall_clock() }
}

/// Walk a gate to `Ready` with every check passing.
pub fn ready_token<E: Environment>(env: &E, exam: &ExamSettings) -> Option<ReadinessToken> {
    let mut gate = PreflightGate::new(exam, GateConfig::default());
    gate.advance().ok()?;

    gate.record_browser("Mozilla/5.0 Chrome/126.0");
    gate.camera_acquired();
    gate.record_probe(SystemCheck::Fullscreen, true);
    gate.record_probe(SystemCheck::Notifications, true);
    gate.advance().ok()?;

    if exam.proctoring.requires_identity() {
        gate.capture_identity(frame(env)).ok()?;
        gate.confirm_identity().ok()?;
        gate.acknowledge_rules(true);
        gate.advance().ok()?;
    }

    gate.into_token().ok()
}

/// Fakes wired into a [`Platform`], kept for inspection.
#[derive(Debug, Clone)]
pub struct FakePlatform {
    /// Exam Service.
    pub backend: Arc<FakeBackend>,
    /// Camera device.
    pub camera: FakeCamera,
    /// Signal source.
    pub signals: FakeSignals,
    /// Observer.
    pub observer: Arc<RecordingObserver>,
}

impl FakePlatform {
    /// Fakes serving `exam` and opening `session`.
    pub fn new(exam: &ExamSettings, session: OpenedSession) -> Self {
        Self {
            backend: Arc::new(FakeBackend::new(exam.clone(), session)),
            camera: FakeCamera::working(),
            signals: FakeSignals::new(),
            observer: Arc::new(RecordingObserver::new()),
        }
    }

    /// The trait-object view the driver takes.
    pub fn platform(&self) -> Platform {
        Platform {
            backend: self.backend.clone(),
            camera: Arc::new(self.camera.clone()),
            signals: Arc::new(self.signals.clone()),
            observer: self.observer.clone(),
        }
    }
}

/// Default runtime configuration.
pub fn runtime_config() -> RuntimeConfig {
    RuntimeConfig::default()
}
