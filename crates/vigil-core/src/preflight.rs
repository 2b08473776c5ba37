//! Pre-flight gate.
//!
//! Three-stage readiness wizard that must complete before a monitored
//! session may open.
//!
//! ```text
//! Instructions ──▶ SystemCheck ──▶ IdentityVerification ──▶ Ready
//!                       │                                     ▲
//!                       └──── (no identity requirement) ──────┘
//! ```
//!
//! Moving forward is one validated step at a time; moving backward never
//! re-validates. A rejected step leaves the stage untouched. The gate holds
//! the identity-capture camera from the camera check until `Ready`, when it
//! asks for release so the in-exam camera monitor can acquire its own
//! stream.

use std::collections::BTreeMap;

use crate::{
    camera::{CameraFailure, Snapshot},
    error::{GateError, SessionError},
    exam::{ExamId, ExamSettings, ProctoringSettings},
};

/// User-agent tokens accepted by the default browser allow-list.
pub const DEFAULT_BROWSER_ALLOW_LIST: &[&str] = &["Chrome", "Firefox", "Safari", "Edg"];

/// Wizard stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GateStage {
    /// Rules and instructions.
    Instructions,
    /// Environment checks.
    SystemCheck,
    /// Identity photo and rules acknowledgement.
    IdentityVerification,
    /// Complete.
    Ready,
}

/// One environment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemCheck {
    /// Browser is on the allow-list.
    Browser,
    /// Camera can be acquired.
    Camera,
    /// Fullscreen is supported.
    Fullscreen,
    /// Notification permission granted.
    Notifications,
}

impl SystemCheck {
    /// Stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Camera => "camera",
            Self::Fullscreen => "fullscreen",
            Self::Notifications => "notifications",
        }
    }
}

/// Result of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Not reported yet.
    Pending,
    /// Passed, with a user-facing detail.
    Passed(String),
    /// Failed, with a user-facing reason.
    Failed(String),
}

impl CheckStatus {
    /// Whether the check passed.
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }
}

/// Requests from the gate to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Run a probe and report it back. For [`SystemCheck::Camera`] the probe
    /// is acquiring the identity-capture stream.
    RunCheck(SystemCheck),
    /// Release the identity-capture stream.
    ReleaseCamera,
}

/// Gate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Checks that must pass.
    pub checks: Vec<SystemCheck>,
    /// User-agent substrings accepted by the browser check.
    pub browser_allow_list: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            checks: vec![
                SystemCheck::Browser,
                SystemCheck::Camera,
                SystemCheck::Fullscreen,
                SystemCheck::Notifications,
            ],
            browser_allow_list: DEFAULT_BROWSER_ALLOW_LIST.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Proof that pre-flight completed.
///
/// Only the gate can build one and it is deliberately not `Clone`: the
/// session controller takes it by value, so it is consumed exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct ReadinessToken {
    exam_id: ExamId,
    checks: BTreeMap<SystemCheck, bool>,
    identity_snapshot: Option<Snapshot>,
    acknowledged_rules: bool,
}

impl ReadinessToken {
    /// Exam the gate ran for.
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    /// Per-check pass flags.
    pub fn checks(&self) -> &BTreeMap<SystemCheck, bool> {
        &self.checks
    }

    /// Whether every recorded check passed.
    pub fn all_checks_passed(&self) -> bool {
        self.checks.values().all(|passed| *passed)
    }

    /// Confirmed identity photo, when identity verification ran.
    pub fn identity_snapshot(&self) -> Option<&Snapshot> {
        self.identity_snapshot.as_ref()
    }

    /// Whether the rules checkbox was ticked.
    pub fn acknowledged_rules(&self) -> bool {
        self.acknowledged_rules
    }

    /// Whether this token may open a session of `exam`.
    ///
    /// Pure, so callers can check before asking the server to open an
    /// attempt.
    pub fn admits(&self, exam: &ExamSettings) -> Result<(), SessionError> {
        if self.exam_id != exam.id {
            return Err(SessionError::TokenMismatch {
                expected: exam.id.clone(),
                actual: self.exam_id.clone(),
            });
        }
        if !self.all_checks_passed() {
            return Err(SessionError::NotReady { reason: "system checks did not pass".to_string() });
        }
        if exam.proctoring.requires_identity() {
            if self.identity_snapshot.is_none() {
                return Err(SessionError::NotReady {
                    reason: "identity was not verified".to_string(),
                });
            }
            if !self.acknowledged_rules {
                return Err(SessionError::NotReady {
                    reason: "exam rules were not acknowledged".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Take the identity photo out of the token.
    pub fn into_identity_snapshot(self) -> Option<Snapshot> {
        self.identity_snapshot
    }
}

/// The wizard.
#[derive(Debug)]
pub struct PreflightGate {
    exam_id: ExamId,
    proctoring: ProctoringSettings,
    config: GateConfig,
    stage: GateStage,
    checks: BTreeMap<SystemCheck, CheckStatus>,
    identity: Option<Snapshot>,
    identity_confirmed: bool,
    rules_acknowledged: bool,
    camera_held: bool,
}

impl PreflightGate {
    /// Create a gate for an exam.
    pub fn new(exam: &ExamSettings, config: GateConfig) -> Self {
        let checks = config.checks.iter().map(|c| (*c, CheckStatus::Pending)).collect();
        Self {
            exam_id: exam.id.clone(),
            proctoring: exam.proctoring,
            config,
            stage: GateStage::Instructions,
            checks,
            identity: None,
            identity_confirmed: false,
            rules_acknowledged: false,
            camera_held: false,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> GateStage {
        self.stage
    }

    /// Status of a configured check.
    pub fn check(&self, check: SystemCheck) -> Option<&CheckStatus> {
        self.checks.get(&check)
    }

    /// Whether the gate currently holds the identity-capture camera.
    pub fn camera_held(&self) -> bool {
        self.camera_held
    }

    /// Captured identity photo, confirmed or not.
    pub fn identity(&self) -> Option<&Snapshot> {
        self.identity.as_ref()
    }

    /// Move one stage forward.
    ///
    /// On rejection the stage is unchanged and the error carries the
    /// user-facing reason.
    pub fn advance(&mut self) -> Result<Vec<GateAction>, GateError> {
        match self.stage {
            GateStage::Instructions => Ok(self.enter_system_check()),
            GateStage::SystemCheck => {
                let failing = self.failing_checks();
                if !failing.is_empty() {
                    return Err(GateError::ChecksNotPassed { failing });
                }

                if self.proctoring.requires_identity() {
                    self.stage = GateStage::IdentityVerification;
                    Ok(self.acquire_for_identity().into_iter().collect())
                } else {
                    Ok(self.enter_ready())
                }
            },
            GateStage::IdentityVerification => {
                if self.identity.is_none() {
                    return Err(GateError::IdentityNotCaptured);
                }
                if !self.identity_confirmed {
                    return Err(GateError::IdentityNotConfirmed);
                }
                if !self.rules_acknowledged {
                    return Err(GateError::RulesNotAcknowledged);
                }
                Ok(self.enter_ready())
            },
            GateStage::Ready => Err(GateError::AlreadyReady),
        }
    }

    /// Move one stage back without validation.
    ///
    /// Leaving `SystemCheck` for `Instructions` releases the camera, since
    /// re-entering `SystemCheck` acquires it again.
    pub fn back(&mut self) -> Vec<GateAction> {
        match self.stage {
            GateStage::Instructions | GateStage::Ready => Vec::new(),
            GateStage::SystemCheck => {
                self.stage = GateStage::Instructions;
                self.release_camera().into_iter().collect()
            },
            GateStage::IdentityVerification => {
                self.stage = GateStage::SystemCheck;
                Vec::new()
            },
        }
    }

    /// Report the browser user agent.
    pub fn record_browser(&mut self, user_agent: &str) {
        let status = if browser_supported(user_agent, &self.config.browser_allow_list) {
            CheckStatus::Passed("Browser supported".to_string())
        } else {
            CheckStatus::Failed("Use a recent Chrome, Firefox, Safari or Edge".to_string())
        };
        self.set_check(SystemCheck::Browser, status);
    }

    /// The identity-capture camera was acquired.
    ///
    /// Returns a release request when the gate no longer wants the stream
    /// (the user navigated away while it was being acquired).
    pub fn camera_acquired(&mut self) -> Option<GateAction> {
        if self.stage != GateStage::SystemCheck && self.stage != GateStage::IdentityVerification {
            return Some(GateAction::ReleaseCamera);
        }
        self.camera_held = true;
        self.set_check(SystemCheck::Camera, CheckStatus::Passed("Camera ready".to_string()));
        None
    }

    /// Camera acquisition failed.
    ///
    /// Fails the check for camera-proctored exams; otherwise the check passes
    /// with a note. An identity-only exam asks for the camera again on entering
    /// identity verification, and the photo cannot be taken without it.
    pub fn camera_failed(&mut self, failure: &CameraFailure) {
        self.camera_held = false;
        let reason = match failure {
            CameraFailure::Denied => "Camera access was denied".to_string(),
            CameraFailure::Unavailable { reason } => format!("Camera error: {reason}"),
        };
        let status = if self.proctoring.camera_monitored() {
            CheckStatus::Failed(reason)
        } else {
            CheckStatus::Passed(format!("{reason} (camera not required)"))
        };
        self.set_check(SystemCheck::Camera, status);
    }

    /// Report a boolean probe (fullscreen, notifications).
    pub fn record_probe(&mut self, check: SystemCheck, passed: bool) {
        let status = if passed {
            CheckStatus::Passed(format!("{} available", check.as_str()))
        } else {
            CheckStatus::Failed(format!("{} not available", check.as_str()))
        };
        self.set_check(check, status);
    }

    /// Store a freshly captured identity photo (unconfirmed).
    pub fn capture_identity(&mut self, snapshot: Snapshot) -> Result<(), GateError> {
        if self.stage != GateStage::IdentityVerification {
            return Err(GateError::NotReady);
        }
        if !self.camera_held {
            return Err(GateError::CameraUnavailable);
        }
        self.identity = Some(snapshot);
        self.identity_confirmed = false;
        Ok(())
    }

    /// Confirm the captured photo.
    pub fn confirm_identity(&mut self) -> Result<(), GateError> {
        if self.identity.is_none() {
            return Err(GateError::IdentityNotCaptured);
        }
        self.identity_confirmed = true;
        Ok(())
    }

    /// Discard the photo so a new one can be taken.
    pub fn retake_identity(&mut self) {
        self.identity = None;
        self.identity_confirmed = false;
    }

    /// Tick or untick the rules checkbox.
    pub fn acknowledge_rules(&mut self, acknowledged: bool) {
        self.rules_acknowledged = acknowledged;
    }

    /// Produce the readiness token. Only valid in `Ready`.
    pub fn into_token(self) -> Result<ReadinessToken, GateError> {
        if self.stage != GateStage::Ready {
            return Err(GateError::NotReady);
        }

        let checks = self.checks.iter().map(|(check, status)| (*check, status.passed())).collect();
        let identity_snapshot = if self.identity_confirmed { self.identity } else { None };

        Ok(ReadinessToken {
            exam_id: self.exam_id,
            checks,
            identity_snapshot,
            acknowledged_rules: self.rules_acknowledged,
        })
    }

    fn enter_system_check(&mut self) -> Vec<GateAction> {
        self.stage = GateStage::SystemCheck;
        let mut actions = Vec::new();

        let configured: Vec<SystemCheck> = self.checks.keys().copied().collect();
        for check in configured {
            if check == SystemCheck::Camera {
                if !self.wants_camera() {
                    self.set_check(
                        check,
                        CheckStatus::Passed("Camera not required for this exam".to_string()),
                    );
                    continue;
                }
                if self.camera_held {
                    self.set_check(check, CheckStatus::Passed("Camera ready".to_string()));
                    continue;
                }
            }
            self.set_check(check, CheckStatus::Pending);
            actions.push(GateAction::RunCheck(check));
        }

        actions
    }

    /// The identity photo needs a stream even when the exam itself is not
    /// camera-monitored.
    fn wants_camera(&self) -> bool {
        self.proctoring.camera_monitored() || self.proctoring.requires_identity()
    }

    fn acquire_for_identity(&self) -> Option<GateAction> {
        (!self.camera_held).then_some(GateAction::RunCheck(SystemCheck::Camera))
    }

    fn enter_ready(&mut self) -> Vec<GateAction> {
        self.stage = GateStage::Ready;
        self.release_camera().into_iter().collect()
    }

    fn release_camera(&mut self) -> Option<GateAction> {
        if self.camera_held {
            self.camera_held = false;
            Some(GateAction::ReleaseCamera)
        } else {
            None
        }
    }

    fn set_check(&mut self, check: SystemCheck, status: CheckStatus) {
        // Results for checks outside the configured set are ignored.
        if let Some(slot) = self.checks.get_mut(&check) {
            *slot = status;
        }
    }

    fn failing_checks(&self) -> Vec<SystemCheck> {
        self.checks.iter().filter(|(_, status)| !status.passed()).map(|(check, _)| *check).collect()
    }
}

/// Whether a user agent matches any allow-list entry.
pub fn browser_supported(user_agent: &str, allow_list: &[String]) -> bool {
    allow_list.iter().any(|token| user_agent.contains(token.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use chrono::{DateTime, Utc};

    use super::*;

    const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

    fn exam(proctoring: ProctoringSettings) -> ExamSettings {
        ExamSettings {
            id: "exam-1".into(),
            title: "Networks".to_string(),
            duration: Duration::from_secs(3600),
            instructions: vec!["No notes".to_string()],
            proctoring,
        }
    }

    fn proctored() -> ProctoringSettings {
        ProctoringSettings {
            enabled: true,
            camera_required: true,
            identity_verification: true,
            tab_switch_limit: 3,
        }
    }

    fn photo() -> Snapshot {
        Snapshot { image: Bytes::from_static(b"jpeg"), captured_at: DateTime::<Utc>::UNIX_EPOCH }
    }

    fn pass_all(gate: &mut PreflightGate) {
        gate.record_browser(CHROME_UA);
        gate.camera_acquired();
        gate.record_probe(SystemCheck::Fullscreen, true);
        gate.record_probe(SystemCheck::Notifications, true);
    }

    #[test]
    fn entering_system_check_runs_every_probe() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        let actions = gate.advance().unwrap();

        assert_eq!(gate.stage(), GateStage::SystemCheck);
        assert_eq!(
            actions,
            vec![
                GateAction::RunCheck(SystemCheck::Browser),
                GateAction::RunCheck(SystemCheck::Camera),
                GateAction::RunCheck(SystemCheck::Fullscreen),
                GateAction::RunCheck(SystemCheck::Notifications),
            ]
        );
    }

    #[test]
    fn camera_check_auto_passes_when_not_required() {
        let settings = ProctoringSettings {
            camera_required: false,
            identity_verification: false,
            ..proctored()
        };
        let mut gate = PreflightGate::new(&exam(settings), GateConfig::default());
        let actions = gate.advance().unwrap();

        assert!(!actions.contains(&GateAction::RunCheck(SystemCheck::Camera)));
        assert!(gate.check(SystemCheck::Camera).unwrap().passed());
    }

    #[test]
    fn failing_check_blocks_without_changing_stage() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        gate.advance().unwrap();
        gate.record_browser("Lynx/2.8");
        gate.camera_acquired();
        gate.record_probe(SystemCheck::Fullscreen, true);
        gate.record_probe(SystemCheck::Notifications, true);

        let err = gate.advance().unwrap_err();
        assert_eq!(err, GateError::ChecksNotPassed { failing: vec![SystemCheck::Browser] });
        assert_eq!(gate.stage(), GateStage::SystemCheck);
    }

    #[test]
    fn pending_check_blocks() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        gate.advance().unwrap();
        gate.record_browser(CHROME_UA);

        let err = gate.advance().unwrap_err();
        assert!(matches!(err, GateError::ChecksNotPassed { .. }));
        assert_eq!(gate.stage(), GateStage::SystemCheck);
    }

    #[test]
    fn camera_failure_is_fatal_only_when_required() {
        let mut required = PreflightGate::new(&exam(proctored()), GateConfig::default());
        required.advance().unwrap();
        required.camera_failed(&CameraFailure::Denied);
        assert!(!required.check(SystemCheck::Camera).unwrap().passed());

        let optional_settings = ProctoringSettings { camera_required: false, ..proctored() };
        let mut optional = PreflightGate::new(&exam(optional_settings), GateConfig::default());
        optional.advance().unwrap();
        optional.camera_failed(&CameraFailure::Unavailable { reason: "busy".to_string() });
        assert!(optional.check(SystemCheck::Camera).unwrap().passed());
    }

    #[test]
    fn identity_only_exam_acquires_camera_for_the_photo() {
        let settings = ProctoringSettings { camera_required: false, ..proctored() };
        let mut gate = PreflightGate::new(&exam(settings), GateConfig::default());

        let actions = gate.advance().unwrap();
        assert!(actions.contains(&GateAction::RunCheck(SystemCheck::Camera)));
        pass_all(&mut gate);
        assert!(gate.camera_held());

        assert!(gate.advance().unwrap().is_empty());
        gate.capture_identity(photo()).unwrap();
        gate.confirm_identity().unwrap();
        gate.acknowledge_rules(true);

        assert_eq!(gate.advance().unwrap(), vec![GateAction::ReleaseCamera]);
        assert_eq!(gate.stage(), GateStage::Ready);
        assert!(gate.into_token().unwrap().identity_snapshot().is_some());
    }

    #[test]
    fn identity_stage_retries_camera_that_failed_optionally() {
        let settings = ProctoringSettings { camera_required: false, ..proctored() };
        let mut gate = PreflightGate::new(&exam(settings), GateConfig::default());
        gate.advance().unwrap();
        gate.record_browser(CHROME_UA);
        gate.camera_failed(&CameraFailure::Unavailable { reason: "busy".to_string() });
        gate.record_probe(SystemCheck::Fullscreen, true);
        gate.record_probe(SystemCheck::Notifications, true);

        let actions = gate.advance().unwrap();
        assert_eq!(gate.stage(), GateStage::IdentityVerification);
        assert_eq!(actions, vec![GateAction::RunCheck(SystemCheck::Camera)]);
        assert_eq!(gate.capture_identity(photo()).unwrap_err(), GateError::CameraUnavailable);

        assert_eq!(gate.camera_acquired(), None);
        gate.capture_identity(photo()).unwrap();
    }

    #[test]
    fn identity_stage_skipped_when_not_required() {
        let settings = ProctoringSettings { identity_verification: false, ..proctored() };
        let mut gate = PreflightGate::new(&exam(settings), GateConfig::default());
        gate.advance().unwrap();
        pass_all(&mut gate);

        let actions = gate.advance().unwrap();
        assert_eq!(gate.stage(), GateStage::Ready);
        assert_eq!(actions, vec![GateAction::ReleaseCamera]);
    }

    #[test]
    fn identity_requires_confirmed_photo_and_rules() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        gate.advance().unwrap();
        pass_all(&mut gate);
        gate.advance().unwrap();
        assert_eq!(gate.stage(), GateStage::IdentityVerification);

        assert_eq!(gate.advance().unwrap_err(), GateError::IdentityNotCaptured);

        gate.capture_identity(photo()).unwrap();
        assert_eq!(gate.advance().unwrap_err(), GateError::IdentityNotConfirmed);

        gate.confirm_identity().unwrap();
        assert_eq!(gate.advance().unwrap_err(), GateError::RulesNotAcknowledged);
        assert_eq!(gate.stage(), GateStage::IdentityVerification);

        gate.acknowledge_rules(true);
        let actions = gate.advance().unwrap();
        assert_eq!(gate.stage(), GateStage::Ready);
        assert_eq!(actions, vec![GateAction::ReleaseCamera]);
        assert!(!gate.camera_held());

        let token = gate.into_token().unwrap();
        assert!(token.all_checks_passed());
        assert!(token.acknowledged_rules());
        assert_eq!(token.identity_snapshot(), Some(&photo()));
    }

    #[test]
    fn retake_resets_confirmation() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        gate.advance().unwrap();
        pass_all(&mut gate);
        gate.advance().unwrap();
        gate.capture_identity(photo()).unwrap();
        gate.confirm_identity().unwrap();
        gate.retake_identity();
        gate.acknowledge_rules(true);

        assert_eq!(gate.advance().unwrap_err(), GateError::IdentityNotCaptured);
    }

    #[test]
    fn back_navigation_is_unvalidated_and_forward_revalidates() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        gate.advance().unwrap();
        pass_all(&mut gate);
        gate.advance().unwrap();

        assert!(gate.back().is_empty());
        assert_eq!(gate.stage(), GateStage::SystemCheck);

        assert_eq!(gate.back(), vec![GateAction::ReleaseCamera]);
        assert_eq!(gate.stage(), GateStage::Instructions);

        // Re-entering SystemCheck runs the probes again, so moving straight
        // on is rejected until they report.
        let actions = gate.advance().unwrap();
        assert!(actions.contains(&GateAction::RunCheck(SystemCheck::Camera)));
        assert!(gate.advance().is_err());
        assert_eq!(gate.stage(), GateStage::SystemCheck);
    }

    #[test]
    fn token_admits_only_the_exam_it_was_gated_for() {
        let settings = ProctoringSettings { identity_verification: false, ..proctored() };
        let gated = exam(settings);
        let mut gate = PreflightGate::new(&gated, GateConfig::default());
        gate.advance().unwrap();
        pass_all(&mut gate);
        gate.advance().unwrap();
        let token = gate.into_token().unwrap();

        assert!(token.admits(&gated).is_ok());
        assert!(matches!(token.admits(&exam(proctored())), Err(SessionError::NotReady { .. })));

        let other = ExamSettings { id: "exam-2".into(), ..gated };
        assert!(matches!(token.admits(&other), Err(SessionError::TokenMismatch { .. })));
    }

    #[test]
    fn token_only_when_ready() {
        let gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        assert_eq!(gate.into_token().unwrap_err(), GateError::NotReady);
    }

    #[test]
    fn late_camera_after_leaving_is_released() {
        let mut gate = PreflightGate::new(&exam(proctored()), GateConfig::default());
        gate.advance().unwrap();
        gate.back();

        assert_eq!(gate.camera_acquired(), Some(GateAction::ReleaseCamera));
        assert!(!gate.camera_held());
    }

    #[test]
    fn allow_list_matching() {
        let list: Vec<String> = DEFAULT_BROWSER_ALLOW_LIST.iter().map(ToString::to_string).collect();
        assert!(browser_supported(CHROME_UA, &list));
        assert!(browser_supported("Mozilla/5.0 Firefox/128.0", &list));
        assert!(!browser_supported("Opera Mini", &list));
    }
}
