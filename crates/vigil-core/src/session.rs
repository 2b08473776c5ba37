//! Session controller.
//!
//! Owns the exam session and is the only component that mutates it. The
//! timer, integrity monitor, camera monitor and answer store are plain state
//! machines held here; they return requests and the controller turns those
//! into [`SessionAction`]s.
//!
//! ```text
//! Gating ──▶ InProgress ──▶ Submitting ──▶ Submitted
//!    │            │              │
//!    └────────────┴──────────────┴──▶ Terminated (teardown)
//! ```
//!
//! # Invariants
//!
//! - Exactly one terminal transition. Once `Submitted` or `Terminated`,
//!   every event is a no-op.
//! - Manual submit, timer expiry and violation escalation converge on one
//!   routine behind a [`SubmitGuard`]; the first trigger wins and the
//!   payload is the answer snapshot at that moment.
//! - The deadline is fixed at open from the monotonic clock plus the
//!   server-reported duration.

use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

use crate::{
    answers::{AnswerStore, Navigation},
    camera::{
        CameraCommand, CameraFailure, CameraMonitor, CameraState, SNAPSHOT_INTERVAL, Snapshot,
        SnapshotPurpose,
    },
    env::Environment,
    error::SessionError,
    event::{
        CameraEvent, Notice, SessionAction, SessionEvent, SessionSummary, SubmissionReceipt,
        SubmissionRequest, SubmitTrigger,
    },
    exam::{
        DEFAULT_TAB_SWITCH_LIMIT, ExamId, ExamSettings, OpenedSession, OptionId, QuestionId,
        ResultId, StudentId,
    },
    guard::{SubmitGuard, SubmitPhase},
    integrity::{Escalation, IntegrityMonitor, IntegritySignal, warning_message},
    preflight::ReadinessToken,
    timer::{ClockReading, Timer, format_remaining},
    violation::{ViolationEvent, ViolationRecord, ViolationReport},
};

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Waiting for the pre-flight gate.
    Gating,
    /// Answers are being collected.
    InProgress,
    /// A submission is outstanding.
    Submitting,
    /// The server confirmed the submission.
    Submitted,
    /// Abandoned before a submission was confirmed.
    Terminated,
}

impl SessionStatus {
    /// Stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gating => "gating",
            Self::InProgress => "in_progress",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Terminated => "terminated",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::Terminated)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cadences and thresholds applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Timer cadence.
    pub tick: Duration,
    /// Scheduled snapshot period.
    pub snapshot_interval: Duration,
    /// How long tab-switch warnings stay on screen.
    pub warning_duration: Duration,
    /// Remaining-time thresholds that raise a low-time notice.
    pub low_time: Vec<Duration>,
    /// Limit used when the exam reports none (zero).
    pub default_tab_switch_limit: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            snapshot_interval: SNAPSHOT_INTERVAL,
            warning_duration: Duration::from_secs(3),
            low_time: vec![Duration::from_secs(5 * 60), Duration::from_secs(60)],
            default_tab_switch_limit: DEFAULT_TAB_SWITCH_LIMIT,
        }
    }
}

/// State that exists once the session is open.
#[derive(Debug)]
struct ActiveSession {
    result_id: ResultId,
    student_id: StudentId,
    timer: Timer,
    answers: AnswerStore,
    integrity: Option<IntegrityMonitor>,
    camera: Option<CameraMonitor>,
    /// Violations waiting for their evidence frame, by log sequence.
    pending_evidence: BTreeMap<u64, ViolationReport>,
    submission: Option<SubmissionRequest>,
    receipt: Option<SubmissionReceipt>,
    timer_running: bool,
    signals_attached: bool,
}

impl ActiveSession {
    /// Forward a violation, or hold it until an evidence frame arrives.
    fn route_violation(&mut self, report: ViolationReport) -> SessionAction {
        match self.camera.as_ref().and_then(|c| c.evidence(report.sequence)) {
            Some(capture) => {
                self.pending_evidence.insert(report.sequence, report);
                SessionAction::Camera(capture)
            },
            None => SessionAction::ForwardViolation(Box::new(report)),
        }
    }

    fn resolve_evidence(
        &mut self,
        sequence: u64,
        evidence: Option<Snapshot>,
    ) -> Option<SessionAction> {
        let mut report = self.pending_evidence.remove(&sequence)?;
        report.event.evidence = evidence;
        Some(SessionAction::ForwardViolation(Box::new(report)))
    }

    fn report(
        &self,
        exam_id: &ExamId,
        integrity: &IntegrityMonitor,
        event: ViolationEvent,
        client_event_id: u64,
    ) -> ViolationReport {
        let sequence = u64::try_from(integrity.log().len().saturating_sub(1)).unwrap_or(u64::MAX);
        ViolationReport {
            exam_id: exam_id.clone(),
            result_id: self.result_id.clone(),
            sequence,
            client_event_id,
            violation_count: integrity.count(),
            tab_switch_limit: integrity.limit(),
            event,
        }
    }
}

/// Session controller state machine.
///
/// Pure state machine: returns actions, the caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
#[derive(Debug)]
pub struct SessionController<E: Environment> {
    env: E,
    exam: ExamSettings,
    policy: SessionPolicy,
    status: SessionStatus,
    guard: SubmitGuard,
    identity: Option<Snapshot>,
    active: Option<ActiveSession>,
}

impl<E: Environment> SessionController<E> {
    /// Create a controller in `Gating` for an exam.
    pub fn new(env: E, exam: ExamSettings, policy: SessionPolicy) -> Self {
        Self {
            env,
            exam,
            policy,
            status: SessionStatus::Gating,
            guard: SubmitGuard::new(),
            identity: None,
            active: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Exam metadata.
    pub fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    /// Applied policy.
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Attempt identifier, once open.
    pub fn result_id(&self) -> Option<&ResultId> {
        self.active.as_ref().map(|a| &a.result_id)
    }

    /// Student, once open.
    pub fn student_id(&self) -> Option<&StudentId> {
        self.active.as_ref().map(|a| &a.student_id)
    }

    /// Answer store, once open.
    pub fn answers(&self) -> Option<&AnswerStore> {
        self.active.as_ref().map(|a| &a.answers)
    }

    /// Absolute deadline, once open.
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.timer.deadline())
    }

    /// Time left right now, once open.
    pub fn remaining(&self) -> Option<Duration> {
        self.active.as_ref().map(|a| a.timer.remaining(ClockReading::of(&self.env)))
    }

    /// Escalating violations counted.
    pub fn violation_count(&self) -> u32 {
        self.integrity().map_or(0, IntegrityMonitor::count)
    }

    /// Append-only violation log.
    pub fn violation_log(&self) -> &[ViolationRecord] {
        self.integrity().map(IntegrityMonitor::log).unwrap_or_default()
    }

    /// In-exam camera state, when the camera is monitored.
    pub fn camera_state(&self) -> Option<CameraState> {
        self.active.as_ref().and_then(|a| a.camera.as_ref()).map(CameraMonitor::state)
    }

    /// Most recent in-exam snapshot.
    pub fn latest_snapshot(&self) -> Option<&Snapshot> {
        self.active.as_ref().and_then(|a| a.camera.as_ref()).and_then(CameraMonitor::latest)
    }

    /// Identity photo handed over by the gate.
    pub fn identity_snapshot(&self) -> Option<&Snapshot> {
        self.identity.as_ref()
    }

    /// Submit guard phase.
    pub fn submit_phase(&self) -> SubmitPhase {
        self.guard.phase()
    }

    /// The submission, once one started.
    pub fn submission(&self) -> Option<&SubmissionRequest> {
        self.active.as_ref().and_then(|a| a.submission.as_ref())
    }

    /// Server acknowledgement, once confirmed.
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.active.as_ref().and_then(|a| a.receipt.as_ref())
    }

    /// Violations still waiting for an evidence frame.
    pub fn pending_evidence(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.pending_evidence.len())
    }

    /// Current summary.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            exam_id: self.exam.id.clone(),
            result_id: self.result_id().cloned(),
            status: self.status,
            trigger: self.submission().map(|s| s.trigger),
            answered: self.answers().map_or(0, AnswerStore::answered),
            violation_count: self.violation_count(),
            violations_logged: self.violation_log().len(),
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the event is rejected. A rejected event
    /// never changes state.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        if self.status.is_terminal() {
            return Ok(Self::after_close(&event));
        }

        match event {
            SessionEvent::Open { token, session } => self.handle_open(token, session),
            SessionEvent::Tick => Ok(self.handle_tick()),
            SessionEvent::Answer { question_id, option_id } => {
                self.handle_answer(question_id, option_id)
            },
            SessionEvent::Navigate(navigation) => self.handle_navigate(navigation),
            SessionEvent::ToggleFlag { question_id } => self.handle_toggle_flag(question_id),
            SessionEvent::Signal(signal) => Ok(self.handle_signal(signal)),
            SessionEvent::Camera(event) => Ok(self.handle_camera(event)),
            SessionEvent::SubmitRequested => Ok(self.begin_submission(SubmitTrigger::Manual)),
            SessionEvent::RetrySubmit => Ok(self.handle_retry()),
            SessionEvent::SubmitConfirmed { receipt } => Ok(self.handle_confirmed(receipt)),
            SessionEvent::SubmitFailed { reason } => Ok(self.handle_failed(reason)),
            SessionEvent::Teardown => Ok(self.handle_teardown()),
        }
    }

    fn after_close(event: &SessionEvent) -> Vec<SessionAction> {
        // A stream that finished acquiring after close must not stay open.
        if matches!(event, SessionEvent::Camera(CameraEvent::Acquired)) {
            vec![SessionAction::Camera(CameraCommand::Release)]
        } else {
            Vec::new()
        }
    }

    fn handle_open(
        &mut self,
        token: ReadinessToken,
        session: OpenedSession,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.status != SessionStatus::Gating {
            return Err(SessionError::InvalidState {
                reason: format!("cannot open a session that is {}", self.status),
            });
        }

        token.admits(&self.exam)?;
        let proctoring = self.exam.proctoring;
        self.identity = token.into_identity_snapshot();

        let timer =
            Timer::starting_at(ClockReading::of(&self.env), session.duration, &self.policy.low_time);
        let mut actions = vec![
            SessionAction::StartTimer { every: self.policy.tick },
            SessionAction::Notify(clock(session.duration)),
        ];

        let integrity = if proctoring.enabled {
            let limit = match proctoring.tab_switch_limit {
                0 => self.policy.default_tab_switch_limit,
                limit => limit,
            };
            actions.push(SessionAction::AttachSignals);
            Some(IntegrityMonitor::new(limit))
        } else {
            None
        };

        let camera = if proctoring.camera_monitored() {
            let (monitor, command) = CameraMonitor::start(self.policy.snapshot_interval);
            actions.push(SessionAction::Camera(command));
            Some(monitor)
        } else {
            None
        };

        tracing::info!(
            exam_id = %self.exam.id,
            result_id = %session.result_id,
            duration_secs = session.duration.as_secs(),
            questions = session.questions.len(),
            proctored = proctoring.enabled,
            "session opened"
        );

        self.active = Some(ActiveSession {
            result_id: session.result_id,
            student_id: session.student_id,
            timer,
            answers: AnswerStore::new(session.questions),
            signals_attached: integrity.is_some(),
            integrity,
            camera,
            pending_evidence: BTreeMap::new(),
            submission: None,
            receipt: None,
            timer_running: true,
        });
        self.status = SessionStatus::InProgress;

        Ok(actions)
    }

    fn handle_tick(&mut self) -> Vec<SessionAction> {
        if self.status != SessionStatus::InProgress {
            return Vec::new();
        }
        let now = ClockReading::of(&self.env);
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };

        let tick = active.timer.tick(now);
        let mut actions = vec![SessionAction::Notify(clock(tick.remaining))];
        if tick.low_time.is_some() {
            actions.push(SessionAction::Notify(Notice::LowTime { remaining: tick.remaining }));
        }
        if tick.expired {
            tracing::info!(exam_id = %self.exam.id, "time expired");
            actions.extend(self.begin_submission(SubmitTrigger::TimerExpired));
        }

        actions
    }

    fn handle_answer(
        &mut self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.status {
            SessionStatus::InProgress => {},
            SessionStatus::Gating => {
                return Err(SessionError::InvalidState {
                    reason: "session is not open".to_string(),
                });
            },
            status => return Err(SessionError::AnswersClosed { status }),
        }

        let active = self.active_mut()?;
        let answer = active.answers.record(question_id, option_id)?;
        tracing::debug!(
            question_id = %answer.question_id,
            option_id = %answer.selected_option,
            "answer recorded"
        );

        Ok(vec![SessionAction::PersistAnswer { result_id: active.result_id.clone(), answer }])
    }

    fn handle_navigate(&mut self, navigation: Navigation) -> Result<Vec<SessionAction>, SessionError> {
        self.active_mut()?.answers.navigate(navigation)?;
        Ok(Vec::new())
    }

    fn handle_toggle_flag(
        &mut self,
        question_id: QuestionId,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.active_mut()?.answers.toggle_flag(question_id)?;
        Ok(Vec::new())
    }

    fn handle_signal(&mut self, signal: IntegritySignal) -> Vec<SessionAction> {
        if self.status != SessionStatus::InProgress {
            return Vec::new();
        }
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        let Some(mut integrity) = active.integrity.take() else {
            // Not proctored: nothing is listening.
            return Vec::new();
        };

        let assessment = integrity.observe(signal, self.env.wall_clock());
        let report =
            active.report(&self.exam.id, &integrity, assessment.event, self.env.random_u64());
        active.integrity = Some(integrity);

        let mut actions = vec![active.route_violation(report)];
        match assessment.escalation {
            Escalation::Logged => {},
            Escalation::Warn { remaining } => {
                actions.push(SessionAction::Notify(Notice::Warning {
                    message: warning_message(remaining),
                    remaining,
                    dismiss_after: self.policy.warning_duration,
                }));
            },
            Escalation::ForceSubmit => {
                tracing::warn!(
                    exam_id = %self.exam.id,
                    violations = self.violation_count(),
                    "violation limit reached, forcing submission"
                );
                actions.extend(self.begin_submission(SubmitTrigger::ViolationLimit));
            },
        }

        actions
    }

    fn handle_camera(&mut self, event: CameraEvent) -> Vec<SessionAction> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        let Some(camera) = active.camera.as_mut() else {
            return match event {
                CameraEvent::Acquired => vec![SessionAction::Camera(CameraCommand::Release)],
                _ => Vec::new(),
            };
        };

        match event {
            CameraEvent::Acquired => {
                tracing::debug!("camera acquired");
                camera.on_acquired().into_iter().map(SessionAction::Camera).collect()
            },
            CameraEvent::Failed(failure) => self.handle_camera_failure(&failure),
            CameraEvent::SnapshotDue => {
                camera.snapshot_due().map(SessionAction::Camera).into_iter().collect()
            },
            CameraEvent::SnapshotCaptured { snapshot, purpose } => {
                camera.on_snapshot(snapshot.clone());
                match purpose {
                    SnapshotPurpose::Scheduled => Vec::new(),
                    SnapshotPurpose::Evidence { sequence } => {
                        active.resolve_evidence(sequence, Some(snapshot)).into_iter().collect()
                    },
                }
            },
            CameraEvent::SnapshotFailed { purpose, reason } => {
                tracing::warn!(%reason, ?purpose, "snapshot capture failed");
                match purpose {
                    SnapshotPurpose::Scheduled => Vec::new(),
                    SnapshotPurpose::Evidence { sequence } => {
                        active.resolve_evidence(sequence, None).into_iter().collect()
                    },
                }
            },
        }
    }

    fn handle_camera_failure(&mut self, failure: &CameraFailure) -> Vec<SessionAction> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        let Some(camera) = active.camera.as_mut() else {
            return Vec::new();
        };
        if !camera.on_failure(failure) {
            return Vec::new();
        }

        tracing::warn!(failure = %failure.describe(), "camera unavailable");

        let mut actions = Vec::new();
        // A dropped stream still holds the device and its schedule.
        if let Some(release) = camera.stop() {
            actions.push(SessionAction::Camera(release));
        }
        actions.push(SessionAction::Notify(match failure {
            CameraFailure::Denied => Notice::CameraDenied,
            CameraFailure::Unavailable { reason } => Notice::CameraError { reason: reason.clone() },
        }));

        if let Some(mut integrity) = active.integrity.take() {
            let event = integrity.record_camera_failure(failure.describe(), self.env.wall_clock());
            let report = active.report(&self.exam.id, &integrity, event, self.env.random_u64());
            active.integrity = Some(integrity);
            actions.push(active.route_violation(report));
        }

        actions
    }

    /// The single submit routine. Every trigger lands here.
    fn begin_submission(&mut self, trigger: SubmitTrigger) -> Vec<SessionAction> {
        if self.status != SessionStatus::InProgress {
            return Vec::new();
        }
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        if !self.guard.try_begin() {
            tracing::debug!(trigger = trigger.as_str(), "submission already claimed");
            return Vec::new();
        }

        let request = SubmissionRequest {
            exam_id: self.exam.id.clone(),
            result_id: active.result_id.clone(),
            answers: active.answers.snapshot(),
            trigger,
            attempt: 1,
        };
        active.submission = Some(request.clone());
        self.status = SessionStatus::Submitting;

        tracing::info!(
            exam_id = %self.exam.id,
            trigger = trigger.as_str(),
            answered = request.answers.len(),
            "submission started"
        );

        vec![SessionAction::Notify(Notice::Submitting { trigger }), SessionAction::Submit(request)]
    }

    fn handle_retry(&mut self) -> Vec<SessionAction> {
        if self.status != SessionStatus::Submitting {
            return Vec::new();
        }
        let Some(request) = self.active.as_mut().and_then(|a| a.submission.as_mut()) else {
            return Vec::new();
        };
        if !self.guard.try_retry() {
            return Vec::new();
        }

        request.attempt = request.attempt.saturating_add(1);
        tracing::info!(attempt = request.attempt, "retrying submission");
        vec![SessionAction::Submit(request.clone())]
    }

    fn handle_confirmed(&mut self, receipt: SubmissionReceipt) -> Vec<SessionAction> {
        if self.status != SessionStatus::Submitting || !self.guard.confirm() {
            return Vec::new();
        }
        let trigger = self.submission().map_or(SubmitTrigger::Manual, |s| s.trigger);

        self.status = SessionStatus::Submitted;
        tracing::info!(exam_id = %self.exam.id, trigger = trigger.as_str(), "submission confirmed");

        let mut actions = self.teardown_monitors();
        actions.push(SessionAction::Notify(Notice::Submitted { trigger, receipt: receipt.clone() }));
        if let Some(active) = self.active.as_mut() {
            active.receipt = Some(receipt);
        }
        actions.push(SessionAction::Close(self.summary()));
        actions
    }

    fn handle_failed(&mut self, reason: String) -> Vec<SessionAction> {
        if self.status != SessionStatus::Submitting || !self.guard.fail() {
            return Vec::new();
        }
        tracing::error!(exam_id = %self.exam.id, %reason, "submission failed");
        vec![SessionAction::Notify(Notice::SubmitFailed { reason })]
    }

    fn handle_teardown(&mut self) -> Vec<SessionAction> {
        tracing::info!(exam_id = %self.exam.id, from = %self.status, "session torn down");
        self.status = SessionStatus::Terminated;

        let mut actions = self.teardown_monitors();
        actions.push(SessionAction::Close(self.summary()));
        actions
    }

    /// Release every subscription and device the session holds.
    fn teardown_monitors(&mut self) -> Vec<SessionAction> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        if std::mem::take(&mut active.timer_running) {
            actions.push(SessionAction::StopTimer);
        }
        if std::mem::take(&mut active.signals_attached) {
            actions.push(SessionAction::DetachSignals);
        }
        if let Some(release) = active.camera.as_mut().and_then(CameraMonitor::stop) {
            actions.push(SessionAction::Camera(release));
        }
        // Evidence that never arrived is forwarded without it.
        for report in std::mem::take(&mut active.pending_evidence).into_values() {
            actions.push(SessionAction::ForwardViolation(Box::new(report)));
        }

        actions
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession, SessionError> {
        self.active
            .as_mut()
            .ok_or_else(|| SessionError::InvalidState { reason: "session is not open".to_string() })
    }

    fn integrity(&self) -> Option<&IntegrityMonitor> {
        self.active.as_ref().and_then(|a| a.integrity.as_ref())
    }
}

fn clock(remaining: Duration) -> Notice {
    Notice::Clock { remaining, display: format_remaining(remaining) }
}
