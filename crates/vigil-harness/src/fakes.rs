//! In-memory platform fakes with failure injection.
//!
//! Each fake records what the driver asked of it so tests can assert on the
//! calls made, not only on the final session state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use vigil_core::{
    CameraFailure, ExamId, ExamSettings, IntegritySignal, Notice, OpenedSession, ResultId,
    SessionSummary, SubmissionReceipt, SubmissionRequest, SubmittedAnswer, ViolationReport,
};
use vigil_runtime::{
    BackendError, CameraStream, CaptureDevice, CaptureError, ExamBackend, SessionObserver,
    SignalSink, SignalSource, Subscription, SystemProbe,
};

/// JPEG start-of-image marker, enough for a fake frame.
pub const FAKE_FRAME: &[u8] = &[0xff, 0xd8, 0xff, 0xe0];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct BackendState {
    starts: usize,
    answers: Vec<(ResultId, SubmittedAnswer)>,
    submissions: Vec<SubmissionRequest>,
    violations: Vec<ViolationReport>,
    failing_submits: u32,
    offline: bool,
}

/// Exam Service fake serving one exam.
#[derive(Debug)]
pub struct FakeBackend {
    exam: ExamSettings,
    session: OpenedSession,
    state: Mutex<BackendState>,
}

impl FakeBackend {
    /// Backend serving `exam` and opening `session` on start.
    pub fn new(exam: ExamSettings, session: OpenedSession) -> Self {
        Self { exam, session, state: Mutex::new(BackendState::default()) }
    }

    /// Fail the next `count` submissions with a 503.
    pub fn fail_next_submits(&self, count: u32) {
        lock(&self.state).failing_submits = count;
    }

    /// Make answer persistence and violation logging unreachable.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    /// Number of attempts opened.
    pub fn starts(&self) -> usize {
        lock(&self.state).starts
    }

    /// Every submission request received, including failed ones.
    pub fn submissions(&self) -> Vec<SubmissionRequest> {
        lock(&self.state).submissions.clone()
    }

    /// Answers persisted, in arrival order.
    pub fn persisted_answers(&self) -> Vec<SubmittedAnswer> {
        lock(&self.state).answers.iter().map(|(_, answer)| answer.clone()).collect()
    }

    /// Violations logged, in arrival order.
    pub fn violations(&self) -> Vec<ViolationReport> {
        lock(&self.state).violations.clone()
    }
}

#[async_trait]
impl ExamBackend for FakeBackend {
    async fn get_exam(&self, exam_id: &ExamId) -> Result<ExamSettings, BackendError> {
        if exam_id == &self.exam.id {
            Ok(self.exam.clone())
        } else {
            Err(BackendError::Rejected { status: 404, reason: "exam not found".to_string() })
        }
    }

    async fn start_exam(&self, exam_id: &ExamId) -> Result<OpenedSession, BackendError> {
        if exam_id != &self.exam.id {
            return Err(BackendError::Rejected { status: 404, reason: "exam not found".to_string() });
        }
        lock(&self.state).starts += 1;
        Ok(self.session.clone())
    }

    async fn record_answer(
        &self,
        result_id: &ResultId,
        answer: &SubmittedAnswer,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if state.offline {
            return Err(BackendError::Unreachable("network down".to_string()));
        }
        state.answers.push((result_id.clone(), answer.clone()));
        Ok(())
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionReceipt, BackendError> {
        let mut state = lock(&self.state);
        state.submissions.push(request.clone());

        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(BackendError::Rejected {
                status: 503,
                reason: "service unavailable".to_string(),
            });
        }

        Ok(SubmissionReceipt {
            result_id: request.result_id.clone(),
            score: None,
            max_score: None,
        })
    }

    async fn log_violation(&self, report: &ViolationReport) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if state.offline {
            return Err(BackendError::Unreachable("network down".to_string()));
        }
        state.violations.push(report.clone());
        Ok(())
    }
}

/// How the fake device answers acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraBehavior {
    /// Streams are granted.
    Working,
    /// The user refuses permission.
    Denied,
    /// The device fails for another reason.
    Unavailable(String),
}

#[derive(Debug)]
struct CameraShared {
    behavior: CameraBehavior,
    acquisitions: usize,
    active: usize,
    captures: usize,
    end_after: Option<usize>,
    hang: bool,
    preview_mirrored: Option<bool>,
}

/// Single-consumer capture device.
///
/// Acquiring while another stream is live fails as "device busy", the way
/// real platforms refuse a second consumer.
#[derive(Debug, Clone)]
pub struct FakeCamera {
    shared: Arc<Mutex<CameraShared>>,
}

impl FakeCamera {
    /// Device with the given behavior.
    pub fn new(behavior: CameraBehavior) -> Self {
        Self {
            shared: Arc::new(Mutex::new(CameraShared {
                behavior,
                acquisitions: 0,
                active: 0,
                captures: 0,
                end_after: None,
                hang: false,
                preview_mirrored: None,
            })),
        }
    }

    /// Working device.
    pub fn working() -> Self {
        Self::new(CameraBehavior::Working)
    }

    /// End the stream once this many frames were captured in total.
    pub fn end_stream_after(&self, captures: usize) {
        lock(&self.shared).end_after = Some(captures);
    }

    /// Captures from now on never complete.
    pub fn hang_captures(&self) {
        lock(&self.shared).hang = true;
    }

    /// Streams currently live.
    pub fn active_streams(&self) -> usize {
        lock(&self.shared).active
    }

    /// Successful acquisitions so far.
    pub fn acquisitions(&self) -> usize {
        lock(&self.shared).acquisitions
    }

    /// Frames requested so far.
    pub fn captures(&self) -> usize {
        lock(&self.shared).captures
    }

    /// Mirroring of the last preview shown.
    pub fn preview_mirrored(&self) -> Option<bool> {
        lock(&self.shared).preview_mirrored
    }
}

#[async_trait]
impl CaptureDevice for FakeCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, CameraFailure> {
        let mut shared = lock(&self.shared);
        match &shared.behavior {
            CameraBehavior::Working => {},
            CameraBehavior::Denied => return Err(CameraFailure::Denied),
            CameraBehavior::Unavailable(reason) => {
                return Err(CameraFailure::Unavailable { reason: reason.clone() });
            },
        }
        if shared.active > 0 {
            return Err(CameraFailure::Unavailable { reason: "device busy".to_string() });
        }

        shared.acquisitions += 1;
        shared.active += 1;
        Ok(Box::new(FakeStream { shared: Arc::clone(&self.shared), stopped: false }))
    }
}

struct FakeStream {
    shared: Arc<Mutex<CameraShared>>,
    stopped: bool,
}

#[async_trait]
impl CameraStream for FakeStream {
    fn show_preview(&mut self, mirrored: bool) {
        lock(&self.shared).preview_mirrored = Some(mirrored);
    }

    async fn capture(&mut self) -> Result<Bytes, CaptureError> {
        let hang = {
            let mut shared = lock(&self.shared);
            shared.captures += 1;
            if shared.end_after.is_some_and(|limit| shared.captures > limit) {
                return Err(CaptureError::StreamEnded("track ended".to_string()));
            }
            shared.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(Bytes::from_static(FAKE_FRAME))
    }

    fn stop(&mut self) {
        if !std::mem::replace(&mut self.stopped, true) {
            let mut shared = lock(&self.shared);
            shared.active = shared.active.saturating_sub(1);
        }
    }
}

#[derive(Debug, Default)]
struct SignalsShared {
    sink: Option<SignalSink>,
    subscriptions: usize,
    removals: usize,
}

/// Signal source the test fires by hand.
#[derive(Debug, Clone, Default)]
pub struct FakeSignals {
    shared: Arc<Mutex<SignalsShared>>,
}

impl FakeSignals {
    /// New source with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a signal. `None` when nothing is listening, otherwise whether
    /// the browser action was prevented.
    pub fn fire(&self, signal: IntegritySignal) -> Option<bool> {
        let sink = lock(&self.shared).sink.clone()?;
        Some(sink.emit(signal))
    }

    /// Whether listeners are attached.
    pub fn is_attached(&self) -> bool {
        lock(&self.shared).sink.is_some()
    }

    /// Times listeners were attached.
    pub fn subscriptions(&self) -> usize {
        lock(&self.shared).subscriptions
    }

    /// Times listeners were removed.
    pub fn removals(&self) -> usize {
        lock(&self.shared).removals
    }
}

impl SignalSource for FakeSignals {
    fn subscribe(&self, sink: SignalSink) -> Subscription {
        let subscription = {
            let shared = Arc::clone(&self.shared);
            Subscription::new(&sink, move || {
                let mut shared = lock(&shared);
                shared.sink = None;
                shared.removals += 1;
            })
        };

        let mut shared = lock(&self.shared);
        shared.sink = Some(sink);
        shared.subscriptions += 1;
        subscription
    }
}

/// Configurable system probe.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    /// Reported user agent.
    pub user_agent: String,
    /// Fullscreen probe result.
    pub fullscreen: bool,
    /// Notification probe result.
    pub notifications: bool,
}

impl FakeProbe {
    /// Desktop Chrome with every capability available.
    pub fn chrome() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/126.0 Safari/537.36"
                .to_string(),
            fullscreen: true,
            notifications: true,
        }
    }
}

#[async_trait]
impl SystemProbe for FakeProbe {
    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    async fn fullscreen_available(&self) -> bool {
        self.fullscreen
    }

    async fn notifications_permitted(&self) -> bool {
        self.notifications
    }
}

/// Observer recording everything shown to the student.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    notices: Mutex<Vec<Notice>>,
    closed: Mutex<Vec<SessionSummary>>,
}

impl RecordingObserver {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices in order, clock updates excluded.
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices)
            .iter()
            .filter(|notice| !matches!(notice, Notice::Clock { .. }))
            .cloned()
            .collect()
    }

    /// Number of clock updates.
    pub fn clock_updates(&self) -> usize {
        lock(&self.notices).iter().filter(|notice| matches!(notice, Notice::Clock { .. })).count()
    }

    /// Whether any notice matches.
    pub fn saw(&self, predicate: impl Fn(&Notice) -> bool) -> bool {
        lock(&self.notices).iter().any(predicate)
    }

    /// Every close reported. More than one is a bug.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        lock(&self.closed).clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn notify(&self, notice: &Notice) {
        lock(&self.notices).push(notice.clone());
    }

    fn closed(&self, summary: &SessionSummary) {
        lock(&self.closed).push(summary.clone());
    }
}
