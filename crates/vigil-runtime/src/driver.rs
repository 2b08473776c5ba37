//! Session driver.
//!
//! Runs a [`SessionController`] on tokio. User commands through
//! [`SessionHandle`], timer ticks, camera completions and network completions
//! are messages on one bounded queue. Integrity signals have an unbounded
//! queue of their own so none is lost while the session is busy. The driver
//! loop is the single consumer of both: it feeds each message to the
//! controller and executes the returned actions.
//!
//! ```text
//! SessionHandle ──┐
//! ticker tasks ───┤
//! camera tasks ───┼──▶ mpsc queue ──┐
//! HTTP tasks ─────┘                 ├──▶ SessionController::handle ──▶ actions
//! SignalSink ─────▶ signal queue ───┘
//! ```
//!
//! Only [`SessionHandle`]s keep the command queue open. Background tasks hold
//! weak senders, so dropping the last handle tears the session down.
//!
//! Nothing the loop awaits is slow: network calls run on spawned tasks
//! (answers and violations fire-and-forget, submissions report back as
//! events), and the exam camera stream is owned by its own task, so a stuck
//! frame never holds up a command.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use vigil_core::{
    CameraCommand, CameraEvent, CameraFailure, Environment, ExamSettings, IntegritySignal,
    Navigation, OptionId, QuestionId, ReadinessToken, SessionAction, SessionController,
    SessionError, SessionEvent, SessionStatus, SessionSummary, Snapshot, SnapshotPurpose,
};

use crate::{
    config::RuntimeConfig,
    error::RuntimeError,
    platform::{CaptureError, ExamBackend, HeldStream, Platform, SignalSink, Subscription},
};

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// One queued input.
pub(crate) struct Envelope {
    pub(crate) event: SessionEvent,
    reply: Option<Reply>,
}

impl Envelope {
    pub(crate) fn event(event: SessionEvent) -> Self {
        Self { event, reply: None }
    }
}

/// Caller-side handle to a running session.
///
/// Cheap to clone. The session is torn down once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    queue: mpsc::Sender<Envelope>,
    exam: Arc<ExamSettings>,
    backend: Arc<dyn ExamBackend>,
    starting: Arc<AtomicBool>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("exam_id", &self.exam.id)
            .field("closed", &self.queue.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Open the attempt on the server and start the session.
    ///
    /// The token is checked first, so a token the session would refuse never
    /// opens an attempt on the server. Only one start may reach the server;
    /// a failed call can be retried.
    pub async fn start(&self, token: ReadinessToken) -> Result<(), RuntimeError> {
        token.admits(&self.exam)?;
        if self.starting.swap(true, Ordering::AcqRel) {
            return Err(SessionError::InvalidState {
                reason: "session was already started".to_string(),
            }
            .into());
        }

        let session = match self.backend.start_exam(&self.exam.id).await {
            Ok(session) => session,
            Err(e) => {
                self.starting.store(false, Ordering::Release);
                return Err(e.into());
            },
        };
        self.request(SessionEvent::Open { token, session }).await
    }

    /// Record an answer.
    pub async fn answer(
        &self,
        question_id: impl Into<QuestionId>,
        option_id: impl Into<OptionId>,
    ) -> Result<(), RuntimeError> {
        self.request(SessionEvent::Answer {
            question_id: question_id.into(),
            option_id: option_id.into(),
        })
        .await
    }

    /// Move the question cursor.
    pub async fn navigate(&self, navigation: Navigation) -> Result<(), RuntimeError> {
        self.request(SessionEvent::Navigate(navigation)).await
    }

    /// Flag or unflag a question for review.
    pub async fn toggle_flag(&self, question_id: impl Into<QuestionId>) -> Result<(), RuntimeError> {
        self.request(SessionEvent::ToggleFlag { question_id: question_id.into() }).await
    }

    /// Student pressed submit.
    pub async fn submit(&self) -> Result<(), RuntimeError> {
        self.request(SessionEvent::SubmitRequested).await
    }

    /// Re-send the failed submission.
    pub async fn retry_submit(&self) -> Result<(), RuntimeError> {
        self.request(SessionEvent::RetrySubmit).await
    }

    /// Leave the exam without submitting.
    pub async fn teardown(&self) -> Result<(), RuntimeError> {
        self.request(SessionEvent::Teardown).await
    }

    /// Whether the driver has exited.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    async fn request(&self, event: SessionEvent) -> Result<(), RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.queue
            .send(Envelope { event, reply: Some(reply) })
            .await
            .map_err(|_| RuntimeError::DriverStopped)?;

        response.await.map_err(|_| RuntimeError::DriverStopped)?.map_err(RuntimeError::from)
    }
}

/// Owns the controller and every live resource of one session.
pub struct SessionDriver<E: Environment> {
    env: E,
    controller: SessionController<E>,
    platform: Platform,
    queue: mpsc::Receiver<Envelope>,
    loopback: mpsc::WeakSender<Envelope>,
    signals: mpsc::UnboundedReceiver<IntegritySignal>,
    signal_sender: mpsc::UnboundedSender<IntegritySignal>,
    camera: Arc<Mutex<Option<StreamTask>>>,
    timer: Option<CancellationToken>,
    snapshots: Option<CancellationToken>,
    subscription: Option<Subscription>,
    closed: Option<SessionSummary>,
}

impl<E: Environment> std::fmt::Debug for SessionDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("exam_id", &self.controller.exam().id)
            .field("status", &self.controller.status())
            .finish_non_exhaustive()
    }
}

impl<E: Environment> SessionDriver<E> {
    /// Create a driver and its first handle.
    ///
    /// Nothing runs until [`SessionDriver::run`] is polled.
    pub fn new(
        env: E,
        exam: ExamSettings,
        config: &RuntimeConfig,
        platform: Platform,
    ) -> (Self, SessionHandle) {
        let (sender, queue) = mpsc::channel(config.queue_capacity.max(1));
        let (signal_sender, signals) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            queue: sender.clone(),
            exam: Arc::new(exam.clone()),
            backend: Arc::clone(&platform.backend),
            starting: Arc::new(AtomicBool::new(false)),
        };

        let driver = Self {
            controller: SessionController::new(env.clone(), exam, config.policy.clone()),
            env,
            platform,
            queue,
            loopback: sender.downgrade(),
            signals,
            signal_sender,
            camera: Arc::new(Mutex::new(None)),
            timer: None,
            snapshots: None,
            subscription: None,
            closed: None,
        };
        (driver, handle)
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.controller.status()
    }

    /// Process events until the session closes.
    ///
    /// Returns the closing summary. If every handle is dropped first the
    /// session is torn down and the summary reports `terminated`.
    pub async fn run(mut self) -> SessionSummary {
        while self.closed.is_none() {
            let next = tokio::select! {
                biased;
                Some(signal) = self.signals.recv() => {
                    Some(Envelope::event(SessionEvent::Signal(signal)))
                },
                envelope = self.queue.recv() => envelope,
            };
            let Some(Envelope { event, reply }) = next else {
                tracing::info!(exam_id = %self.controller.exam().id, "all handles dropped");
                // Terminal sessions ignore this; the loop ends either way.
                let _ = self.dispatch(SessionEvent::Teardown);
                break;
            };

            let result = self.dispatch(event);
            if let Some(reply) = reply {
                // The caller may have stopped waiting.
                let _ = reply.send(result);
            }
        }

        self.shutdown();
        self.closed.take().unwrap_or_else(|| self.controller.summary())
    }

    fn dispatch(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let actions = self.controller.handle(event).inspect_err(|e| {
            tracing::debug!(error = %e, status = %self.controller.status(), "event rejected");
        })?;

        for action in actions {
            self.execute(action);
        }
        Ok(())
    }

    fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::StartTimer { every } => {
                cancel(&mut self.timer);
                self.timer = Some(self.spawn_ticker(every, || SessionEvent::Tick));
            },
            SessionAction::StopTimer => cancel(&mut self.timer),
            SessionAction::AttachSignals => {
                let sink = SignalSink::new(self.signal_sender.clone());
                self.subscription = Some(self.platform.signals.subscribe(sink));
                tracing::debug!("integrity signals attached");
            },
            SessionAction::DetachSignals => {
                if self.subscription.take().is_some() {
                    tracing::debug!("integrity signals detached");
                }
            },
            SessionAction::Camera(command) => self.execute_camera(command),
            SessionAction::PersistAnswer { result_id, answer } => {
                let backend = Arc::clone(&self.platform.backend);
                tokio::spawn(async move {
                    // Dropped on failure: the next change to any answer
                    // writes again and the final submit carries them all.
                    if let Err(e) = backend.record_answer(&result_id, &answer).await {
                        tracing::warn!(
                            question_id = %answer.question_id,
                            error = %e,
                            "answer persistence failed"
                        );
                    }
                });
            },
            SessionAction::ForwardViolation(report) => {
                let backend = Arc::clone(&self.platform.backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.log_violation(&report).await {
                        tracing::warn!(
                            kind = report.event.kind.as_str(),
                            sequence = report.sequence,
                            error = %e,
                            "violation forwarding failed"
                        );
                    }
                });
            },
            SessionAction::Submit(request) => {
                let backend = Arc::clone(&self.platform.backend);
                let queue = self.loopback.clone();
                tokio::spawn(async move {
                    let event = match backend.submit(&request).await {
                        Ok(receipt) => SessionEvent::SubmitConfirmed { receipt },
                        Err(e) => SessionEvent::SubmitFailed { reason: e.to_string() },
                    };
                    if !deliver(&queue, event).await {
                        tracing::warn!(
                            result_id = %request.result_id,
                            "submission outcome arrived after the session closed"
                        );
                    }
                });
            },
            SessionAction::Notify(notice) => self.platform.observer.notify(&notice),
            SessionAction::Close(summary) => {
                self.platform.observer.closed(&summary);
                self.closed = Some(summary);
            },
        }
    }

    fn execute_camera(&mut self, command: CameraCommand) {
        match command {
            CameraCommand::Acquire => {
                let device = Arc::clone(&self.platform.camera);
                let slot = Arc::clone(&self.camera);
                let queue = self.loopback.clone();
                tokio::spawn(async move {
                    let event = match device.acquire().await {
                        Ok(stream) => {
                            *lock(&slot) = Some(StreamTask::spawn(HeldStream(stream)));
                            CameraEvent::Acquired
                        },
                        Err(failure) => CameraEvent::Failed(failure),
                    };
                    // If the session is gone the slot drops with this task
                    // and the stream is stopped.
                    deliver(&queue, SessionEvent::Camera(event)).await;
                });
            },
            CameraCommand::ShowPreview { mirrored } => {
                if let Some(stream) = lock(&self.camera).as_ref() {
                    stream.show_preview(mirrored);
                }
            },
            CameraCommand::StartSchedule { every } => {
                cancel(&mut self.snapshots);
                self.snapshots = Some(
                    self.spawn_ticker(every, || SessionEvent::Camera(CameraEvent::SnapshotDue)),
                );
            },
            CameraCommand::Capture(purpose) => self.spawn_capture(purpose),
            CameraCommand::Release => {
                cancel(&mut self.snapshots);
                // Dropping the task handle stops the stream's tracks.
                lock(&self.camera).take();
            },
        }
    }

    fn spawn_capture(&self, purpose: SnapshotPurpose) {
        let requests = lock(&self.camera).as_ref().map(StreamTask::requests);
        let queue = self.loopback.clone();
        let env = self.env.clone();

        tokio::spawn(async move {
            let outcome = match requests {
                Some(requests) => capture(&requests).await,
                None => Err(released()),
            };

            let events = match outcome {
                Ok(image) => vec![CameraEvent::SnapshotCaptured {
                    snapshot: Snapshot { image, captured_at: env.wall_clock() },
                    purpose,
                }],
                Err(CaptureError::StreamEnded(reason)) => vec![
                    CameraEvent::SnapshotFailed { purpose, reason: reason.clone() },
                    CameraEvent::Failed(CameraFailure::Unavailable { reason }),
                ],
                Err(CaptureError::Frame(reason)) => {
                    vec![CameraEvent::SnapshotFailed { purpose, reason }]
                },
            };

            for event in events {
                if !deliver(&queue, SessionEvent::Camera(event)).await {
                    break;
                }
            }
        });
    }

    fn spawn_ticker(&self, every: Duration, event: fn() -> SessionEvent) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let queue = self.loopback.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !deliver(&queue, event()).await {
                            break;
                        }
                    }
                    () = cancelled.cancelled() => break,
                }
            }
        });

        token
    }

    /// Release whatever is still held, whatever path ended the loop.
    fn shutdown(&mut self) {
        cancel(&mut self.timer);
        cancel(&mut self.snapshots);
        self.subscription.take();
        lock(&self.camera).take();
    }
}

/// Requests served by the task that owns the exam camera stream.
enum StreamRequest {
    Preview { mirrored: bool },
    Capture(oneshot::Sender<Result<Bytes, CaptureError>>),
}

/// Handle to the task that owns an acquired stream.
///
/// The task serves one request at a time. Dropping the handle stops the
/// stream, abandoning a capture still in flight.
struct StreamTask {
    requests: mpsc::UnboundedSender<StreamRequest>,
    stop: CancellationToken,
}

impl StreamTask {
    fn spawn(mut stream: HeldStream) -> Self {
        let (requests, mut inbox) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    request = inbox.recv() => request,
                    () = stopped.cancelled() => None,
                };
                match request {
                    Some(StreamRequest::Preview { mirrored }) => stream.0.show_preview(mirrored),
                    Some(StreamRequest::Capture(reply)) => tokio::select! {
                        frame = stream.0.capture() => {
                            // The requester may have given up.
                            let _ = reply.send(frame);
                        }
                        () = stopped.cancelled() => break,
                    },
                    None => break,
                }
            }
            // `stream` drops here and stops its tracks.
        });

        Self { requests, stop }
    }

    fn requests(&self) -> mpsc::UnboundedSender<StreamRequest> {
        self.requests.clone()
    }

    fn show_preview(&self, mirrored: bool) {
        // A send error means the task already stopped the stream.
        let _ = self.requests.send(StreamRequest::Preview { mirrored });
    }
}

impl Drop for StreamTask {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn capture(requests: &mpsc::UnboundedSender<StreamRequest>) -> Result<Bytes, CaptureError> {
    let (reply, frame) = oneshot::channel();
    requests.send(StreamRequest::Capture(reply)).map_err(|_| released())?;
    frame.await.map_err(|_| released())?
}

fn released() -> CaptureError {
    CaptureError::Frame("camera released".to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cancel(token: &mut Option<CancellationToken>) {
    if let Some(token) = token.take() {
        token.cancel();
    }
}

/// Queue an event for the driver. False once the session is gone.
async fn deliver(queue: &mpsc::WeakSender<Envelope>, event: SessionEvent) -> bool {
    match queue.upgrade() {
        Some(queue) => queue.send(Envelope::event(event)).await.is_ok(),
        None => false,
    }
}
