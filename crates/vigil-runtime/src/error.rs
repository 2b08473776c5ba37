//! Runtime error types.

use vigil_client::ExamServiceError;
use vigil_core::{GateError, SessionError};

use crate::platform::CaptureError;

/// Failure talking to the exam backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP client reported an error.
    #[error(transparent)]
    Service(#[from] ExamServiceError),

    /// The backend could not be reached at all.
    #[error("exam service unreachable: {0}")]
    Unreachable(String),

    /// The backend answered and refused the request.
    #[error("exam service rejected the request with {status}: {reason}")]
    Rejected {
        /// HTTP status or equivalent.
        status: u16,
        /// Server-provided reason.
        reason: String,
    },
}

impl BackendError {
    /// Whether repeating the request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Service(err) => err.is_transient(),
            Self::Unreachable(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Errors surfaced by the session driver and the pre-flight runner.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The session controller rejected an event.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The pre-flight gate rejected a step.
    #[error("pre-flight error: {0}")]
    Gate(#[from] GateError),

    /// A backend call failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The driver task has exited; the session is closed.
    #[error("session driver has stopped")]
    DriverStopped,

    /// Identity capture was requested with no camera stream held.
    #[error("no camera stream is held")]
    NoCamera,

    /// The camera could not produce a frame.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    /// Returns true if the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Session(err) => err.is_fatal(),
            Self::DriverStopped | Self::Config(_) => true,
            Self::Gate(_) | Self::Backend(_) | Self::NoCamera | Self::Capture(_) => false,
        }
    }
}
