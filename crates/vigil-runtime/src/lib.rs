//! Vigil Runtime
//!
//! Tokio driver for proctored exam sessions. Wraps the sans-IO state
//! machines from `vigil-core` with the I/O they ask for: the Exam Service
//! over HTTP, the camera, platform integrity signals and the UI.
//!
//! # Flow
//!
//! ```text
//! PreflightRunner ──ReadinessToken──▶ SessionHandle::start ──▶ SessionDriver::run
//! ```
//!
//! The pre-flight runner drives the readiness wizard and releases the
//! identity camera before the token is handed over. The session driver then
//! owns every subscription, timer and stream until the session closes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod platform;
pub mod preflight;
pub mod system_env;
pub mod telemetry;

pub use config::RuntimeConfig;
pub use driver::{SessionDriver, SessionHandle};
pub use error::{BackendError, RuntimeError};
pub use platform::{
    CameraStream, CaptureDevice, CaptureError, ExamBackend, Platform, SessionObserver, SignalSink,
    SignalSource, Subscription, SystemProbe, TracingObserver,
};
pub use preflight::PreflightRunner;
pub use system_env::SystemEnv;
