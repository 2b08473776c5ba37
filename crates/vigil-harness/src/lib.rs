//! Deterministic simulation harness for Vigil session testing.
//!
//! A virtual-clock [`Environment`](vigil_core::Environment), in-memory
//! platform fakes with failure injection, and scenario builders that take a
//! session through pre-flight without a browser.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and a [`RealSession`],
//! and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fakes;
pub mod model;
pub mod real;
pub mod scenario;
pub mod sim_env;

pub use fakes::{
    CameraBehavior, FakeBackend, FakeCamera, FakeProbe, FakeSignals, RecordingObserver,
};
pub use model::{
    ModelSession, ModelSignal, ModelSubmission, ObservableState, Operation, OperationError,
    OperationResult,
};
pub use real::RealSession;
pub use scenario::FakePlatform;
pub use sim_env::SimEnv;
