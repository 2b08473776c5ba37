//! Exam Service client errors.

/// Errors from Exam Service calls.
#[derive(Debug, thiserror::Error)]
pub enum ExamServiceError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        /// Endpoint label, e.g. `POST /exams/submit/{resultId}`.
        endpoint: String,
        /// Transport failure.
        source: reqwest::Error,
    },

    /// The service returned a non-2xx status.
    #[error("Exam Service {endpoint} returned {status}: {body}")]
    Api {
        /// Endpoint label.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        /// Endpoint label.
        endpoint: String,
        /// Decoding failure.
        source: reqwest::Error,
    },

    /// The response decoded but does not describe a usable session.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse {
        /// Endpoint label.
        endpoint: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ExamServiceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Deserialization { .. } | Self::InvalidResponse { .. } | Self::Config(_) => false,
        }
    }
}
