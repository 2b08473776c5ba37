//! Exam Service client configuration.
//!
//! One base URL serves both the exam endpoints and the proctoring log.
//! Override via environment variables or explicit construction for
//! staging/testing.

use url::Url;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the Exam Service.
///
/// Custom `Debug` implementation redacts the `api_token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct ExamServiceConfig {
    /// API root, e.g. `https://exams.example.edu/api`.
    pub base_url: Url,
    /// Bearer token of the signed-in student.
    pub api_token: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ExamServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamServiceConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ExamServiceConfig {
    /// Create a configuration with the default timeout.
    pub fn new(base_url: Url, api_token: impl Into<String>) -> Self {
        Self { base_url, api_token: api_token.into(), timeout_secs: DEFAULT_TIMEOUT_SECS }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `VIGIL_API_URL` (default: `http://127.0.0.1:5000/api`)
    /// - `VIGIL_API_TOKEN` (required)
    /// - `VIGIL_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = std::env::var("VIGIL_API_TOKEN").map_err(|_| ConfigError::MissingToken)?;

        Ok(Self {
            base_url: env_url("VIGIL_API_URL", "http://127.0.0.1:5000/api")?,
            api_token,
            timeout_secs: std::env::var("VIGIL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Create a configuration pointing at a local mock server (for testing).
    pub fn local_mock(uri: &str, token: &str) -> Result<Self, ConfigError> {
        let base_url =
            Url::parse(uri).map_err(|e| ConfigError::InvalidUrl(uri.to_string(), e.to_string()))?;
        Ok(Self { base_url, api_token: token.to_string(), timeout_secs: 5 })
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No token in the environment.
    #[error("VIGIL_API_TOKEN environment variable is required")]
    MissingToken,
    /// Token contains characters not allowed in a header.
    #[error("API token is not a valid header value")]
    InvalidToken,
    /// A URL did not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn local_mock_builds_valid_config() {
        let cfg = ExamServiceConfig::local_mock("http://127.0.0.1:9000", "test-token").unwrap();
        assert_eq!(cfg.api_token, "test-token");
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(cfg.base_url.as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = ExamServiceConfig::local_mock("http://127.0.0.1:9000", "s3cret").unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn env_url_uses_default_when_var_absent() {
        let url = env_url("VIGIL_NONEXISTENT_VAR_12345", "https://example.com/api").unwrap();
        assert_eq!(url.as_str(), "https://example.com/api");
    }

    #[test]
    fn local_mock_rejects_invalid_url() {
        assert!(matches!(
            ExamServiceConfig::local_mock("not a url", "t"),
            Err(ConfigError::InvalidUrl(..))
        ));
    }
}
