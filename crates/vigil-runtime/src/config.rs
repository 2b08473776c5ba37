//! Runtime configuration.

use vigil_core::{GateConfig, SessionPolicy};

use crate::error::RuntimeError;

/// Default capacity of the session event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Configuration for a session driver and its pre-flight runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Session cadences, thresholds and defaults.
    pub policy: SessionPolicy,
    /// Pre-flight check set and browser allow-list.
    pub gate: GateConfig,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Bound on queued commands and completions. Integrity signals have
    /// their own unbounded queue.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            gate: GateConfig::default(),
            log_level: "info".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `VIGIL_LOG_LEVEL` and `VIGIL_QUEUE_CAPACITY`.
    pub fn from_env() -> Result<Self, RuntimeError> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(raw) = std::env::var("VIGIL_QUEUE_CAPACITY") {
            config.queue_capacity = raw.parse().map_err(|_| {
                RuntimeError::Config(format!("VIGIL_QUEUE_CAPACITY is not a number: {raw}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.queue_capacity == 0 {
            return Err(RuntimeError::Config("queue capacity must be positive".to_string()));
        }
        if self.policy.tick.is_zero() || self.policy.snapshot_interval.is_zero() {
            return Err(RuntimeError::Config("timer cadences must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy.tick, Duration::from_secs(1));
        assert_eq!(config.policy.snapshot_interval, Duration::from_secs(30));
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = RuntimeConfig { queue_capacity: 0, ..RuntimeConfig::default() };
        assert!(matches!(config.validate(), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn zero_tick_rejected() {
        let mut config = RuntimeConfig::default();
        config.policy.tick = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
