use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid resilience policy: {0}")]
pub struct PolicyError(pub String);

/// Breaker and retry settings for one analysis-service endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before letting one probe through.
    pub cool_down_ms: u64,
    /// Total attempts per allowed call, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay_ms: u64,
    /// Upper bound for a single attempt. Keep it below the caller's own
    /// deadlines so a hung service is reported as a timeout.
    pub call_timeout_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down_ms: 5 * 60 * 1000,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            call_timeout_ms: 4_000,
        }
    }
}

impl ResilienceConfig {
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.failure_threshold == 0 {
            return Err(PolicyError("failure_threshold must be > 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(PolicyError("max_attempts must be > 0".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(PolicyError("call_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}
