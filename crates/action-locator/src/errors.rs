//! Error types for the resolution pipeline

use std::fmt;
use std::time::Duration;

use autoheal_core_types::{DriverError, ServiceError};
use autoheal_selector_cache::CacheError;
use serde::Serialize;
use thiserror::Error;

/// Why one recovery strategy did not produce a verified element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: String,
    pub tried_selectors: Vec<String>,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

/// Locator error enumeration
///
/// Only `ElementNotFound` leaves a completed pipeline. The other variants are
/// produced by individual steps, absorbed by the coordinator and counted, or
/// reach the caller because the caller asked for them (`Cancelled`, and
/// `Timeout` from an overall deadline).
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Every avenue was exhausted
    #[error(
        "element not found for '{selector}' ({description}); strategies attempted: [{}]; selectors tried: [{}]",
        attempted_strategies.join(", "),
        tried_selectors.join(", ")
    )]
    ElementNotFound {
        selector: String,
        description: String,
        attempted_strategies: Vec<String>,
        tried_selectors: Vec<String>,
    },

    /// A bounded sub-operation exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Cache backend failure, treated as a miss
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The analysis service breaker is open
    #[error("analysis service circuit open; retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// Ranking several matches failed; the first match is used
    #[error("disambiguation inconclusive: {0}")]
    DisambiguationInconclusive(String),

    /// A single strategy failed
    #[error("strategy '{strategy}' failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    /// Every strategy the policy allowed failed
    #[error("all strategies failed: [{}]", failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    StrategiesExhausted { failures: Vec<StrategyFailure> },

    /// Nothing to choose from
    #[error("no candidate elements to choose from")]
    NoCandidates,

    /// Automation driver failure
    #[error("driver error: {0}")]
    Driver(String),

    /// Malformed request or options
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller cancelled the resolution
    #[error("resolution cancelled")]
    Cancelled,

    /// The coordinator no longer accepts work
    #[error("coordinator is shut down")]
    ShutDown,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    pub fn strategy_failed(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StrategyFailed {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::Timeout { .. }
                | LocatorError::CacheUnavailable(_)
                | LocatorError::CircuitOpen { .. }
                | LocatorError::Driver(_)
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Internal(_) | LocatorError::InvalidConfig(_) => 3,
            LocatorError::ElementNotFound { .. }
            | LocatorError::Driver(_)
            | LocatorError::ShutDown => 2,
            LocatorError::Timeout { .. }
            | LocatorError::CircuitOpen { .. }
            | LocatorError::CacheUnavailable(_)
            | LocatorError::StrategyFailed { .. }
            | LocatorError::StrategiesExhausted { .. }
            | LocatorError::InvalidRequest(_) => 1,
            _ => 0,
        }
    }

    /// Short stable code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            LocatorError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            LocatorError::Timeout { .. } => "TIMEOUT_EXCEEDED",
            LocatorError::CacheUnavailable(_) => "CACHE_ERROR",
            LocatorError::CircuitOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            LocatorError::DisambiguationInconclusive(_) => "DISAMBIGUATION_INCONCLUSIVE",
            LocatorError::StrategyFailed { .. } | LocatorError::StrategiesExhausted { .. } => {
                "AI_SERVICE_UNAVAILABLE"
            }
            LocatorError::NoCandidates => "ELEMENT_NOT_FOUND",
            LocatorError::Driver(_) => "ADAPTER_ERROR",
            LocatorError::InvalidRequest(_) => "INVALID_LOCATOR",
            LocatorError::InvalidConfig(_) => "CONFIGURATION_INVALID",
            LocatorError::Cancelled => "CANCELLED",
            LocatorError::ShutDown => "SHUT_DOWN",
            LocatorError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<DriverError> for LocatorError {
    fn from(value: DriverError) -> Self {
        LocatorError::Driver(value.to_string())
    }
}

impl From<ServiceError> for LocatorError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::CircuitOpen { retry_after, .. } => LocatorError::CircuitOpen { retry_after },
            ServiceError::Timeout(after) => LocatorError::timeout("analysis call", after),
            other => LocatorError::strategy_failed("analysis-service", other.to_string()),
        }
    }
}

impl From<CacheError> for LocatorError {
    fn from(value: CacheError) -> Self {
        match value {
            CacheError::InvalidConfig(msg) => LocatorError::InvalidConfig(msg),
            other => LocatorError::CacheUnavailable(other.to_string()),
        }
    }
}
