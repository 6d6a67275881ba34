//! Errors reported by the collaborator ports.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by an automation driver.
///
/// "No match" is not an error: `find_elements` returns an empty list.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("page unavailable: {0}")]
    PageUnavailable(String),

    #[error("stale element: {0}")]
    StaleElement(String),

    #[error("driver error: {0}")]
    Other(String),
}

impl DriverError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Failure reported by (or on behalf of) the analysis service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("analysis service unavailable: {0}")]
    Unavailable(String),

    #[error("analysis service timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis service rate limited: {0}")]
    RateLimited(String),

    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),

    #[error("circuit open for analysis service '{service}' (retry after {retry_after:?})")]
    CircuitOpen {
        service: String,
        retry_after: Duration,
    },
}

impl ServiceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable(_) | ServiceError::Timeout(_) | ServiceError::RateLimited(_)
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ServiceError::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::unavailable("503").is_retryable());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!ServiceError::invalid("not json").is_retryable());
        let open = ServiceError::CircuitOpen {
            service: "mock".into(),
            retry_after: Duration::from_secs(30),
        };
        assert!(!open.is_retryable());
        assert!(open.is_circuit_open());
    }
}
