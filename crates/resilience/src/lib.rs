//! Resilience wrapper for calls into the analysis service.
//!
//! - [`CircuitBreaker`]: CLOSED → OPEN → HALF_OPEN → CLOSED on consecutive failures
//! - [`RetryState`]: fixed-delay bounded retry of transient errors
//! - [`GuardedAnalysisService`]: both of the above around any [`AnalysisService`]
//!
//! [`AnalysisService`]: autoheal_core_types::AnalysisService

pub mod cbreaker;
pub mod guarded;
pub mod metrics;
pub mod policy;
pub mod retry;

pub use cbreaker::{BreakerPermit, BreakerStats, CircuitBreaker, CircuitState};
pub use guarded::GuardedAnalysisService;
pub use metrics::{ServiceMetrics, ServiceMetricsSnapshot};
pub use policy::{PolicyError, ResilienceConfig};
pub use retry::RetryState;
