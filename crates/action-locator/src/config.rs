//! Engine configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use autoheal_resilience::ResilienceConfig;
use autoheal_selector_cache::{CacheConfig, DEFAULT_TRUST_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::errors::LocatorError;
use crate::request::LocatorOptions;
use crate::types::StrategyKind;

/// How the strategy engine composes recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Declaration order, stop at the first verified success
    #[default]
    Sequential,
    /// Every strategy concurrently, highest confidence wins
    Parallel,
    /// Cheapest first, more expensive strategies only on failure
    CostAwareSequential,
    StructuralOnly,
    VisualOnly,
    /// Visual first, then the remaining strategies in order
    VisualFirst,
}

impl ExecutionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionPolicy::Sequential => "sequential",
            ExecutionPolicy::Parallel => "parallel",
            ExecutionPolicy::CostAwareSequential => "cost_aware_sequential",
            ExecutionPolicy::StructuralOnly => "structural_only",
            ExecutionPolicy::VisualOnly => "visual_only",
            ExecutionPolicy::VisualFirst => "visual_first",
        }
    }

    /// Restricts and orders `available` (given in declaration order).
    pub fn plan(&self, available: &[StrategyKind]) -> Vec<StrategyKind> {
        let mut planned: Vec<StrategyKind> = match self {
            ExecutionPolicy::StructuralOnly => {
                return only(available, StrategyKind::Structural);
            }
            ExecutionPolicy::VisualOnly => return only(available, StrategyKind::Visual),
            _ => available.to_vec(),
        };
        match self {
            ExecutionPolicy::CostAwareSequential => planned.sort_by_key(|kind| kind.cost_rank()),
            ExecutionPolicy::VisualFirst => planned.sort_by_key(|kind| *kind != StrategyKind::Visual),
            _ => {}
        }
        planned
    }
}

fn only(available: &[StrategyKind], kind: StrategyKind) -> Vec<StrategyKind> {
    available.iter().copied().filter(|k| *k == kind).take(1).collect()
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecutionPolicy {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" => Ok(ExecutionPolicy::Sequential),
            "parallel" => Ok(ExecutionPolicy::Parallel),
            "cost_aware_sequential" | "cost_aware" => Ok(ExecutionPolicy::CostAwareSequential),
            "structural_only" | "dom_only" => Ok(ExecutionPolicy::StructuralOnly),
            "visual_only" => Ok(ExecutionPolicy::VisualOnly),
            "visual_first" => Ok(ExecutionPolicy::VisualFirst),
            other => Err(LocatorError::InvalidConfig(format!(
                "unknown execution policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: ExecutionPolicy,
    /// Concurrent resolutions per coordinator
    pub worker_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: ExecutionPolicy::Sequential,
            worker_pool_size: default_pool_size(),
        }
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Success rate a cache entry must strictly exceed to be reused
    pub trust_threshold: f64,
    /// Minimum fingerprint similarity for a cached hit to count
    pub fingerprint_threshold: f64,
    pub verify_fingerprint: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trust_threshold: DEFAULT_TRUST_THRESHOLD,
            fingerprint_threshold: 0.6,
            verify_fingerprint: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub original_probe_ms: u64,
    pub cache_probe_ms: u64,
    pub disambiguation_ms: u64,
    /// Overall deadline used by callers that want blocking-style resolution
    pub element_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            original_probe_ms: 2_000,
            cache_probe_ms: 5_000,
            disambiguation_ms: 5_000,
            element_timeout_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn original_probe(&self) -> Duration {
        Duration::from_millis(self.original_probe_ms)
    }

    pub fn cache_probe(&self) -> Duration {
        Duration::from_millis(self.cache_probe_ms)
    }

    pub fn disambiguation(&self) -> Duration {
        Duration::from_millis(self.disambiguation_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }
}

/// Complete configuration for one coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    pub cache: CacheConfig,
    pub resilience: ResilienceConfig,
    pub engine: EngineConfig,
    pub trust: TrustConfig,
    pub timeouts: TimeoutConfig,
    /// Options applied to requests built by front ends
    pub defaults: LocatorOptions,
}

impl HealConfig {
    pub fn validate(&self) -> Result<(), LocatorError> {
        self.cache.validate()?;
        self.resilience
            .validate()
            .map_err(|err| LocatorError::InvalidConfig(err.to_string()))?;
        self.defaults
            .validate()
            .map_err(|err| LocatorError::InvalidConfig(err.to_string()))?;
        if self.engine.worker_pool_size == 0 {
            return Err(LocatorError::InvalidConfig(
                "worker_pool_size must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("trust_threshold", self.trust.trust_threshold),
            ("fingerprint_threshold", self.trust.fingerprint_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LocatorError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        let t = &self.timeouts;
        if t.original_probe_ms == 0
            || t.cache_probe_ms == 0
            || t.disambiguation_ms == 0
            || t.element_timeout_ms == 0
        {
            return Err(LocatorError::InvalidConfig(
                "timeouts must be positive".into(),
            ));
        }
        // a hung analysis call has to surface as a service timeout, not as a
        // cancelled strategy run, for the breaker to see it
        let call_timeout_ms = self.resilience.call_timeout_ms;
        for (name, bound) in [
            ("defaults.timeout_ms", self.defaults.timeout_ms),
            ("timeouts.disambiguation_ms", t.disambiguation_ms),
        ] {
            if call_timeout_ms >= bound {
                return Err(LocatorError::InvalidConfig(format!(
                    "resilience.call_timeout_ms ({call_timeout_ms}) must be below {name} ({bound})"
                )));
            }
        }
        Ok(())
    }
}
