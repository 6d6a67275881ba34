//! Resolution counters and health reporting

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use autoheal_core_types::ResolutionStrategyTag;
use autoheal_resilience::CircuitState;
use serde::{Deserialize, Serialize};

/// Lock-free counters owned by one coordinator
#[derive(Debug, Default)]
pub struct LocatorMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    not_found: AtomicU64,
    cancelled: AtomicU64,
    deadline_exceeded: AtomicU64,

    original_hits: AtomicU64,
    cache_hits: AtomicU64,
    structural_hits: AtomicU64,
    visual_hits: AtomicU64,
    hybrid_hits: AtomicU64,

    timeouts: AtomicU64,
    cache_unavailable: AtomicU64,
    circuit_open_skips: AtomicU64,
    inconclusive_disambiguations: AtomicU64,
    strategy_failures: AtomicU64,
    fingerprint_mismatches: AtomicU64,
    untrusted_cache_skips: AtomicU64,

    structural_runs: AtomicU64,
    visual_runs: AtomicU64,
    cost_micros: AtomicU64,

    latency_ns: AtomicU64,
}

impl LocatorMetrics {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, strategy: ResolutionStrategyTag, elapsed: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        let counter = match strategy {
            ResolutionStrategyTag::OriginalSelector => &self.original_hits,
            ResolutionStrategyTag::Cached => &self.cache_hits,
            ResolutionStrategyTag::StructuralAnalysis => &self.structural_hits,
            ResolutionStrategyTag::VisualAnalysis => &self.visual_hits,
            ResolutionStrategyTag::Hybrid => &self.hybrid_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_not_found(&self, elapsed: Duration) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadline_exceeded(&self) {
        self.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_unavailable(&self) {
        self.cache_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_open_skip(&self) {
        self.circuit_open_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inconclusive_disambiguation(&self) {
        self.inconclusive_disambiguations
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_strategy_failure(&self) {
        self.strategy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fingerprint_mismatch(&self) {
        self.fingerprint_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_untrusted_cache_skip(&self) {
        self.untrusted_cache_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// One analysis-backed strategy run and its estimated spend
    pub fn record_strategy_run(&self, kind: crate::types::StrategyKind) {
        let counter = match kind {
            crate::types::StrategyKind::Structural => &self.structural_runs,
            crate::types::StrategyKind::Visual => &self.visual_runs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.cost_micros
            .fetch_add(kind.estimated_cost_micros(), Ordering::Relaxed);
    }

    fn record_latency(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LocatorMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let requests = load(&self.requests);
        let successes = load(&self.successes);
        let not_found = load(&self.not_found);
        let completed = successes + not_found;
        let original = load(&self.original_hits);
        let cached = load(&self.cache_hits);
        let structural = load(&self.structural_hits);
        let visual = load(&self.visual_hits);
        let hybrid = load(&self.hybrid_hits);
        let healed = structural + visual + hybrid;

        LocatorMetricsSnapshot {
            requests,
            successes,
            not_found,
            cancelled: load(&self.cancelled),
            deadline_exceeded: load(&self.deadline_exceeded),
            success_rate: ratio(successes, completed, 1.0),
            cache_hit_rate: ratio(cached, cached + healed, 0.0),
            original_hits: original,
            cache_hits: cached,
            structural_hits: structural,
            visual_hits: visual,
            hybrid_hits: hybrid,
            timeouts: load(&self.timeouts),
            cache_unavailable: load(&self.cache_unavailable),
            circuit_open_skips: load(&self.circuit_open_skips),
            inconclusive_disambiguations: load(&self.inconclusive_disambiguations),
            strategy_failures: load(&self.strategy_failures),
            fingerprint_mismatches: load(&self.fingerprint_mismatches),
            untrusted_cache_skips: load(&self.untrusted_cache_skips),
            structural_runs: load(&self.structural_runs),
            visual_runs: load(&self.visual_runs),
            estimated_cost: load(&self.cost_micros) as f64 / 1_000_000.0,
            avg_latency_ms: if completed == 0 {
                0.0
            } else {
                load(&self.latency_ns) as f64 / completed as f64 / 1_000_000.0
            },
        }
    }
}

fn ratio(numerator: u64, denominator: u64, empty: f64) -> f64 {
    if denominator == 0 {
        empty
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocatorMetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub not_found: u64,
    pub cancelled: u64,
    pub deadline_exceeded: u64,
    /// Successes over completed resolutions; 1.0 before any completes
    pub success_rate: f64,
    /// Cached results over cached plus healed results
    pub cache_hit_rate: f64,
    pub original_hits: u64,
    pub cache_hits: u64,
    pub structural_hits: u64,
    pub visual_hits: u64,
    pub hybrid_hits: u64,
    pub timeouts: u64,
    pub cache_unavailable: u64,
    pub circuit_open_skips: u64,
    pub inconclusive_disambiguations: u64,
    pub strategy_failures: u64,
    pub fingerprint_mismatches: u64,
    pub untrusted_cache_skips: u64,
    pub structural_runs: u64,
    pub visual_runs: u64,
    /// Estimated analysis spend in dollars
    pub estimated_cost: f64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthSeverity {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthAlert {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub overall: bool,
    pub severity: HealthSeverity,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub ai_service_healthy: bool,
    pub circuit_state: CircuitState,
    pub avg_latency_ms: f64,
    pub alerts: Vec<HealthAlert>,
}

impl HealthStatus {
    const MIN_SUCCESS_RATE: f64 = 0.8;
    const GOOD_SUCCESS_RATE: f64 = 0.9;
    const MIN_CACHE_HIT_RATE: f64 = 0.5;
    const MAX_AVG_LATENCY_MS: f64 = 5_000.0;

    /// Derives severity and alerts from a metrics snapshot.
    ///
    /// The cache hit rate only counts against health once something has been
    /// served from cache or healed.
    pub fn evaluate(
        metrics: &LocatorMetricsSnapshot,
        ai_service_healthy: bool,
        circuit_state: CircuitState,
    ) -> Self {
        let overall = metrics.success_rate > Self::MIN_SUCCESS_RATE;
        let cache_sampled = metrics.cache_hits
            + metrics.structural_hits
            + metrics.visual_hits
            + metrics.hybrid_hits
            > 0;
        let low_cache = cache_sampled && metrics.cache_hit_rate < Self::MIN_CACHE_HIT_RATE;

        let mut alerts = Vec::new();
        if metrics.success_rate < Self::MIN_SUCCESS_RATE {
            alerts.push(HealthAlert {
                code: "LOW_SUCCESS_RATE",
                message: format!(
                    "success rate {:.2} below {:.2}",
                    metrics.success_rate,
                    Self::MIN_SUCCESS_RATE
                ),
            });
        }
        if low_cache {
            alerts.push(HealthAlert {
                code: "LOW_CACHE_HIT_RATE",
                message: format!(
                    "cache hit rate {:.2} below {:.2}",
                    metrics.cache_hit_rate,
                    Self::MIN_CACHE_HIT_RATE
                ),
            });
        }
        if !ai_service_healthy {
            alerts.push(HealthAlert {
                code: "SYSTEM_UNHEALTHY",
                message: "analysis service reports unhealthy".to_string(),
            });
        }
        if circuit_state == CircuitState::Open {
            alerts.push(HealthAlert {
                code: "CIRCUIT_OPEN",
                message: "analysis service circuit breaker is open".to_string(),
            });
        }
        if metrics.avg_latency_ms > Self::MAX_AVG_LATENCY_MS {
            alerts.push(HealthAlert {
                code: "HIGH_RESPONSE_TIME",
                message: format!("average resolution time {:.0}ms", metrics.avg_latency_ms),
            });
        }

        let severity = if !overall {
            HealthSeverity::Critical
        } else if metrics.success_rate < Self::GOOD_SUCCESS_RATE
            || low_cache
            || !ai_service_healthy
        {
            HealthSeverity::Degraded
        } else {
            HealthSeverity::Healthy
        };

        Self {
            overall,
            severity,
            success_rate: metrics.success_rate,
            cache_hit_rate: metrics.cache_hit_rate,
            ai_service_healthy,
            circuit_state,
            avg_latency_ms: metrics.avg_latency_ms,
            alerts,
        }
    }
}
