//! Counters for calls made through the guarded analysis service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    circuit_rejections: AtomicU64,
    latency_ns: AtomicU64,
    latency_samples: AtomicU64,
}

impl ServiceMetrics {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    fn record_latency(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.latency_ns.fetch_add(nanos, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let completed = successes + failures;
        ServiceMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes,
            failures,
            retries: self.retries.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            success_rate: if completed == 0 {
                1.0
            } else {
                successes as f64 / completed as f64
            },
            avg_latency_ms: if samples == 0 {
                0.0
            } else {
                self.latency_ns.load(Ordering::Relaxed) as f64 / samples as f64 / 1_000_000.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServiceMetricsSnapshot {
    /// Attempts sent to the service, retries included.
    pub requests: u64,
    /// Guarded calls that ultimately succeeded.
    pub successes: u64,
    /// Guarded calls that ultimately failed after retries.
    pub failures: u64,
    pub retries: u64,
    pub circuit_rejections: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_defaults_to_one_without_calls() {
        let metrics = ServiceMetrics::default();
        assert_eq!(metrics.snapshot().success_rate, 1.0);
        metrics.record_success(Duration::from_millis(10));
        metrics.record_failure(Duration::from_millis(30));
        let snap = metrics.snapshot();
        assert_eq!(snap.success_rate, 0.5);
        assert!((snap.avg_latency_ms - 20.0).abs() < 1e-9);
    }
}
