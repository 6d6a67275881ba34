//! Three-state circuit breaker keyed on consecutive failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

struct Core {
    phase: Phase,
    consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub admitted: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
    pub trips: u64,
    /// Permits dropped unsettled, also counted in `failures`
    pub abandoned: u64,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cool_down: Duration,
    core: Mutex<Core>,
    admitted: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    trips: AtomicU64,
    abandoned: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cool_down,
            core: Mutex::new(Core {
                phase: Phase::Closed,
                consecutive_failures: 0,
            }),
            admitted: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            trips: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    /// Admits a call or rejects it with the remaining cool-down.
    ///
    /// Once the cool-down has elapsed exactly one caller receives a probe
    /// permit; everyone else is rejected until that probe settles.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, Duration> {
        let now = Instant::now();
        let mut core = self.core.lock();
        let phase = core.phase;
        let probe = match phase {
            Phase::Closed => false,
            Phase::Open { until } if now >= until => {
                core.phase = Phase::HalfOpen {
                    probe_in_flight: true,
                };
                info!("circuit half-open; admitting probe");
                true
            }
            Phase::Open { until } => {
                drop(core);
                self.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(until.saturating_duration_since(now));
            }
            Phase::HalfOpen {
                probe_in_flight: false,
            } => {
                core.phase = Phase::HalfOpen {
                    probe_in_flight: true,
                };
                true
            }
            Phase::HalfOpen {
                probe_in_flight: true,
            } => {
                drop(core);
                self.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(Duration::ZERO);
            }
        };
        drop(core);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    pub fn state(&self) -> CircuitState {
        match self.core.lock().phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.core.lock().consecutive_failures
    }

    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            trips: self.trips.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Forces the breaker closed.
    pub fn reset(&self) {
        let mut core = self.core.lock();
        core.phase = Phase::Closed;
        core.consecutive_failures = 0;
    }

    fn on_success(&self, probe: bool) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        let mut core = self.core.lock();
        let phase = core.phase;
        match phase {
            Phase::HalfOpen { .. } if probe => {
                core.phase = Phase::Closed;
                core.consecutive_failures = 0;
                info!("circuit closed after successful probe");
            }
            Phase::Closed => core.consecutive_failures = 0,
            // a call admitted before the trip finished late; the open window stands
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut core = self.core.lock();
        core.consecutive_failures = core.consecutive_failures.saturating_add(1);
        let phase = core.phase;
        let trip = match phase {
            Phase::HalfOpen { .. } => probe,
            Phase::Closed => core.consecutive_failures >= self.failure_threshold,
            Phase::Open { .. } => false,
        };
        if trip {
            core.phase = Phase::Open {
                until: Instant::now() + self.cool_down,
            };
            self.trips.fetch_add(1, Ordering::Relaxed);
            warn!(
                consecutive_failures = core.consecutive_failures,
                cool_down_ms = self.cool_down.as_millis() as u64,
                "circuit opened"
            );
        }
    }

    fn on_abandoned(&self, probe: bool) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
        warn!(probe, "guarded call abandoned before settling; counting a failure");
        self.on_failure(probe);
    }
}

/// Admission ticket for one guarded call.
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// Dropping an unsettled permit (the caller's own deadline cancelled the
/// call) counts as a failure. An abandoned probe re-opens the circuit.
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.probe);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn trip(breaker: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            breaker.try_acquire().expect("admitted").failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn trips_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        trip(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        trip(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);

        let retry_after = breaker.try_acquire().err().expect("rejected");
        assert_eq!(retry_after, Duration::from_secs(60));
        assert_eq!(breaker.stats().trips, 1);
        assert_eq!(breaker.stats().rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        trip(&breaker, 2);
        breaker.try_acquire().unwrap().success();
        trip(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        trip(&breaker, 1);
        advance(Duration::from_secs(10)).await;

        let probe = breaker.try_acquire().expect("probe admitted");
        assert!(probe.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err());
        assert!(breaker.try_acquire().is_err());

        probe.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!breaker.try_acquire().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_restarts_cool_down() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        trip(&breaker, 1);
        advance(Duration::from_secs(10)).await;
        breaker.try_acquire().unwrap().failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        advance(Duration::from_secs(9)).await;
        assert!(breaker.try_acquire().is_err());
        advance(Duration::from_secs(1)).await;
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.stats().trips, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_calls_count_towards_the_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            let _cancelled = breaker.try_acquire().expect("admitted");
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        let stats = breaker.stats();
        assert_eq!(stats.abandoned, 3);
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.trips, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_half_open_call_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        trip(&breaker, 1);
        advance(Duration::from_secs(10)).await;
        {
            let probe = breaker.try_acquire().unwrap();
            assert!(probe.is_probe());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire().err(), Some(Duration::from_secs(10)));
        advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire().expect("next probe").is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_does_not_close_open_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        let slow = breaker.try_acquire().unwrap();
        trip(&breaker, 1);
        slow.success();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
