use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use autoheal_core_types::{AnalysisResult, AnalysisService, ElementHandle, ServiceError};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::cbreaker::{CircuitBreaker, CircuitState};
use crate::metrics::{ServiceMetrics, ServiceMetricsSnapshot};
use crate::policy::ResilienceConfig;
use crate::retry::RetryState;

/// Analysis service wrapped in a circuit breaker and fixed-delay retry.
///
/// The breaker is consulted once per guarded call. An admitted call may take
/// up to `max_attempts` attempts, each bounded by `call_timeout`, and only the
/// final outcome is reported to the breaker. Non-retryable errors end the call
/// immediately. A call whose future is dropped before it settles counts as a
/// breaker failure.
pub struct GuardedAnalysisService {
    inner: Arc<dyn AnalysisService>,
    breaker: CircuitBreaker,
    config: ResilienceConfig,
    metrics: ServiceMetrics,
}

impl GuardedAnalysisService {
    pub fn new(inner: Arc<dyn AnalysisService>, config: ResilienceConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(config.failure_threshold, config.cool_down()),
            inner,
            config,
            metrics: ServiceMetrics::default(),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn metrics(&self) -> ServiceMetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ServiceError>> + Send,
        T: Send,
    {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(retry_after) => {
                self.metrics.record_rejection();
                debug!(
                    service = self.inner.name(),
                    operation,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "circuit open; failing fast"
                );
                return Err(ServiceError::CircuitOpen {
                    service: self.inner.name().to_string(),
                    retry_after,
                });
            }
        };

        let started = Instant::now();
        let mut retry = RetryState::new();
        loop {
            self.metrics.record_request();
            let attempt = match timeout(self.config.call_timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(self.config.call_timeout())),
            };

            match attempt {
                Ok(value) => {
                    permit.success();
                    self.metrics.record_success(started.elapsed());
                    return Ok(value);
                }
                Err(err) => {
                    if err.is_retryable() {
                        if let Some(delay) = retry.next_delay(&self.config) {
                            self.metrics.record_retry();
                            warn!(
                                service = self.inner.name(),
                                operation,
                                attempt = retry.retries(),
                                error = %err,
                                "analysis call failed; retrying"
                            );
                            sleep(delay).await;
                            continue;
                        }
                    }
                    permit.failure();
                    self.metrics.record_failure(started.elapsed());
                    warn!(service = self.inner.name(), operation, error = %err, "analysis call failed");
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl AnalysisService for GuardedAnalysisService {
    async fn analyze_structure(
        &self,
        page_source: &str,
        description: &str,
        original_selector: &str,
    ) -> Result<AnalysisResult, ServiceError> {
        self.guarded("analyze_structure", || {
            self.inner
                .analyze_structure(page_source, description, original_selector)
        })
        .await
    }

    async fn analyze_visual(
        &self,
        screenshot: &[u8],
        description: &str,
    ) -> Result<AnalysisResult, ServiceError> {
        self.guarded("analyze_visual", || {
            self.inner.analyze_visual(screenshot, description)
        })
        .await
    }

    async fn rank_candidates(
        &self,
        candidates: &[ElementHandle],
        description: &str,
    ) -> Result<ElementHandle, ServiceError> {
        self.guarded("rank_candidates", || {
            self.inner.rank_candidates(candidates, description)
        })
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn is_healthy(&self) -> bool {
        self.breaker.state() != CircuitState::Open && self.inner.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    /// Replays scripted outcomes for `analyze_structure`; repeats the last one.
    struct ScriptedService {
        outcomes: Mutex<VecDeque<Result<AnalysisResult, ServiceError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedService {
        fn new(outcomes: Vec<Result<AnalysisResult, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(vec![Ok(AnalysisResult::new("#late", 0.9))].into()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisService for ScriptedService {
        async fn analyze_structure(
            &self,
            _page_source: &str,
            _description: &str,
            _original_selector: &str,
        ) -> Result<AnalysisResult, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            let mut outcomes = self.outcomes.lock();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            }
        }

        async fn analyze_visual(
            &self,
            _screenshot: &[u8],
            _description: &str,
        ) -> Result<AnalysisResult, ServiceError> {
            Err(ServiceError::invalid("not scripted"))
        }

        async fn rank_candidates(
            &self,
            candidates: &[ElementHandle],
            _description: &str,
        ) -> Result<ElementHandle, ServiceError> {
            Ok(candidates[0].clone())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn config(threshold: u32, attempts: u32) -> ResilienceConfig {
        ResilienceConfig {
            failure_threshold: threshold,
            cool_down_ms: 60_000,
            max_attempts: attempts,
            retry_delay_ms: 1_000,
            call_timeout_ms: 5_000,
        }
    }

    fn down() -> Result<AnalysisResult, ServiceError> {
        Err(ServiceError::unavailable("503"))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let service = ScriptedService::new(vec![down(), down(), Ok(AnalysisResult::new("#ok", 0.8))]);
        let guarded = GuardedAnalysisService::new(service.clone(), config(5, 3));

        let result = guarded.analyze_structure("<html/>", "ok", "#x").await.unwrap();
        assert_eq!(result.recommended_selector, "#ok");
        assert_eq!(service.calls(), 3);

        let metrics = guarded.metrics();
        assert_eq!(metrics.requests, 3);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.successes, 1);
        assert_eq!(guarded.breaker().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_response_is_not_retried() {
        let service = ScriptedService::new(vec![Err(ServiceError::invalid("garbage"))]);
        let guarded = GuardedAnalysisService::new(service.clone(), config(5, 3));

        let err = guarded.analyze_structure("", "d", "#x").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse(_)));
        assert_eq!(service.calls(), 1);
        assert_eq!(guarded.breaker().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast_without_reaching_service() {
        let service = ScriptedService::new(vec![down()]);
        let guarded = GuardedAnalysisService::new(service.clone(), config(2, 1));

        for _ in 0..2 {
            assert!(guarded.analyze_structure("", "d", "#x").await.is_err());
        }
        assert_eq!(guarded.circuit_state(), CircuitState::Open);
        let reached = service.calls();

        for _ in 0..5 {
            let err = guarded.analyze_structure("", "d", "#x").await.unwrap_err();
            assert!(err.is_circuit_open());
        }
        assert_eq!(service.calls(), reached);
        assert_eq!(guarded.metrics().circuit_rejections, 5);
        assert!(!guarded.is_healthy().await);
    }

    #[tokio::test(start_paused = true)]
    async fn after_cool_down_one_probe_reaches_service() {
        let service = ScriptedService::new(vec![down(), down(), Ok(AnalysisResult::new("#back", 0.7))]);
        let guarded = GuardedAnalysisService::new(service.clone(), config(2, 1));
        for _ in 0..2 {
            let _ = guarded.analyze_structure("", "d", "#x").await;
        }
        assert_eq!(guarded.circuit_state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(60)).await;
        let result = guarded.analyze_structure("", "d", "#x").await.unwrap();
        assert_eq!(result.recommended_selector, "#back");
        assert_eq!(service.calls(), 3);
        assert_eq!(guarded.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_a_single_probe() {
        let service = ScriptedService::slow(Duration::from_secs(2));
        let guarded = Arc::new(GuardedAnalysisService::new(service.clone(), config(1, 1)));
        guarded.breaker().try_acquire().unwrap().failure();
        tokio::time::advance(Duration::from_secs(60)).await;

        let probe = {
            let guarded = Arc::clone(&guarded);
            tokio::spawn(async move { guarded.analyze_structure("", "d", "#x").await })
        };
        tokio::task::yield_now().await;
        let err = guarded.analyze_structure("", "d", "#x").await.unwrap_err();
        assert!(err.is_circuit_open());

        assert!(probe.await.unwrap().is_ok());
        assert_eq!(service.calls(), 1);
        assert_eq!(guarded.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_count_as_failures() {
        let service = ScriptedService::slow(Duration::from_secs(30));
        let guarded = GuardedAnalysisService::new(service.clone(), config(5, 2));

        let err = guarded.analyze_structure("", "d", "#x").await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(Duration::from_secs(5)));
        assert_eq!(service.calls(), 2);
        assert_eq!(guarded.breaker().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_cancelled_by_the_caller_trip_the_breaker() {
        let service = ScriptedService::slow(Duration::from_secs(3600));
        let guarded = GuardedAnalysisService::new(service.clone(), config(2, 1));

        for _ in 0..2 {
            let outer = timeout(Duration::from_secs(1), guarded.analyze_structure("", "d", "#x")).await;
            assert!(outer.is_err());
        }
        assert_eq!(guarded.circuit_state(), CircuitState::Open);
        assert_eq!(guarded.breaker().stats().abandoned, 2);

        let err = guarded.analyze_structure("", "d", "#x").await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(service.calls(), 2);
    }
}
