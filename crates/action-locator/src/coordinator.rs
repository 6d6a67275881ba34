//! Resolution coordinator: original selector, then cache, then healing

use std::sync::Arc;
use std::time::Duration;

use autoheal_core_types::{
    AnalysisService, ElementFingerprint, ElementHandle, ResolutionContext, ResolutionStrategyTag,
};
use autoheal_resilience::{
    CircuitState, GuardedAnalysisService, ServiceMetricsSnapshot,
};
use autoheal_selector_cache::{
    build_key, open_cache, CacheKey, CacheMetricsSnapshot, CachedSelector, SelectorCache,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::HealConfig;
use crate::disambiguator::Disambiguator;
use crate::engine::StrategyEngine;
use crate::errors::LocatorError;
use crate::metrics::{HealthStatus, LocatorMetrics, LocatorMetricsSnapshot};
use crate::request::ResolutionRequest;
use crate::types::ResolutionResult;

/// Top-level entry point owning one cache, one worker pool and one guarded
/// analysis service.
///
/// Resolution runs three strictly ordered steps and returns at the first
/// success: probe the original selector, probe a trusted cached selector,
/// then heal through the strategy engine. Only `ElementNotFound` escapes a
/// completed pipeline.
pub struct ResolutionCoordinator {
    config: HealConfig,
    cache: Arc<dyn SelectorCache>,
    service: Arc<GuardedAnalysisService>,
    engine: StrategyEngine,
    disambiguator: Arc<Disambiguator>,
    workers: Semaphore,
    metrics: Arc<LocatorMetrics>,
}

impl ResolutionCoordinator {
    /// Opens the configured cache backend and wires the pipeline.
    pub async fn new(
        config: HealConfig,
        service: Arc<dyn AnalysisService>,
    ) -> Result<Self, LocatorError> {
        config.validate()?;
        let cache = open_cache(&config.cache).await?;
        Self::with_cache(config, service, cache)
    }

    /// Uses an already opened cache.
    pub fn with_cache(
        config: HealConfig,
        service: Arc<dyn AnalysisService>,
        cache: Arc<dyn SelectorCache>,
    ) -> Result<Self, LocatorError> {
        config.validate()?;
        let metrics = Arc::new(LocatorMetrics::default());
        let guarded = Arc::new(GuardedAnalysisService::new(
            service,
            config.resilience.clone(),
        ));
        let disambiguator = Arc::new(Disambiguator::new(
            guarded.clone(),
            config.timeouts.disambiguation(),
            metrics.clone(),
        ));
        let engine = StrategyEngine::standard(
            guarded.clone(),
            config.engine.policy,
            disambiguator.clone(),
            metrics.clone(),
        );
        info!(
            policy = %config.engine.policy,
            workers = config.engine.worker_pool_size,
            cache = cache.backend_name(),
            service = guarded.name(),
            "Resolution coordinator ready"
        );
        Ok(Self {
            workers: Semaphore::new(config.engine.worker_pool_size),
            config,
            cache,
            service: guarded,
            engine,
            disambiguator,
            metrics,
        })
    }

    pub fn config(&self) -> &HealConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<dyn SelectorCache> {
        Arc::clone(&self.cache)
    }

    pub async fn resolve(&self, request: ResolutionRequest) -> Result<ResolutionResult, LocatorError> {
        self.resolve_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Resolves unless `cancel` fires first.
    ///
    /// Cancellation is observed while waiting for a worker and during every
    /// step; once observed, nothing more is written to the cache.
    pub async fn resolve_with_cancel(
        &self,
        request: ResolutionRequest,
        cancel: CancellationToken,
    ) -> Result<ResolutionResult, LocatorError> {
        let span = info_span!(
            "resolve",
            request_id = %request.id,
            selector = %request.selector,
            description = %request.description
        );
        async move {
            self.metrics.record_request();
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.metrics.record_cancelled();
                    return Err(LocatorError::Cancelled);
                }
                permit = self.workers.acquire() => permit.map_err(|_| LocatorError::ShutDown)?,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.metrics.record_cancelled();
                    info!("Resolution cancelled");
                    Err(LocatorError::Cancelled)
                }
                result = self.pipeline(&request, &cancel) => result,
            }
        }
        .instrument(span)
        .await
    }

    /// Blocking-style resolution with an overall deadline.
    pub async fn resolve_with_deadline(
        &self,
        request: ResolutionRequest,
        deadline: Duration,
    ) -> Result<ResolutionResult, LocatorError> {
        let cancel = CancellationToken::new();
        match timeout(deadline, self.resolve_with_cancel(request, cancel.clone())).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                self.metrics.record_deadline_exceeded();
                warn!(deadline_ms = deadline.as_millis() as u64, "Resolution deadline exceeded");
                Err(LocatorError::timeout("resolution", deadline))
            }
        }
    }

    /// Starts a resolution on its own task.
    pub fn spawn_resolve(self: &Arc<Self>, request: ResolutionRequest) -> ResolveHandle {
        let cancel = CancellationToken::new();
        let coordinator = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { coordinator.resolve_with_cancel(request, token).await });
        ResolveHandle { cancel, task }
    }

    /// Every element matching the selector that resolved, or just the
    /// resolved element when the re-query comes back empty.
    pub async fn find_all(&self, request: ResolutionRequest) -> Result<Vec<ElementHandle>, LocatorError> {
        let driver = request.driver.clone();
        let result = self.resolve(request).await?;
        match timeout(
            self.config.timeouts.cache_probe(),
            driver.find_elements(&result.selector),
        )
        .await
        {
            Ok(Ok(found)) if !found.is_empty() => Ok(found),
            Ok(Ok(_)) => Ok(vec![result.element]),
            Ok(Err(err)) => {
                debug!(error = %err, "Re-query failed; returning resolved element");
                Ok(vec![result.element])
            }
            Err(_) => {
                self.metrics.record_timeout();
                Ok(vec![result.element])
            }
        }
    }

    /// Never fails; any resolution error means absent.
    pub async fn is_present(&self, request: ResolutionRequest) -> bool {
        self.resolve(request).await.is_ok()
    }

    pub async fn clear_cache(&self) -> Result<(), LocatorError> {
        self.cache.clear().await?;
        info!("Selector cache cleared");
        Ok(())
    }

    pub async fn remove_cached(
        &self,
        selector: &str,
        description: &str,
        context: &ResolutionContext,
    ) -> Result<bool, LocatorError> {
        let key = build_key(selector, description, context);
        Ok(self.cache.remove(&key).await?)
    }

    pub fn cache_size(&self) -> usize {
        self.cache.size()
    }

    pub async fn cleanup_expired(&self) -> Result<usize, LocatorError> {
        let dropped = self.cache.evict_expired().await?;
        debug!(dropped, "Expired cache entries removed");
        Ok(dropped)
    }

    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.cache.metrics()
    }

    pub fn metrics(&self) -> LocatorMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn service_metrics(&self) -> ServiceMetricsSnapshot {
        self.service.metrics()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.service.circuit_state()
    }

    pub async fn health(&self) -> HealthStatus {
        let ai_service_healthy = self.service.is_healthy().await;
        HealthStatus::evaluate(
            &self.metrics.snapshot(),
            ai_service_healthy,
            self.service.circuit_state(),
        )
    }

    /// Stops accepting new resolutions; in-flight ones finish normally.
    pub fn shutdown(&self) {
        self.workers.close();
        info!("Resolution coordinator shut down");
    }

    async fn pipeline(
        &self,
        request: &ResolutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolutionResult, LocatorError> {
        let started = Instant::now();
        let caching = request.options.enable_caching;
        let key = build_key(&request.selector, &request.description, &request.context);

        if let Some(element) = self.probe_original(request).await {
            if caching {
                self.store(request, key, &request.selector, &element, cancel)
                    .await;
            }
            return Ok(self.finish(
                request,
                started,
                element,
                request.selector.clone(),
                ResolutionStrategyTag::OriginalSelector,
                1.0,
                "original selector matched".to_string(),
            ));
        }

        let mut tried = vec![request.selector.clone()];
        if caching {
            if let Some((element, selector, confidence)) =
                self.probe_cache(request, &key, &mut tried, cancel).await
            {
                let mut result = self.finish(
                    request,
                    started,
                    element,
                    selector,
                    ResolutionStrategyTag::Cached,
                    confidence,
                    "cached selector verified".to_string(),
                );
                result.from_cache = true;
                return Ok(result);
            }
        }

        match self.engine.heal(request).await {
            Ok(healed) => {
                if caching {
                    self.store(request, key, &healed.selector, &healed.element, cancel)
                        .await;
                }
                Ok(self.finish(
                    request,
                    started,
                    healed.element,
                    healed.selector,
                    healed.strategy,
                    healed.confidence,
                    healed.reasoning,
                ))
            }
            Err(err) => {
                let mut attempted = Vec::new();
                if let LocatorError::StrategiesExhausted { failures } = err {
                    for failure in failures {
                        attempted.push(failure.strategy);
                        for selector in failure.tried_selectors {
                            if !tried.contains(&selector) {
                                tried.push(selector);
                            }
                        }
                    }
                } else {
                    warn!(error = %err, "Healing failed unexpectedly");
                }
                self.metrics.record_not_found(started.elapsed());
                warn!(
                    strategies = ?attempted,
                    selectors = ?tried,
                    "Element not found"
                );
                Err(LocatorError::ElementNotFound {
                    selector: request.selector.clone(),
                    description: request.description.clone(),
                    attempted_strategies: attempted,
                    tried_selectors: tried,
                })
            }
        }
    }

    async fn probe_original(&self, request: &ResolutionRequest) -> Option<ElementHandle> {
        let bound = self.config.timeouts.original_probe();
        let found = match timeout(bound, request.driver.find_elements(&request.selector)).await {
            Ok(Ok(found)) => found,
            Ok(Err(err)) => {
                debug!(error = %err, "Original selector probe failed");
                return None;
            }
            Err(_) => {
                self.metrics.record_timeout();
                debug!(timeout_ms = bound.as_millis() as u64, "Original selector probe timed out");
                return None;
            }
        };
        if found.is_empty() {
            debug!("Original selector matched nothing");
            return None;
        }
        self.disambiguator
            .pick(found, &request.description)
            .await
            .ok()
    }

    /// Returns the element, the cached selector and its live success rate.
    async fn probe_cache(
        &self,
        request: &ResolutionRequest,
        key: &CacheKey,
        tried: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Option<(ElementHandle, String, f64)> {
        let entry = match self.cache.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                return None;
            }
            Err(err) => {
                self.metrics.record_cache_unavailable();
                warn!(error = %err, "Cache unavailable; treating as miss");
                return None;
            }
        };

        let threshold = self.config.trust.trust_threshold;
        if !entry.is_trusted(threshold) {
            self.metrics.record_untrusted_cache_skip();
            debug!(
                selector = entry.selector(),
                success_rate = entry.success_rate(),
                threshold,
                "Cached selector not trusted"
            );
            return None;
        }

        let selector = entry.selector().to_string();
        if !tried.contains(&selector) {
            tried.push(selector.clone());
        }

        let bound = self.config.timeouts.cache_probe();
        let element = match timeout(bound, request.driver.find_elements(&selector)).await {
            Ok(Ok(found)) if !found.is_empty() => {
                self.disambiguator.pick(found, &request.description).await.ok()
            }
            Ok(Ok(_)) => None,
            Ok(Err(err)) => {
                debug!(error = %err, selector = %selector, "Cached selector probe failed");
                None
            }
            Err(_) => {
                self.metrics.record_timeout();
                None
            }
        };

        let verified = element.filter(|element| self.fingerprint_matches(request, &entry, element));
        if cancel.is_cancelled() {
            return None;
        }
        let success = verified.is_some();
        if let Err(err) = self.cache.record_outcome(key, success).await {
            self.metrics.record_cache_unavailable();
            warn!(error = %err, "Failed to record cache outcome");
        }
        match verified {
            Some(element) => Some((element, selector, entry.success_rate())),
            None => {
                debug!(
                    selector = %selector,
                    success_rate = entry.success_rate(),
                    "Cached selector failed; falling through to healing"
                );
                None
            }
        }
    }

    fn fingerprint_matches(
        &self,
        request: &ResolutionRequest,
        entry: &CachedSelector,
        element: &ElementHandle,
    ) -> bool {
        let trust = &self.config.trust;
        let stored = match entry.fingerprint() {
            Some(stored) if trust.verify_fingerprint => stored,
            _ => return true,
        };
        let context = match request.driver.element_context(element) {
            Ok(context) => context,
            Err(err) => {
                debug!(error = %err, "No element context; skipping fingerprint check");
                return true;
            }
        };
        let similarity = stored.similarity(&ElementFingerprint::capture(element, &context));
        if similarity < trust.fingerprint_threshold {
            self.metrics.record_fingerprint_mismatch();
            debug!(
                similarity,
                threshold = trust.fingerprint_threshold,
                "Cached element no longer resembles the stored fingerprint"
            );
            return false;
        }
        true
    }

    /// Writes a fresh entry for a verified selector.
    async fn store(
        &self,
        request: &ResolutionRequest,
        key: CacheKey,
        selector: &str,
        element: &ElementHandle,
        cancel: &CancellationToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        let context = request
            .driver
            .element_context(element)
            .unwrap_or_else(|err| {
                debug!(error = %err, "No element context; fingerprinting with request context");
                request.context.clone()
            });
        let fingerprint = ElementFingerprint::capture(element, &context);
        match self
            .cache
            .put(key, CachedSelector::new(selector, Some(fingerprint)))
            .await
        {
            Ok(()) => debug!(selector, "Selector cached"),
            Err(err) => {
                self.metrics.record_cache_unavailable();
                warn!(error = %err, selector, "Failed to cache selector");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        request: &ResolutionRequest,
        started: Instant,
        element: ElementHandle,
        selector: String,
        strategy: ResolutionStrategyTag,
        confidence: f64,
        reasoning: String,
    ) -> ResolutionResult {
        let duration = started.elapsed();
        self.metrics.record_success(strategy, duration);
        info!(
            strategy = %strategy,
            selector = %selector,
            element = %element,
            confidence,
            duration_ms = duration.as_millis() as u64,
            "Element resolved"
        );
        ResolutionResult {
            request_id: request.id.clone(),
            element,
            selector,
            strategy,
            duration,
            from_cache: false,
            confidence,
            reasoning,
        }
    }
}

/// Non-blocking handle to a spawned resolution
pub struct ResolveHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<ResolutionResult, LocatorError>>,
}

impl ResolveHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<ResolutionResult, LocatorError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(LocatorError::Cancelled),
            Err(err) => Err(LocatorError::Internal(format!("resolution task failed: {err}"))),
        }
    }
}
