//! Strategy engine: composes recovery strategies under an execution policy

use std::sync::Arc;

use autoheal_core_types::{AnalysisService, ElementHandle, ResolutionStrategyTag};
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ExecutionPolicy;
use crate::disambiguator::Disambiguator;
use crate::errors::{LocatorError, StrategyFailure};
use crate::metrics::LocatorMetrics;
use crate::request::ResolutionRequest;
use crate::strategies::{RecoveryStrategy, StructuralStrategy, VisualStrategy};
use crate::types::{Candidate, StrategyKind};

/// A healed element, verified against the live page
#[derive(Debug, Clone)]
pub struct HealOutcome {
    pub element: ElementHandle,
    pub selector: String,
    pub strategy: ResolutionStrategyTag,
    pub confidence: f64,
    pub reasoning: String,
    /// Strategies that ran
    pub attempted: Vec<String>,
    /// Every proposed selector that was probed
    pub tried_selectors: Vec<String>,
}

struct Verified {
    kind: StrategyKind,
    candidate: Candidate,
    element: ElementHandle,
    tried: Vec<String>,
}

pub struct StrategyEngine {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    policy: ExecutionPolicy,
    disambiguator: Arc<Disambiguator>,
    metrics: Arc<LocatorMetrics>,
}

impl StrategyEngine {
    pub fn new(
        policy: ExecutionPolicy,
        disambiguator: Arc<Disambiguator>,
        metrics: Arc<LocatorMetrics>,
    ) -> Self {
        Self {
            strategies: Vec::new(),
            policy,
            disambiguator,
            metrics,
        }
    }

    /// Structural then visual, both backed by `service`.
    pub fn standard(
        service: Arc<dyn AnalysisService>,
        policy: ExecutionPolicy,
        disambiguator: Arc<Disambiguator>,
        metrics: Arc<LocatorMetrics>,
    ) -> Self {
        Self::new(policy, disambiguator, metrics)
            .with_strategy(Arc::new(StructuralStrategy::new(service.clone())))
            .with_strategy(Arc::new(VisualStrategy::new(service)))
    }

    /// Registers a strategy; registration order is declaration order.
    pub fn with_strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Strategies the policy allows for `request`, in execution order.
    pub fn plan(&self, request: &ResolutionRequest) -> Vec<Arc<dyn RecoveryStrategy>> {
        let declared: Vec<StrategyKind> = self.strategies.iter().map(|s| s.kind()).collect();
        self.policy
            .plan(&declared)
            .into_iter()
            .filter_map(|kind| self.strategies.iter().find(|s| s.kind() == kind).cloned())
            .filter(|strategy| strategy.applies_to(request))
            .collect()
    }

    pub async fn heal(&self, request: &ResolutionRequest) -> Result<HealOutcome, LocatorError> {
        let planned = self.plan(request);
        debug!(
            request_id = %request.id,
            policy = %self.policy,
            strategies = ?planned.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Healing"
        );
        if planned.is_empty() {
            warn!(request_id = %request.id, policy = %self.policy, "No strategy applicable");
            return Err(LocatorError::StrategiesExhausted { failures: Vec::new() });
        }
        match self.policy {
            ExecutionPolicy::Parallel => self.heal_parallel(planned, request).await,
            _ => self.heal_sequential(planned, request).await,
        }
    }

    async fn heal_sequential(
        &self,
        planned: Vec<Arc<dyn RecoveryStrategy>>,
        request: &ResolutionRequest,
    ) -> Result<HealOutcome, LocatorError> {
        let mut failures = Vec::new();
        for strategy in planned {
            let result = attempt(
                strategy,
                request.clone(),
                self.disambiguator.clone(),
                self.metrics.clone(),
            )
            .await;
            match result {
                Ok(verified) => {
                    let tag = verified.kind.tag();
                    let reasoning = verified.candidate.reasoning.clone().unwrap_or_default();
                    return Ok(outcome(verified, tag, reasoning, failures));
                }
                Err(failure) => failures.push(failure),
            }
        }
        Err(LocatorError::StrategiesExhausted { failures })
    }

    /// Every planned strategy runs on its own task. Losing tasks are not
    /// aborted; if this future is dropped they finish in the background and
    /// their results are discarded.
    async fn heal_parallel(
        &self,
        planned: Vec<Arc<dyn RecoveryStrategy>>,
        request: &ResolutionRequest,
    ) -> Result<HealOutcome, LocatorError> {
        let names: Vec<&'static str> = planned.iter().map(|s| s.name()).collect();
        let handles: Vec<_> = planned
            .into_iter()
            .map(|strategy| {
                tokio::spawn(attempt(
                    strategy,
                    request.clone(),
                    self.disambiguator.clone(),
                    self.metrics.clone(),
                ))
            })
            .collect();

        let mut best: Option<Verified> = None;
        let mut failures = Vec::new();
        let mut losers = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            let verified = match joined {
                Ok(Ok(verified)) => verified,
                Ok(Err(failure)) => {
                    failures.push(failure);
                    continue;
                }
                Err(err) => {
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        error: format!("task failed: {err}"),
                        tried_selectors: Vec::new(),
                    });
                    continue;
                }
            };
            // Strictly greater keeps the earlier declaration on ties.
            let wins = best.as_ref().map_or(true, |current| {
                verified.candidate.confidence > current.candidate.confidence
            });
            if wins {
                if let Some(previous) = best.replace(verified) {
                    losers.push(previous);
                }
            } else {
                losers.push(verified);
            }
        }

        match best {
            Some(winner) => {
                let reasoning = format!(
                    "parallel: {} won at {:.2}{}",
                    winner.kind.name(),
                    winner.candidate.confidence,
                    winner
                        .candidate
                        .reasoning
                        .as_deref()
                        .map(|r| format!(" ({r})"))
                        .unwrap_or_default()
                );
                let mut healed = outcome(winner, ResolutionStrategyTag::Hybrid, reasoning, failures);
                for loser in losers {
                    healed.attempted.push(loser.kind.name().to_string());
                    healed.tried_selectors.extend(loser.tried);
                }
                Ok(healed)
            }
            None => Err(LocatorError::StrategiesExhausted { failures }),
        }
    }
}

fn outcome(
    verified: Verified,
    strategy: ResolutionStrategyTag,
    reasoning: String,
    failures: Vec<StrategyFailure>,
) -> HealOutcome {
    let mut attempted: Vec<String> = failures.iter().map(|f| f.strategy.clone()).collect();
    let mut tried_selectors: Vec<String> =
        failures.into_iter().flat_map(|f| f.tried_selectors).collect();
    attempted.push(verified.kind.name().to_string());
    tried_selectors.extend(verified.tried);
    HealOutcome {
        element: verified.element,
        selector: verified.candidate.selector,
        strategy,
        confidence: verified.candidate.confidence,
        reasoning,
        attempted,
        tried_selectors,
    }
}

/// One strategy run: propose, then probe candidates best first until one
/// matches the live page. Bounded by the request's per-strategy timeout.
async fn attempt(
    strategy: Arc<dyn RecoveryStrategy>,
    request: ResolutionRequest,
    disambiguator: Arc<Disambiguator>,
    metrics: Arc<LocatorMetrics>,
) -> Result<Verified, StrategyFailure> {
    let kind = strategy.kind();
    let bound = request.options.timeout();
    let mut tried = Vec::new();
    let mut charged = false;

    let run = async {
        let proposed = strategy.propose(&request).await;
        if !matches!(proposed, Err(LocatorError::CircuitOpen { .. })) {
            metrics.record_strategy_run(kind);
            charged = true;
        }
        for candidate in proposed? {
            tried.push(candidate.selector.clone());
            match request.driver.find_elements(&candidate.selector).await {
                Ok(found) if !found.is_empty() => {
                    let element = disambiguator.pick(found, &request.description).await?;
                    return Ok((candidate, element));
                }
                Ok(_) => debug!(
                    request_id = %request.id,
                    strategy = kind.name(),
                    selector = %candidate.selector,
                    "Candidate did not match the page"
                ),
                Err(err) => debug!(
                    request_id = %request.id,
                    strategy = kind.name(),
                    selector = %candidate.selector,
                    error = %err,
                    "Candidate probe failed"
                ),
            }
        }
        Err(LocatorError::strategy_failed(
            kind.name(),
            "no proposed selector matched the page",
        ))
    };

    let result = match timeout(bound, run).await {
        Ok(result) => result,
        Err(_) => {
            if !charged {
                metrics.record_strategy_run(kind);
            }
            Err(LocatorError::timeout(format!("{} strategy", kind.name()), bound))
        }
    };

    match result {
        Ok((candidate, element)) => {
            info!(
                request_id = %request.id,
                strategy = kind.name(),
                selector = %candidate.selector,
                confidence = candidate.confidence,
                "Strategy produced a verified selector"
            );
            Ok(Verified {
                kind,
                candidate,
                element,
                tried,
            })
        }
        Err(err) => {
            match &err {
                LocatorError::Timeout { .. } => metrics.record_timeout(),
                LocatorError::CircuitOpen { .. } => metrics.record_circuit_open_skip(),
                _ => {}
            }
            metrics.record_strategy_failure();
            warn!(
                request_id = %request.id,
                strategy = kind.name(),
                error = %err,
                "Strategy failed"
            );
            Err(StrategyFailure {
                strategy: kind.name().to_string(),
                error: err.to_string(),
                tried_selectors: tried,
            })
        }
    }
}
