//! Recovery strategies
//!
//! Two strategies in fallback order:
//! 1. Structural - analysis of the serialized page source
//! 2. Visual - analysis of a screenshot
//!
//! A strategy only proposes selectors. Verifying them against the live page
//! is the engine's job.

use std::sync::Arc;

use async_trait::async_trait;
use autoheal_core_types::{AnalysisResult, AnalysisService};
use tracing::debug;

use crate::errors::LocatorError;
use crate::request::ResolutionRequest;
use crate::types::{Candidate, StrategyKind};

/// Strategy trait for selector recovery
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Ranked, threshold-filtered selector candidates, best first
    async fn propose(&self, request: &ResolutionRequest) -> Result<Vec<Candidate>, LocatorError>;

    /// Get strategy type
    fn kind(&self) -> StrategyKind;

    /// Get strategy name
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Whether this strategy may run for `request` at all
    fn applies_to(&self, _request: &ResolutionRequest) -> bool {
        true
    }
}

/// Structural analysis of the page source
pub struct StructuralStrategy {
    service: Arc<dyn AnalysisService>,
}

impl StructuralStrategy {
    /// `service` is expected to be the guarded wrapper.
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RecoveryStrategy for StructuralStrategy {
    async fn propose(&self, request: &ResolutionRequest) -> Result<Vec<Candidate>, LocatorError> {
        let source = request
            .driver
            .page_source()
            .await
            .map_err(|err| LocatorError::strategy_failed(self.name(), format!("page source: {err}")))?;
        debug!(
            request_id = %request.id,
            bytes = source.len(),
            "Running structural analysis"
        );
        let analysis = self
            .service
            .analyze_structure(&source, &request.description, &request.selector)
            .await?;
        rank(self.kind(), &analysis, request)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Structural
    }
}

/// Visual analysis of a screenshot
pub struct VisualStrategy {
    service: Arc<dyn AnalysisService>,
}

impl VisualStrategy {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RecoveryStrategy for VisualStrategy {
    async fn propose(&self, request: &ResolutionRequest) -> Result<Vec<Candidate>, LocatorError> {
        let screenshot = request
            .driver
            .screenshot()
            .await
            .map_err(|err| LocatorError::strategy_failed(self.name(), format!("screenshot: {err}")))?;
        debug!(
            request_id = %request.id,
            bytes = screenshot.len(),
            "Running visual analysis"
        );
        let analysis = self
            .service
            .analyze_visual(&screenshot, &request.description)
            .await?;
        rank(self.kind(), &analysis, request)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Visual
    }

    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        request.options.enable_visual_analysis
    }
}

/// Applies the request's confidence threshold and candidate limit.
fn rank(
    kind: StrategyKind,
    analysis: &AnalysisResult,
    request: &ResolutionRequest,
) -> Result<Vec<Candidate>, LocatorError> {
    let candidates: Vec<Candidate> = analysis
        .ranked_candidates()
        .into_iter()
        .map(|alt| {
            let candidate = Candidate::new(alt.selector, kind, alt.confidence);
            match alt.description {
                Some(reasoning) => candidate.with_reasoning(reasoning),
                None => candidate,
            }
        })
        .filter(|candidate| candidate.meets(request.options.confidence_threshold))
        .take(request.options.max_candidates)
        .collect();

    if candidates.is_empty() {
        return Err(LocatorError::strategy_failed(
            kind.name(),
            format!(
                "no candidate reached confidence {:.2} (best {:.2})",
                request.options.confidence_threshold, analysis.confidence
            ),
        ));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoheal_core_types::{
        AlternativeSelector, AutomationDriver, DriverError, ElementHandle, ResolutionContext,
        ServiceError,
    };

    use crate::request::LocatorOptions;

    struct PageDriver;

    #[async_trait]
    impl AutomationDriver for PageDriver {
        async fn find_elements(&self, _selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
            Ok(Vec::new())
        }

        async fn page_source(&self) -> Result<String, DriverError> {
            Ok("<html><button class='btn-primary'/></html>".into())
        }

        async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
            Err(DriverError::PageUnavailable("closed".into()))
        }

        fn element_context(&self, _element: &ElementHandle) -> Result<ResolutionContext, DriverError> {
            Ok(ResolutionContext::default())
        }
    }

    struct FixedService(Result<AnalysisResult, ServiceError>);

    #[async_trait]
    impl AnalysisService for FixedService {
        async fn analyze_structure(
            &self,
            page_source: &str,
            _description: &str,
            _original_selector: &str,
        ) -> Result<AnalysisResult, ServiceError> {
            assert!(page_source.contains("btn-primary"));
            self.0.clone()
        }

        async fn analyze_visual(
            &self,
            _screenshot: &[u8],
            _description: &str,
        ) -> Result<AnalysisResult, ServiceError> {
            self.0.clone()
        }

        async fn rank_candidates(
            &self,
            candidates: &[ElementHandle],
            _description: &str,
        ) -> Result<ElementHandle, ServiceError> {
            Ok(candidates[0].clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn request(options: LocatorOptions) -> ResolutionRequest {
        ResolutionRequest::builder("#login-btn", "login button", Arc::new(PageDriver))
            .options(options)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn structural_filters_and_truncates() {
        let analysis = AnalysisResult::new("button.btn-primary", 0.95)
            .with_alternative(AlternativeSelector::new("#submit", 0.8))
            .with_alternative(AlternativeSelector::new("button", 0.4))
            .with_alternative(AlternativeSelector::new("form button", 0.75));
        let strategy = StructuralStrategy::new(Arc::new(FixedService(Ok(analysis))));
        let options = LocatorOptions {
            max_candidates: 2,
            ..LocatorOptions::default()
        };

        let candidates = strategy.propose(&request(options)).await.unwrap();
        let selectors: Vec<_> = candidates.iter().map(|c| c.selector.as_str()).collect();
        assert_eq!(selectors, vec!["button.btn-primary", "#submit"]);
        assert!(candidates.iter().all(|c| c.strategy == StrategyKind::Structural));
    }

    #[tokio::test]
    async fn low_confidence_analysis_fails_the_strategy() {
        let strategy =
            StructuralStrategy::new(Arc::new(FixedService(Ok(AnalysisResult::new("div", 0.3)))));
        let err = strategy.propose(&request(LocatorOptions::default())).await.unwrap_err();
        assert!(matches!(err, LocatorError::StrategyFailed { ref strategy, .. } if strategy == "structural"));
    }

    #[tokio::test]
    async fn visual_respects_request_switch_and_driver_errors() {
        let strategy =
            VisualStrategy::new(Arc::new(FixedService(Ok(AnalysisResult::new("#v", 0.9)))));
        let disabled = request(LocatorOptions {
            enable_visual_analysis: false,
            ..LocatorOptions::default()
        });
        assert!(!strategy.applies_to(&disabled));

        let err = strategy.propose(&request(LocatorOptions::default())).await.unwrap_err();
        assert!(err.to_string().contains("screenshot"));
    }

    #[tokio::test]
    async fn open_circuit_surfaces_as_circuit_open() {
        let strategy = StructuralStrategy::new(Arc::new(FixedService(Err(
            ServiceError::CircuitOpen {
                service: "fixed".into(),
                retry_after: std::time::Duration::from_secs(1),
            },
        ))));
        let err = strategy.propose(&request(LocatorOptions::default())).await.unwrap_err();
        assert!(matches!(err, LocatorError::CircuitOpen { .. }));
    }
}
