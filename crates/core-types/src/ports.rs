//! Collaborator ports consumed by the resolution engine.

use async_trait::async_trait;

use crate::analysis::AnalysisResult;
use crate::element::{ElementHandle, ResolutionContext};
use crate::errors::{DriverError, ServiceError};

/// Adapter over a live page in some host automation framework.
///
/// Selectors are plain strings in the driver's native query language; drivers
/// must accept them as-is rather than recovering them from framework objects.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// All elements matching `selector`, in host order. Empty on no match.
    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;

    async fn page_source(&self) -> Result<String, DriverError>;

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Neighbourhood of an element that was just found.
    fn element_context(&self, element: &ElementHandle) -> Result<ResolutionContext, DriverError>;

    fn name(&self) -> &str {
        "driver"
    }
}

/// Remote service that proposes selectors and ranks ambiguous matches.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze_structure(
        &self,
        page_source: &str,
        description: &str,
        original_selector: &str,
    ) -> Result<AnalysisResult, ServiceError>;

    async fn analyze_visual(
        &self,
        screenshot: &[u8],
        description: &str,
    ) -> Result<AnalysisResult, ServiceError>;

    /// Pick the element that best matches `description`.
    async fn rank_candidates(
        &self,
        candidates: &[ElementHandle],
        description: &str,
    ) -> Result<ElementHandle, ServiceError>;

    fn name(&self) -> &str;

    async fn is_healthy(&self) -> bool {
        true
    }
}
