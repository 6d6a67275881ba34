//! Scripted page fixtures
//!
//! A fixture is a YAML document describing one page (which selectors match
//! which elements), how the analysis service answers, and which requests to
//! resolve. It stands in for a live browser and a remote analysis service so
//! the full pipeline can be exercised from the command line and in tests.
//!
//! ```yaml
//! page:
//!   source: "<form><button class='btn-primary' type='submit'>Log in</button></form>"
//!   elements:
//!     "button.btn-primary[type=submit]":
//!       - id: submit
//!         tag: button
//!         context:
//!           parent_container: form#login
//! analysis:
//!   structural:
//!     result:
//!       recommended_selector: "button.btn-primary[type=submit]"
//!       confidence: 0.95
//!   visual:
//!     error: unavailable
//!   rank: first
//! requests:
//!   - selector: "#login-btn"
//!     description: login button
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use action_locator::LocatorOptions;
use anyhow::{Context, Result};
use async_trait::async_trait;
use autoheal_core_types::{
    AnalysisResult, AnalysisService, AutomationDriver, DriverError, ElementHandle,
    ResolutionContext, ServiceError,
};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageFixture {
    #[serde(default)]
    pub page: PageSpec,
    #[serde(default)]
    pub analysis: AnalysisSpec,
    #[serde(default)]
    pub requests: Vec<RequestSpec>,
}

impl PageFixture {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing fixture {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn driver(&self) -> ScriptedDriver {
        ScriptedDriver::new(&self.page)
    }

    pub fn service(&self) -> ScriptedAnalysisService {
        ScriptedAnalysisService::new(self.analysis.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub source: String,
    /// Bytes handed to visual analysis
    #[serde(default)]
    pub screenshot: String,
    /// Selector to the elements it matches, in host order
    #[serde(default)]
    pub elements: BTreeMap<String, Vec<FixtureElement>>,
    /// Artificial latency per selector lookup
    #[serde(default)]
    pub delays_ms: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureElement {
    #[serde(flatten)]
    pub handle: ElementHandle,
    #[serde(default)]
    pub context: ResolutionContext,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisSpec {
    #[serde(default)]
    pub structural: ReplySpec,
    #[serde(default)]
    pub visual: ReplySpec,
    #[serde(default)]
    pub rank: RankSpec,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

/// One scripted analysis answer. With neither `result` nor `error` the
/// service reports itself unavailable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplySpec {
    #[serde(default)]
    pub result: Option<AnalysisResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl ReplySpec {
    async fn answer(&self) -> Result<AnalysisResult, ServiceError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        match (&self.result, &self.error) {
            (_, Some(error)) if error == "invalid" => {
                Err(ServiceError::invalid("scripted invalid response"))
            }
            (_, Some(error)) => Err(ServiceError::unavailable(error.clone())),
            (Some(result), None) => Ok(result.clone()),
            (None, None) => Err(ServiceError::unavailable("no scripted answer")),
        }
    }
}

/// How `rank_candidates` behaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSpec {
    #[default]
    First,
    Last,
    /// Never answers
    Timeout,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestSpec {
    pub selector: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub context: ResolutionContext,
    #[serde(default)]
    pub options: Option<LocatorOptions>,
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_repeat() -> usize {
    1
}

/// Driver answering lookups from a fixture page
pub struct ScriptedDriver {
    source: String,
    screenshot: Vec<u8>,
    elements: HashMap<String, Vec<ElementHandle>>,
    contexts: HashMap<String, ResolutionContext>,
    delays: HashMap<String, Duration>,
}

impl ScriptedDriver {
    pub fn new(page: &PageSpec) -> Self {
        let mut elements = HashMap::new();
        let mut contexts = HashMap::new();
        for (selector, matches) in &page.elements {
            let handles = matches
                .iter()
                .map(|element| {
                    contexts
                        .entry(element.handle.id.clone())
                        .or_insert_with(|| element.context.clone());
                    element.handle.clone()
                })
                .collect();
            elements.insert(selector.clone(), handles);
        }
        Self {
            source: page.source.clone(),
            screenshot: page.screenshot.as_bytes().to_vec(),
            elements,
            contexts,
            delays: page
                .delays_ms
                .iter()
                .map(|(selector, ms)| (selector.clone(), Duration::from_millis(*ms)))
                .collect(),
        }
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        if selector.trim().is_empty() {
            return Err(DriverError::InvalidSelector {
                selector: selector.to_string(),
                reason: "empty selector".to_string(),
            });
        }
        if let Some(delay) = self.delays.get(selector) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.elements.get(selector).cloned().unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        Ok(self.source.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(self.screenshot.clone())
    }

    fn element_context(&self, element: &ElementHandle) -> Result<ResolutionContext, DriverError> {
        Ok(self.contexts.get(&element.id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// Calls that reached the scripted analysis service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisCalls {
    pub structural: usize,
    pub visual: usize,
    pub rank: usize,
}

/// Analysis service answering from a fixture
pub struct ScriptedAnalysisService {
    spec: AnalysisSpec,
    structural: AtomicUsize,
    visual: AtomicUsize,
    rank: AtomicUsize,
}

impl ScriptedAnalysisService {
    pub fn new(spec: AnalysisSpec) -> Self {
        Self {
            spec,
            structural: AtomicUsize::new(0),
            visual: AtomicUsize::new(0),
            rank: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> AnalysisCalls {
        AnalysisCalls {
            structural: self.structural.load(Ordering::SeqCst),
            visual: self.visual.load(Ordering::SeqCst),
            rank: self.rank.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysisService {
    async fn analyze_structure(
        &self,
        _page_source: &str,
        _description: &str,
        _original_selector: &str,
    ) -> Result<AnalysisResult, ServiceError> {
        self.structural.fetch_add(1, Ordering::SeqCst);
        self.spec.structural.answer().await
    }

    async fn analyze_visual(
        &self,
        _screenshot: &[u8],
        _description: &str,
    ) -> Result<AnalysisResult, ServiceError> {
        self.visual.fetch_add(1, Ordering::SeqCst);
        self.spec.visual.answer().await
    }

    async fn rank_candidates(
        &self,
        candidates: &[ElementHandle],
        _description: &str,
    ) -> Result<ElementHandle, ServiceError> {
        self.rank.fetch_add(1, Ordering::SeqCst);
        let chosen = match self.spec.rank {
            RankSpec::First => candidates.first(),
            RankSpec::Last => candidates.last(),
            RankSpec::Timeout => {
                std::future::pending::<()>().await;
                None
            }
            RankSpec::Error => return Err(ServiceError::unavailable("scripted ranking failure")),
        };
        chosen
            .cloned()
            .ok_or_else(|| ServiceError::invalid("nothing to rank"))
    }

    fn name(&self) -> &str {
        "fixture-analysis"
    }

    async fn is_healthy(&self) -> bool {
        self.spec.healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
page:
  source: "<form id='login'><button class='btn-primary' type='submit'>Log in</button></form>"
  elements:
    "button.btn-primary[type=submit]":
      - id: submit
        tag: button
        text: Log in
        attributes:
          type: submit
        context:
          parent_container: form#login
    ".item":
      - id: one
      - id: two
analysis:
  structural:
    result:
      recommended_selector: "button.btn-primary[type=submit]"
      confidence: 0.95
  visual:
    error: invalid
  rank: last
requests:
  - selector: "#login-btn"
    description: login button
    repeat: 2
"##;

    #[tokio::test]
    async fn fixture_scripts_driver_and_service() {
        let fixture = PageFixture::from_yaml(PAGE).unwrap();
        assert_eq!(fixture.requests[0].selector, "#login-btn");
        assert_eq!(fixture.requests[0].repeat, 2);

        let driver = fixture.driver();
        let found = driver
            .find_elements("button.btn-primary[type=submit]")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attribute("type"), Some("submit"));
        let context = driver.element_context(&found[0]).unwrap();
        assert_eq!(context.parent_container.as_deref(), Some("form#login"));
        assert!(driver.find_elements("#login-btn").await.unwrap().is_empty());
        assert!(driver.find_elements(" ").await.is_err());

        let service = fixture.service();
        let structural = service.analyze_structure("", "", "").await.unwrap();
        assert_eq!(structural.confidence, 0.95);
        let visual = service.analyze_visual(&[], "").await.unwrap_err();
        assert!(matches!(visual, ServiceError::InvalidResponse(_)));

        let items = driver.find_elements(".item").await.unwrap();
        assert_eq!(service.rank_candidates(&items, "").await.unwrap().id, "two");
        assert_eq!(
            service.calls(),
            AnalysisCalls {
                structural: 1,
                visual: 1,
                rank: 1
            }
        );
    }

    #[tokio::test]
    async fn unscripted_service_is_unavailable() {
        let service = PageFixture::from_yaml("{}").unwrap().service();
        let err = service.analyze_structure("", "", "").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
