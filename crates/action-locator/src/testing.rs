//! In-memory driver and analysis service for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autoheal_core_types::{
    AnalysisResult, AnalysisService, AutomationDriver, DriverError, ElementHandle,
    ResolutionContext, ServiceError,
};
use parking_lot::Mutex;

#[derive(Default)]
pub struct FakeDriver {
    matches: Mutex<HashMap<String, Vec<ElementHandle>>>,
    delays: HashMap<String, Duration>,
    contexts: HashMap<String, ResolutionContext>,
    lookups: Mutex<Vec<String>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match(self, selector: &str, ids: &[&str]) -> Self {
        self.set_matches(selector, ids);
        self
    }

    pub fn with_delay(mut self, selector: &str, delay: Duration) -> Self {
        self.delays.insert(selector.to_string(), delay);
        self
    }

    pub fn with_context(mut self, id: &str, context: ResolutionContext) -> Self {
        self.contexts.insert(id.to_string(), context);
        self
    }

    /// Changes the live page between resolutions.
    pub fn set_matches(&self, selector: &str, ids: &[&str]) {
        let handles = ids
            .iter()
            .map(|id| ElementHandle::new(*id).with_tag("button"))
            .collect();
        self.matches.lock().insert(selector.to_string(), handles);
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }

    pub fn lookup_count(&self, selector: &str) -> usize {
        self.lookups.lock().iter().filter(|s| *s == selector).count()
    }
}

#[async_trait]
impl AutomationDriver for FakeDriver {
    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.lookups.lock().push(selector.to_string());
        if let Some(delay) = self.delays.get(selector) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.matches.lock().get(selector).cloned().unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        Ok("<html><body><form><button class='btn-primary' type='submit'>Log in</button></form></body></html>".into())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    fn element_context(&self, element: &ElementHandle) -> Result<ResolutionContext, DriverError> {
        Ok(self.contexts.get(&element.id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Clone)]
pub enum Reply {
    Result(AnalysisResult),
    Fail(ServiceError),
    Slow(Duration, AnalysisResult),
}

impl Reply {
    pub fn ok(selector: &str, confidence: f64) -> Self {
        Reply::Result(AnalysisResult::new(selector, confidence))
    }
}

pub struct FakeService {
    structural: Reply,
    visual: Reply,
    rank_delay: Option<Duration>,
    pub structural_calls: AtomicUsize,
    pub visual_calls: AtomicUsize,
    pub rank_calls: AtomicUsize,
}

impl FakeService {
    pub fn new(structural: Reply, visual: Reply) -> Self {
        Self {
            structural,
            visual,
            rank_delay: None,
            structural_calls: AtomicUsize::new(0),
            visual_calls: AtomicUsize::new(0),
            rank_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::new(
            Reply::Fail(ServiceError::unavailable("down")),
            Reply::Fail(ServiceError::unavailable("down")),
        )
    }

    /// Ranking never answers before the caller gives up.
    pub fn with_hanging_rank(mut self) -> Self {
        self.rank_delay = Some(Duration::from_secs(3600));
        self
    }

    pub fn structural_calls(&self) -> usize {
        self.structural_calls.load(Ordering::SeqCst)
    }

    pub fn visual_calls(&self) -> usize {
        self.visual_calls.load(Ordering::SeqCst)
    }

    pub fn rank_calls(&self) -> usize {
        self.rank_calls.load(Ordering::SeqCst)
    }

    pub fn analysis_calls(&self) -> usize {
        self.structural_calls() + self.visual_calls() + self.rank_calls()
    }

    async fn answer(reply: Reply) -> Result<AnalysisResult, ServiceError> {
        match reply {
            Reply::Result(result) => Ok(result),
            Reply::Fail(err) => Err(err),
            Reply::Slow(delay, result) => {
                tokio::time::sleep(delay).await;
                Ok(result)
            }
        }
    }
}

#[async_trait]
impl AnalysisService for FakeService {
    async fn analyze_structure(
        &self,
        _page_source: &str,
        _description: &str,
        _original_selector: &str,
    ) -> Result<AnalysisResult, ServiceError> {
        self.structural_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.structural.clone();
        Self::answer(reply).await
    }

    async fn analyze_visual(
        &self,
        _screenshot: &[u8],
        _description: &str,
    ) -> Result<AnalysisResult, ServiceError> {
        self.visual_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.visual.clone();
        Self::answer(reply).await
    }

    async fn rank_candidates(
        &self,
        candidates: &[ElementHandle],
        _description: &str,
    ) -> Result<ElementHandle, ServiceError> {
        self.rank_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.rank_delay {
            tokio::time::sleep(delay).await;
        }
        candidates
            .last()
            .cloned()
            .ok_or_else(|| ServiceError::invalid("nothing to rank"))
    }

    fn name(&self) -> &str {
        "fake-analysis"
    }
}
