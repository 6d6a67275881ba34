//! Resolution requests and per-request options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use autoheal_core_types::{AutomationDriver, RequestId, ResolutionContext};
use serde::{Deserialize, Serialize};

use crate::errors::LocatorError;

/// Per-request knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorOptions {
    /// Upper bound for one healing strategy attempt
    pub timeout_ms: u64,
    pub enable_caching: bool,
    pub enable_visual_analysis: bool,
    /// Minimum confidence a proposed selector needs to be tried
    pub confidence_threshold: f64,
    pub max_candidates: usize,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            enable_caching: true,
            enable_visual_analysis: true,
            confidence_threshold: 0.7,
            max_candidates: 5,
        }
    }
}

impl LocatorOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), LocatorError> {
        if self.timeout_ms == 0 {
            return Err(LocatorError::InvalidRequest(
                "timeout_ms must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(LocatorError::InvalidRequest(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_candidates == 0 {
            return Err(LocatorError::InvalidRequest(
                "max_candidates must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One element to resolve against one live page.
///
/// Only [`ResolutionRequestBuilder::build`] creates one, so a request always
/// carries validated options and cannot change afterwards.
#[derive(Clone)]
pub struct ResolutionRequest {
    pub(crate) id: RequestId,
    pub(crate) selector: String,
    pub(crate) description: String,
    pub(crate) options: LocatorOptions,
    pub(crate) context: ResolutionContext,
    pub(crate) driver: Arc<dyn AutomationDriver>,
}

impl ResolutionRequest {
    pub fn builder(
        selector: impl Into<String>,
        description: impl Into<String>,
        driver: Arc<dyn AutomationDriver>,
    ) -> ResolutionRequestBuilder {
        ResolutionRequestBuilder {
            selector: selector.into(),
            description: description.into(),
            driver,
            options: LocatorOptions::default(),
            context: ResolutionContext::default(),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn options(&self) -> &LocatorOptions {
        &self.options
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    pub fn driver(&self) -> &Arc<dyn AutomationDriver> {
        &self.driver
    }
}

impl fmt::Debug for ResolutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionRequest")
            .field("id", &self.id)
            .field("selector", &self.selector)
            .field("description", &self.description)
            .field("options", &self.options)
            .field("context", &self.context)
            .field("driver", &self.driver.name())
            .finish()
    }
}

pub struct ResolutionRequestBuilder {
    selector: String,
    description: String,
    driver: Arc<dyn AutomationDriver>,
    options: LocatorOptions,
    context: ResolutionContext,
}

impl ResolutionRequestBuilder {
    pub fn options(mut self, options: LocatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(mut self, context: ResolutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Result<ResolutionRequest, LocatorError> {
        if self.selector.trim().is_empty() {
            return Err(LocatorError::InvalidRequest("selector must not be blank".into()));
        }
        self.options.validate()?;
        Ok(ResolutionRequest {
            id: RequestId::new(),
            selector: self.selector,
            description: self.description,
            options: self.options,
            context: self.context,
            driver: self.driver,
        })
    }
}
