//! Core types for the resolution pipeline

use std::time::Duration;

use autoheal_core_types::{ElementHandle, RequestId, ResolutionStrategyTag};
use serde::{Deserialize, Serialize, Serializer};

/// Recovery strategy enumeration
///
/// Declaration order is the default fallback order: structural analysis of
/// the page source first, visual analysis of a screenshot second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Structural,
    Visual,
}

impl StrategyKind {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Structural => "structural",
            StrategyKind::Visual => "visual",
        }
    }

    /// Tag reported when this strategy alone produced the result
    pub fn tag(&self) -> ResolutionStrategyTag {
        match self {
            StrategyKind::Structural => ResolutionStrategyTag::StructuralAnalysis,
            StrategyKind::Visual => ResolutionStrategyTag::VisualAnalysis,
        }
    }

    /// Relative cost, cheapest first
    pub fn cost_rank(&self) -> u8 {
        match self {
            StrategyKind::Structural => 0,
            StrategyKind::Visual => 1,
        }
    }

    /// Estimated spend per analysis call, in micro-dollars
    pub fn estimated_cost_micros(&self) -> u64 {
        match self {
            StrategyKind::Structural => 20_000,
            StrategyKind::Visual => 100_000,
        }
    }
}

/// Selector candidate proposed by a recovery strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub selector: String,

    /// Strategy used to find this candidate
    pub strategy: StrategyKind,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    pub reasoning: Option<String>,
}

impl Candidate {
    pub fn new(selector: impl Into<String>, strategy: StrategyKind, confidence: f64) -> Self {
        Self {
            selector: selector.into(),
            strategy,
            confidence,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Check if the candidate meets a confidence threshold
    pub fn meets(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

/// Outcome of one successful resolution
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionResult {
    pub request_id: RequestId,
    pub element: ElementHandle,
    /// Selector that actually matched
    pub selector: String,
    pub strategy: ResolutionStrategyTag,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub from_cache: bool,
    pub confidence: f64,
    pub reasoning: String,
}

impl ResolutionResult {
    pub fn is_healed(&self) -> bool {
        self.strategy.is_healed()
    }
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_tags_and_costs() {
        assert_eq!(
            StrategyKind::Structural.tag(),
            ResolutionStrategyTag::StructuralAnalysis
        );
        assert_eq!(StrategyKind::Visual.tag(), ResolutionStrategyTag::VisualAnalysis);
        assert!(StrategyKind::Structural.cost_rank() < StrategyKind::Visual.cost_rank());
    }

    #[test]
    fn result_serializes_duration_as_millis() {
        let result = ResolutionResult {
            request_id: RequestId("r-1".into()),
            element: ElementHandle::new("n1"),
            selector: "#a".into(),
            strategy: ResolutionStrategyTag::Cached,
            duration: Duration::from_millis(42),
            from_cache: true,
            confidence: 1.0,
            reasoning: String::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_ms"], 42);
        assert_eq!(json["strategy"], "CACHED");
        assert!(!result.is_healed());
    }
}
