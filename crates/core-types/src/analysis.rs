use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A secondary selector proposed by the analysis service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlternativeSelector {
    pub selector: String,
    pub confidence: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl AlternativeSelector {
    pub fn new(selector: impl Into<String>, confidence: f64) -> Self {
        Self {
            selector: selector.into(),
            confidence: clamp_confidence(confidence),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Answer from a structural or visual analysis call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub recommended_selector: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<AlternativeSelector>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl AnalysisResult {
    pub fn new(recommended_selector: impl Into<String>, confidence: f64) -> Self {
        Self {
            recommended_selector: recommended_selector.into(),
            confidence: clamp_confidence(confidence),
            reasoning: String::new(),
            alternatives: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_alternative(mut self, alternative: AlternativeSelector) -> Self {
        self.alternatives.push(alternative);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Recommended selector plus alternatives, best first.
    ///
    /// The sort is stable and the recommended selector is inserted first, so it
    /// wins ties. Blank and duplicate selectors are dropped.
    pub fn ranked_candidates(&self) -> Vec<AlternativeSelector> {
        let mut seen = HashSet::new();
        let mut ranked: Vec<AlternativeSelector> =
            std::iter::once(AlternativeSelector {
                selector: self.recommended_selector.clone(),
                confidence: self.confidence,
                description: Some(self.reasoning.clone()).filter(|r| !r.is_empty()),
            })
            .chain(self.alternatives.iter().cloned())
            .filter(|candidate| !candidate.selector.trim().is_empty())
            .filter(|candidate| seen.insert(candidate.selector.clone()))
            .collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }
}

/// How a resolution was ultimately satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategyTag {
    OriginalSelector,
    Cached,
    StructuralAnalysis,
    VisualAnalysis,
    Hybrid,
}

impl ResolutionStrategyTag {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionStrategyTag::OriginalSelector => "ORIGINAL_SELECTOR",
            ResolutionStrategyTag::Cached => "CACHED",
            ResolutionStrategyTag::StructuralAnalysis => "STRUCTURAL_ANALYSIS",
            ResolutionStrategyTag::VisualAnalysis => "VISUAL_ANALYSIS",
            ResolutionStrategyTag::Hybrid => "HYBRID",
        }
    }

    /// Whether the tag denotes a healed (analysis-derived) result.
    pub fn is_healed(&self) -> bool {
        matches!(
            self,
            ResolutionStrategyTag::StructuralAnalysis
                | ResolutionStrategyTag::VisualAnalysis
                | ResolutionStrategyTag::Hybrid
        )
    }
}

impl fmt::Display for ResolutionStrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
