//! Similarity-comparable element descriptors.
//!
//! A fingerprint is captured right after an element was found and stored with
//! the cache entry. On later cache hits the live element is fingerprinted again
//! and compared, so a selector that now points at a different logical element
//! can be rejected even though it still matches something.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::element::{ElementHandle, Position, ResolutionContext};

const PARENT_WEIGHT: f64 = 0.3;
const POSITION_WEIGHT: f64 = 0.2;
const TEXT_WEIGHT: f64 = 0.3;
const STYLE_WEIGHT: f64 = 0.2;

/// Pixels of drift at which position similarity bottoms out.
const POSITION_FALLOFF_PX: f64 = 1000.0;
/// Bucket size for the coarse visual hash.
const VISUAL_BUCKET_PX: f64 = 50.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementFingerprint {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub parent_chain: Option<String>,
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
    #[serde(default)]
    pub nearby: Vec<String>,
    #[serde(default)]
    pub visual_hash: String,
}

impl ElementFingerprint {
    /// Builds a fingerprint from a driver handle and the context the driver
    /// reported for it.
    pub fn capture(element: &ElementHandle, context: &ResolutionContext) -> Self {
        let mut styles = context.attributes.clone();
        for (name, value) in &element.attributes {
            styles.entry(name.clone()).or_insert_with(|| value.clone());
        }

        let text = element
            .text
            .clone()
            .or_else(|| context.text.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let visual_hash = coarse_visual_hash(element.tag.as_deref(), context.position.as_ref());

        Self {
            tag: element.tag.clone(),
            element_id: element.attribute("id").map(str::to_string),
            class: element.attribute("class").map(str::to_string),
            text,
            position: context.position,
            parent_chain: context.parent_container.clone(),
            styles,
            nearby: context.siblings.clone(),
            visual_hash,
        }
    }

    /// Weighted blend of ancestry, position, text and style similarity.
    ///
    /// Always in `[0, 1]`; identical fingerprints score exactly `1.0`.
    pub fn similarity(&self, other: &ElementFingerprint) -> f64 {
        if self == other {
            return 1.0;
        }
        let score = PARENT_WEIGHT
            * optional_text_similarity(self.parent_chain.as_deref(), other.parent_chain.as_deref())
            + POSITION_WEIGHT * position_similarity(self.position.as_ref(), other.position.as_ref())
            + TEXT_WEIGHT * optional_text_similarity(self.text.as_deref(), other.text.as_deref())
            + STYLE_WEIGHT * style_similarity(&self.identity_map(), &other.identity_map());
        score.clamp(0.0, 1.0)
    }

    fn identity_map(&self) -> BTreeMap<String, String> {
        let mut map = self.styles.clone();
        if let Some(tag) = &self.tag {
            map.insert("tag".to_string(), tag.to_ascii_lowercase());
        }
        if let Some(id) = &self.element_id {
            map.insert("id".to_string(), id.clone());
        }
        if let Some(class) = &self.class {
            map.insert("class".to_string(), class.clone());
        }
        map
    }
}

fn optional_text_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (None, None) => 1.0,
        (Some(a), Some(b)) => strsim::normalized_levenshtein(a, b),
        _ => 0.0,
    }
}

fn position_similarity(a: Option<&Position>, b: Option<&Position>) -> f64 {
    match (a, b) {
        (None, None) => 1.0,
        (Some(a), Some(b)) => (1.0 - a.distance(b) / POSITION_FALLOFF_PX).max(0.0),
        _ => 0.0,
    }
}

fn style_similarity(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    let matching = keys
        .iter()
        .filter(|key| a.get(**key) == b.get(**key))
        .count();
    matching as f64 / keys.len() as f64
}

fn coarse_visual_hash(tag: Option<&str>, position: Option<&Position>) -> String {
    let tag = tag.unwrap_or("*").to_ascii_lowercase();
    match position {
        Some(pos) => format!(
            "{}@{}x{}:{}x{}",
            tag,
            (pos.x / VISUAL_BUCKET_PX).floor() as i64,
            (pos.y / VISUAL_BUCKET_PX).floor() as i64,
            (pos.width / VISUAL_BUCKET_PX).ceil() as i64,
            (pos.height / VISUAL_BUCKET_PX).ceil() as i64
        ),
        None => tag,
    }
}
