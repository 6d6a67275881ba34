use std::fmt;

use autoheal_core_types::ResolutionContext;
use serde::{Deserialize, Serialize};

const SEPARATOR: char = '|';

/// Deterministic cache key for one (selector, description, context) triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey {
    raw: String,
}

impl CacheKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Builds the contextual key.
///
/// Layout: `selector|description[|parent:<id>][|pos:<x>,<y>][|siblings:<a,b>]`.
/// Positions are rounded to whole pixels so sub-pixel layout jitter maps to the
/// same key. Context text and attributes never take part in the key.
pub fn build_key(selector: &str, description: &str, context: &ResolutionContext) -> CacheKey {
    let mut raw = String::with_capacity(selector.len() + description.len() + 16);
    raw.push_str(selector);
    raw.push(SEPARATOR);
    raw.push_str(description);

    if let Some(parent) = context.parent_container.as_deref().filter(|p| !p.is_empty()) {
        raw.push(SEPARATOR);
        raw.push_str("parent:");
        raw.push_str(parent);
    }
    if let Some(pos) = &context.position {
        raw.push(SEPARATOR);
        raw.push_str(&format!("pos:{},{}", pos.x.round() as i64, pos.y.round() as i64));
    }
    if !context.siblings.is_empty() {
        raw.push(SEPARATOR);
        raw.push_str("siblings:");
        raw.push_str(&context.siblings.join(","));
    }

    CacheKey { raw }
}
