use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle issued by the automation driver.
///
/// The driver decides what `id` means (a node id, a webdriver reference, ...).
/// The optional fields carry whatever the driver reported at lookup time and
/// feed fingerprinting and ranking; the engine never interprets `id` itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: None,
            text: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}<{}>", self.id, tag),
            None => f.write_str(&self.id),
        }
    }
}

/// Screen-relative bounding box in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Euclidean distance between the top-left corners.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Optional neighbourhood hints for an element.
///
/// Only used to narrow cache keys and to build fingerprints. A context never
/// identifies an element without a selector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionContext {
    #[serde(default)]
    pub parent_container: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub siblings: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Computed style / attribute snapshot, when the driver can supply one.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResolutionContext {
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_container = Some(parent.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_siblings<I, S>(mut self, siblings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.siblings = siblings.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parent_container.is_none()
            && self.position.is_none()
            && self.siblings.is_empty()
            && self.text.is_none()
            && self.attributes.is_empty()
    }
}
