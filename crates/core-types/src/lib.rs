//! Shared primitives for the AutoHeal resolution engine.
//!
//! The data model (element handles, neighbourhood hints, fingerprints and
//! analysis results) lives here together with the two collaborator ports the
//! engine consumes: the automation driver and the analysis service.

pub mod analysis;
pub mod element;
pub mod errors;
pub mod fingerprint;
pub mod ports;

pub use analysis::{AlternativeSelector, AnalysisResult, ResolutionStrategyTag};
pub use element::{ElementHandle, Position, ResolutionContext};
pub use errors::{DriverError, ServiceError};
pub use fingerprint::ElementFingerprint;
pub use ports::{AnalysisService, AutomationDriver};

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id attached to every resolution for log stitching.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.0);
    }
}
