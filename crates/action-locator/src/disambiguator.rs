//! Choosing one element when a selector matches several

use std::sync::Arc;
use std::time::Duration;

use autoheal_core_types::{AnalysisService, ElementHandle};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::LocatorError;
use crate::metrics::LocatorMetrics;

/// Picks the intended element out of several matches.
///
/// Ranking failures never fail the resolution: the first element in host
/// order is returned instead and the fallback is counted.
pub struct Disambiguator {
    service: Arc<dyn AnalysisService>,
    timeout: Duration,
    metrics: Arc<LocatorMetrics>,
}

impl Disambiguator {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        timeout: Duration,
        metrics: Arc<LocatorMetrics>,
    ) -> Self {
        Self {
            service,
            timeout,
            metrics,
        }
    }

    pub async fn pick(
        &self,
        mut candidates: Vec<ElementHandle>,
        description: &str,
    ) -> Result<ElementHandle, LocatorError> {
        if candidates.len() <= 1 {
            return candidates.pop().ok_or(LocatorError::NoCandidates);
        }

        debug!(count = candidates.len(), description, "Disambiguating matches");
        let outcome = match timeout(
            self.timeout,
            self.service.rank_candidates(&candidates, description),
        )
        .await
        {
            Ok(Ok(chosen)) if candidates.contains(&chosen) => return Ok(chosen),
            Ok(Ok(chosen)) => LocatorError::DisambiguationInconclusive(format!(
                "ranked element '{}' is not among the matches",
                chosen.id
            )),
            Ok(Err(err)) => LocatorError::DisambiguationInconclusive(err.to_string()),
            Err(_) => {
                self.metrics.record_timeout();
                LocatorError::DisambiguationInconclusive(format!(
                    "ranking timed out after {:?}",
                    self.timeout
                ))
            }
        };

        self.metrics.record_inconclusive_disambiguation();
        warn!(error = %outcome, "Falling back to first match in host order");
        Ok(candidates.swap_remove(0))
    }
}
