//! Self-healing element resolution
//!
//! This crate ties the AutoHeal engine together:
//! - Original selector probe (cheapest, no analysis)
//! - Trusted cache probe with fingerprint verification
//! - Structural and visual recovery strategies under an execution policy
//! - Disambiguation of multiple matches with a deterministic fallback
//!
//! [`ResolutionCoordinator`] is the entry point.

pub mod config;
pub mod coordinator;
pub mod disambiguator;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod request;
pub mod strategies;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::*;
pub use coordinator::*;
pub use disambiguator::*;
pub use engine::*;
pub use errors::*;
pub use metrics::*;
pub use request::*;
pub use strategies::*;
pub use types::*;
