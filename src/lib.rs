//! AutoHeal command line
//!
//! Exposes modules for integration testing

pub mod cli;
pub mod fixture;

pub use fixture::{PageFixture, ScriptedAnalysisService, ScriptedDriver};
