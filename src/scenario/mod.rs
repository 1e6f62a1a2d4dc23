//! Scenario definitions and the runner that executes them
//!
//! Scenarios come from the built-in catalog or from YAML files.

pub mod catalog;
pub mod config;
pub mod runner;
pub mod template;

pub use catalog::SystemKind;
pub use config::{Operation, Scenario};
pub use runner::{run_scenario, OutcomeReport, RunOptions, TestOutcome};
