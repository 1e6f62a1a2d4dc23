//! Sanity checks - end-to-end verification of containerized systems
//!
//! Starts a system under test with compose, waits for its health endpoints,
//! drives its command-line clients, checks their artifacts, and always tears
//! the system down again.

pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod environment;
pub mod health;
pub mod mapreduce;
pub mod scenario;
pub mod verify;

// Re-export commonly used types for tests
pub use common::{Error, Result, VerificationFailure};
pub use scenario::{Scenario, TestOutcome};
