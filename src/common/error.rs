//! Error types for the sanity-check harness
//!
//! Every variant aborts the running scenario. Messages carry the captured
//! client output where there is one, so a failed run can be diagnosed from
//! the report alone.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Environment Errors ===
    #[error("Environment failed to start ({command}): {reason}")]
    EnvironmentStartup { command: String, reason: String },

    #[error("Environment failed to stop ({command}): {reason}")]
    EnvironmentTeardown { command: String, reason: String },

    // === Health Errors ===
    #[error("Timed out after {timeout_secs}s waiting for healthcheck at '{url}'")]
    HealthcheckTimeout { url: String, timeout_secs: u64 },

    #[error("Healthcheck at '{url}' failed with a non-retryable error: {message}")]
    HealthProbe { url: String, message: String },

    // === Client Errors ===
    #[error("Dependency install '{command}' failed with exit code {exit_code:?}\n{output}")]
    DependencyInstall {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Client '{command}' failed with exit code {exit_code:?}\n{output}")]
    ClientInvocation {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Client '{command}' timed out after {timeout_secs:.1}s\n{output}")]
    ClientTimeout {
        command: String,
        timeout_secs: f64,
        output: String,
    },

    #[error("Failed to spawn '{command}': {source}")]
    ClientSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    // === Verification Errors ===
    #[error("Verification failed: {0}")]
    Verification(VerificationFailure),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a file read error from a path and the underlying io error
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Short machine-readable code, used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::EnvironmentStartup { .. } => "ENVIRONMENT_STARTUP",
            Error::EnvironmentTeardown { .. } => "ENVIRONMENT_TEARDOWN",
            Error::HealthcheckTimeout { .. } => "HEALTHCHECK_TIMEOUT",
            Error::HealthProbe { .. } => "HEALTH_PROBE",
            Error::DependencyInstall { .. } => "DEPENDENCY_INSTALL",
            Error::ClientInvocation { .. } => "CLIENT_INVOCATION",
            Error::ClientTimeout { .. } => "CLIENT_TIMEOUT",
            Error::ClientSpawn { .. } => "CLIENT_SPAWN",
            Error::Verification(_) => "VERIFICATION",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            Error::Io(_) | Error::FileRead { .. } => "IO",
            Error::Json(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<VerificationFailure> for Error {
    fn from(failure: VerificationFailure) -> Self {
        Error::Verification(failure)
    }
}

/// Structured detail for a failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationFailure {
    /// Two artifacts that should be byte-identical digest differently
    HashMismatch {
        left: PathBuf,
        right: PathBuf,
        left_digest: String,
        right_digest: String,
    },
    /// A needle expected in captured output is absent
    MissingNeedle { source: String, needle: String },
    /// A line multiset differs from its snapshot
    SnapshotMismatch {
        label: String,
        missing: BTreeMap<String, usize>,
        extra: BTreeMap<String, usize>,
    },
    /// An expected artifact (results dir, partition, snapshot) does not exist
    MissingArtifact { path: PathBuf },
    /// A pattern expected in captured output did not match
    PatternNotFound { source: String, pattern: String },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFailure::HashMismatch {
                left,
                right,
                left_digest,
                right_digest,
            } => write!(
                f,
                "'{}' ({}) does not match '{}' ({})",
                left.display(),
                left_digest,
                right.display(),
                right_digest
            ),
            VerificationFailure::MissingNeedle { source, needle } => {
                write!(f, "expected '{}' not found in {}", needle, source)
            }
            VerificationFailure::SnapshotMismatch {
                label,
                missing,
                extra,
            } => write!(
                f,
                "{} does not match snapshot. Missing: {:?} Extra: {:?}",
                label, missing, extra
            ),
            VerificationFailure::MissingArtifact { path } => {
                write!(f, "'{}' not found", path.display())
            }
            VerificationFailure::PatternNotFound { source, pattern } => {
                write!(f, "pattern '{}' not found in {}", pattern, source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_mismatch_reports_both_sides() {
        let failure = VerificationFailure::SnapshotMismatch {
            label: "partition 1".to_string(),
            missing: BTreeMap::from([("a 2".to_string(), 1)]),
            extra: BTreeMap::from([("b 1".to_string(), 2)]),
        };
        let message = Error::from(failure).to_string();
        assert!(message.contains("partition 1"));
        assert!(message.contains("\"a 2\": 1"));
        assert!(message.contains("\"b 1\": 2"));
    }

    #[test]
    fn test_codes_are_distinct_for_environment_errors() {
        let up = Error::EnvironmentStartup {
            command: "docker compose up".to_string(),
            reason: "exit code 1".to_string(),
        };
        let down = Error::EnvironmentTeardown {
            command: "docker compose down".to_string(),
            reason: "exit code 1".to_string(),
        };
        assert_ne!(up.code(), down.code());
    }
}
