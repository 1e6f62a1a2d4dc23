//! Scenario definition types
//!
//! A scenario is plain data: built by the catalog for the known systems, or
//! deserialized from a YAML file for anything else.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::client::ClientInvocation;
use crate::common::{Error, Result};
use crate::environment::EnvironmentDescriptor;
use crate::health::HealthEndpoint;
use crate::verify::VerificationRule;

/// One end-to-end check of one system under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// How the system under test is started and stopped
    pub environment: EnvironmentDescriptor,
    /// Endpoints that must be healthy before any client runs
    #[serde(default)]
    pub health: Vec<HealthEndpoint>,
    /// Installs for the client programs, run once the system is healthy
    #[serde(default)]
    pub dependencies: Vec<ClientInvocation>,
    /// Values substituted for `{name}` in steps and the verification rule
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Client operations, in order
    #[serde(default)]
    pub steps: Vec<Operation>,
    /// The check deciding whether the scenario passed
    pub verify: VerificationRule,
}

/// A single client-side step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Operation {
    /// Run a client to completion
    Invoke {
        run: ClientInvocation,
        /// Keep the output under this name for later steps and verification
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<String>,
    },
    /// Run a never-ending client for a fixed window, then stop it
    Drain {
        run: ClientInvocation,
        window_secs: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<String>,
    },
    /// Give the system time to settle
    Sleep {
        secs: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Delete a stale local artifact if present
    RemoveFile { path: PathBuf },
    /// Copy the first group of `pattern` in a captured output into a variable
    Extract {
        from: String,
        pattern: String,
        into: String,
    },
}

impl Operation {
    /// Short label for progress output
    pub fn describe(&self) -> String {
        match self {
            Operation::Invoke { run, .. } => run.command_line(),
            Operation::Drain {
                run, window_secs, ..
            } => format!("drain {} for {}s", run.command_line(), window_secs),
            Operation::Sleep { secs, reason } => match reason {
                Some(reason) => format!("sleep {}s ({})", secs, reason),
                None => format!("sleep {}s", secs),
            },
            Operation::RemoveFile { path } => format!("remove {}", path.display()),
            Operation::Extract { from, into, .. } => format!("extract {} from '{}' output", into, from),
        }
    }
}

impl Scenario {
    /// Load and parse a YAML scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read scenario '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse scenario: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("Failed to serialize scenario: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG_SCENARIO: &str = r#"
name: log
description: Produce three records and read them back
environment:
  kind: compose
  file: ./projects/4-kafka/docker-compose.yml
health:
  - base_url: http://localhost:8001
  - base_url: http://localhost:8002
    expected_status: 204
vars:
  topic: 0f3c
steps:
  - action: sleep
    secs: 10
    reason: leader election
  - action: invoke
    run:
      program: python3
      args: [produce.py, "{topic}"]
      stdin: "samekey\npayload1\n\n"
      timeout_secs: 20
    capture: produce
  - action: drain
    run:
      program: python3
      args: ["-u", consume.py, "{topic}-1"]
    window_secs: 5
    capture: consume
verify:
  rule: containment
  capture: consume
  needles: [payload1]
"#;

    #[test]
    fn test_parse_log_scenario() {
        let scenario = Scenario::from_yaml(LOG_SCENARIO).unwrap();
        assert_eq!(scenario.name, "log");
        assert_eq!(scenario.health.len(), 2);
        assert_eq!(scenario.health[0].expected_status, 200);
        assert_eq!(scenario.health[1].expected_status, 204);
        assert_eq!(scenario.steps.len(), 3);
        assert!(matches!(
            scenario.environment,
            EnvironmentDescriptor::Compose { build: true, .. }
        ));

        match &scenario.steps[1] {
            Operation::Invoke { run, capture } => {
                assert_eq!(run.timeout_secs, Some(20.0));
                assert_eq!(run.stdin.as_deref(), Some("samekey\npayload1\n\n"));
                assert_eq!(capture.as_deref(), Some("produce"));
            }
            other => panic!("Expected Invoke, got {other:?}"),
        }
    }

    #[test]
    fn test_yaml_round_trip_preserves_scenario() {
        let scenario = Scenario::from_yaml(LOG_SCENARIO).unwrap();
        let reparsed = Scenario::from_yaml(&scenario.to_yaml().unwrap()).unwrap();
        assert_eq!(scenario, reparsed);
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let err = Scenario::from_yaml(
            "name: x\nenvironment: {kind: external}\nsteps:\n  - action: teleport\nverify: {rule: containment, capture: a, needles: []}\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_describe_operations() {
        let op = Operation::Sleep {
            secs: 5.0,
            reason: Some("propagation".to_string()),
        };
        assert_eq!(op.describe(), "sleep 5s (propagation)");
    }
}
