//! `{name}` substitution in scenario strings
//!
//! Variables come from the scenario definition and from `extract` steps.
//! Referencing a variable that has no value is an error rather than an
//! empty string, so a typo never silently turns into a wrong path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::client::ClientInvocation;
use crate::common::{Error, Result};
use crate::verify::VerificationRule;

use super::config::Operation;

const PLACEHOLDER: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Variable values plus the placeholder matcher
#[derive(Debug, Clone)]
pub struct Vars {
    values: BTreeMap<String, String>,
    placeholder: Regex,
}

impl Vars {
    pub fn new(values: BTreeMap<String, String>) -> Result<Self> {
        let placeholder = Regex::new(PLACEHOLDER)
            .map_err(|e| Error::Config(format!("Invalid placeholder pattern: {}", e)))?;
        Ok(Self {
            values,
            placeholder,
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Substitute every `{name}` in `text`
    pub fn expand(&self, text: &str) -> Result<String> {
        let mut unknown = None;
        let expanded = self.placeholder.replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match self.values.get(name) {
                Some(value) => value.clone(),
                None => {
                    unknown.get_or_insert_with(|| name.to_string());
                    caps[0].to_string()
                }
            }
        });

        match unknown {
            Some(name) => Err(Error::Config(format!(
                "Unknown variable '{{{}}}' in '{}'",
                name, text
            ))),
            None => Ok(expanded.into_owned()),
        }
    }

    pub fn expand_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(PathBuf::from(self.expand(&path.to_string_lossy())?))
    }

    fn expand_all(&self, items: &[String]) -> Result<Vec<String>> {
        items.iter().map(|item| self.expand(item)).collect()
    }
}

/// Values that can have their variables substituted
pub trait Expand: Sized {
    fn expand(&self, vars: &Vars) -> Result<Self>;
}

impl Expand for ClientInvocation {
    fn expand(&self, vars: &Vars) -> Result<Self> {
        Ok(ClientInvocation {
            program: vars.expand(&self.program)?,
            args: vars.expand_all(&self.args)?,
            stdin: self.stdin.as_deref().map(|s| vars.expand(s)).transpose()?,
            timeout_secs: self.timeout_secs,
            allow_partial: self.allow_partial,
            working_dir: self
                .working_dir
                .as_deref()
                .map(|p| vars.expand_path(p))
                .transpose()?,
        })
    }
}

impl Expand for Operation {
    fn expand(&self, vars: &Vars) -> Result<Self> {
        Ok(match self {
            Operation::Invoke { run, capture } => Operation::Invoke {
                run: run.expand(vars)?,
                capture: capture.clone(),
            },
            Operation::Drain {
                run,
                window_secs,
                capture,
            } => Operation::Drain {
                run: run.expand(vars)?,
                window_secs: *window_secs,
                capture: capture.clone(),
            },
            Operation::Sleep { .. } => self.clone(),
            Operation::RemoveFile { path } => Operation::RemoveFile {
                path: vars.expand_path(path)?,
            },
            // the pattern is a regex; braces there are quantifiers
            Operation::Extract { .. } => self.clone(),
        })
    }
}

impl Expand for VerificationRule {
    fn expand(&self, vars: &Vars) -> Result<Self> {
        Ok(match self {
            VerificationRule::HashEquality {
                left,
                right,
                algorithm,
                chunk_size,
            } => VerificationRule::HashEquality {
                left: vars.expand_path(left)?,
                right: vars.expand_path(right)?,
                algorithm: *algorithm,
                chunk_size: *chunk_size,
            },
            VerificationRule::Containment { capture, needles } => VerificationRule::Containment {
                capture: capture.clone(),
                needles: vars.expand_all(needles)?,
            },
            VerificationRule::SnapshotMultisetEquality { actual, expected } => {
                VerificationRule::SnapshotMultisetEquality {
                    actual: vars.expand_path(actual)?,
                    expected: vars.expand_path(expected)?,
                }
            }
            VerificationRule::PartitionSnapshots {
                results_dir,
                partitions,
                snapshot_dir,
            } => VerificationRule::PartitionSnapshots {
                results_dir: vars.expand_path(results_dir)?,
                partitions: *partitions,
                snapshot_dir: vars.expand_path(snapshot_dir)?,
            },
        })
    }
}
