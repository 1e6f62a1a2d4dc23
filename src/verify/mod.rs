//! Verifier
//!
//! Deterministic checks over captured artifacts: byte-exact file hashes,
//! substring containment in client output, and multiset comparison of
//! result lines against golden snapshots.

pub mod contains;
pub mod hash;
pub mod snapshot;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
pub use hash::{HashAlgorithm, DEFAULT_CHUNK_SIZE};

pub use contains::containment;
pub use hash::{file_digest, hash_equality, verify_hash_equality};
pub use snapshot::{multiset_diff, verify_partitions, verify_snapshot_file, MultisetDiff};

/// The check that decides whether a scenario passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum VerificationRule {
    /// Both files must be byte-identical
    HashEquality {
        left: PathBuf,
        right: PathBuf,
        #[serde(default)]
        algorithm: HashAlgorithm,
        #[serde(default = "default_chunk_size")]
        chunk_size: usize,
    },
    /// Every needle must occur in the output captured under `capture`
    Containment { capture: String, needles: Vec<String> },
    /// Two files must hold the same multiset of lines
    SnapshotMultisetEquality { actual: PathBuf, expected: PathBuf },
    /// Files `0..partitions` in `results_dir` must each match the same-named
    /// file in `snapshot_dir`
    PartitionSnapshots {
        results_dir: PathBuf,
        partitions: u32,
        snapshot_dir: PathBuf,
    },
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl VerificationRule {
    /// Run the check
    ///
    /// `captured` looks up client output by capture name.
    pub fn verify<'a, F>(&self, captured: F) -> Result<()>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        match self {
            VerificationRule::HashEquality {
                left,
                right,
                algorithm,
                chunk_size,
            } => verify_hash_equality(left, right, *algorithm, *chunk_size),
            VerificationRule::Containment { capture, needles } => {
                let text = captured(capture).ok_or_else(|| {
                    Error::Config(format!("No client output was captured as '{}'", capture))
                })?;
                containment(text, needles, &format!("'{}' output", capture))
            }
            VerificationRule::SnapshotMultisetEquality { actual, expected } => {
                verify_snapshot_file(actual, expected, &actual.display().to_string())
            }
            VerificationRule::PartitionSnapshots {
                results_dir,
                partitions,
                snapshot_dir,
            } => verify_partitions(results_dir, *partitions, snapshot_dir),
        }
    }

    /// One-line summary for progress output
    pub fn describe(&self) -> String {
        match self {
            VerificationRule::HashEquality { left, right, .. } => {
                format!("{} == {}", left.display(), right.display())
            }
            VerificationRule::Containment { capture, needles } => {
                format!("'{}' output contains {:?}", capture, needles)
            }
            VerificationRule::SnapshotMultisetEquality { actual, expected } => {
                format!("{} matches {}", actual.display(), expected.display())
            }
            VerificationRule::PartitionSnapshots {
                results_dir,
                partitions,
                snapshot_dir,
            } => format!(
                "{} partitions of {} match {}",
                partitions,
                results_dir.display(),
                snapshot_dir.display()
            ),
        }
    }
}
