//! Multiset comparison against golden snapshots
//!
//! Partitioned outputs come back in no particular order, so lines are
//! compared as multisets: duplicates count, order does not. Blank lines and
//! surrounding whitespace are ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result, VerificationFailure};

/// Occurrence count per distinct line
pub type LineCounts = BTreeMap<String, usize>;

/// Difference between two line multisets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultisetDiff {
    /// Lines expected more often than they occurred (expected − actual)
    pub missing: LineCounts,
    /// Lines that occurred more often than expected (actual − expected)
    pub extra: LineCounts,
}

impl MultisetDiff {
    pub fn is_equal(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    /// Turn a difference into a verification error labelled `label`
    pub fn into_result(self, label: &str) -> Result<()> {
        if self.is_equal() {
            return Ok(());
        }
        Err(VerificationFailure::SnapshotMismatch {
            label: label.to_string(),
            missing: self.missing,
            extra: self.extra,
        }
        .into())
    }
}

/// Count non-empty trimmed lines
pub fn line_counts<'a>(lines: impl IntoIterator<Item = &'a str>) -> LineCounts {
    let mut counts = LineCounts::new();
    for line in lines.into_iter().map(str::trim).filter(|l| !l.is_empty()) {
        *counts.entry(line.to_string()).or_default() += 1;
    }
    counts
}

/// Compare two texts line by line as multisets
pub fn multiset_diff(actual: &str, expected: &str) -> MultisetDiff {
    diff_counts(&line_counts(actual.lines()), &line_counts(expected.lines()))
}

fn diff_counts(actual: &LineCounts, expected: &LineCounts) -> MultisetDiff {
    MultisetDiff {
        missing: subtract(expected, actual),
        extra: subtract(actual, expected),
    }
}

/// Multiset difference, keeping only positive counts
fn subtract(left: &LineCounts, right: &LineCounts) -> LineCounts {
    left.iter()
        .filter_map(|(line, &count)| {
            let remaining = count.saturating_sub(right.get(line).copied().unwrap_or(0));
            (remaining > 0).then(|| (line.clone(), remaining))
        })
        .collect()
}

/// Compare a result file with its snapshot file
pub fn verify_snapshot_file(actual: &Path, expected: &Path, label: &str) -> Result<()> {
    let actual_text = read_artifact(actual)?;
    let expected_text = read_artifact(expected)?;

    let diff = multiset_diff(&actual_text, &expected_text);
    if !diff.is_equal() {
        tracing::error!(
            "{} mismatch. Missing: {:?} Extra: {:?}",
            label,
            diff.missing,
            diff.extra
        );
    }
    diff.into_result(label)
}

/// Verify a partitioned result directory against a snapshot directory
///
/// Partition files are named by their zero-based index. The results
/// directory and every partition must exist before any content is compared;
/// partitions are then compared in index order and the first mismatch fails.
pub fn verify_partitions(results_dir: &Path, partitions: u32, snapshot_dir: &Path) -> Result<()> {
    if !results_dir.is_dir() {
        return Err(missing(results_dir.to_path_buf()));
    }

    let partition_paths: Vec<(u32, PathBuf)> = (0..partitions)
        .map(|index| (index, results_dir.join(index.to_string())))
        .collect();
    for (_, path) in &partition_paths {
        if !path.exists() {
            return Err(missing(path.clone()));
        }
    }
    tracing::info!("Found results folder: {}", results_dir.display());

    for (index, path) in &partition_paths {
        let snapshot = snapshot_dir.join(index.to_string());
        if !snapshot.is_file() {
            return Err(missing(snapshot));
        }
        verify_snapshot_file(path, &snapshot, &format!("Partition {}", index))?;
        tracing::info!("Partition {} matches snapshot", index);
    }

    Ok(())
}

fn read_artifact(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => missing(path.to_path_buf()),
        _ => Error::file_read(path, &e),
    })
}

fn missing(path: PathBuf) -> Error {
    VerificationFailure::MissingArtifact { path }.into()
}
