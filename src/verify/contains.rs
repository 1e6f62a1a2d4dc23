//! Substring containment over captured output

use crate::common::{Result, VerificationFailure};

/// Check that every needle occurs somewhere in `text`
///
/// Only presence matters: needles may appear in any order, overlapping or
/// not. The first absent needle (in the given order) is reported.
/// `source` names the text in the failure, e.g. `consume output for t-1`.
pub fn containment<S: AsRef<str>>(text: &str, needles: &[S], source: &str) -> Result<()> {
    match first_missing(text, needles) {
        Some(needle) => Err(VerificationFailure::MissingNeedle {
            source: source.to_string(),
            needle: needle.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

/// First needle not present in `text`
pub fn first_missing<'a, S: AsRef<str>>(text: &str, needles: &'a [S]) -> Option<&'a str> {
    needles
        .iter()
        .map(|needle| needle.as_ref())
        .find(|needle| !text.contains(*needle))
}
