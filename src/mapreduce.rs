//! Map/reduce application contract
//!
//! The job service under test loads an application providing `map`,
//! `reduce` and `partitioner`. The harness does not run jobs itself; this
//! trait pins down what such an application must provide, and [`WordCount`]
//! is the application the job scenario submits.

use std::num::NonZeroU32;

/// A map/reduce application
pub trait MapReduceApp {
    /// Emit intermediate pairs for one input record
    ///
    /// The sequence is lazy and finite, and can be consumed only once.
    fn map<'a>(&self, key: &'a str, value: &'a str) -> Box<dyn Iterator<Item = (String, String)> + 'a>;

    /// Fold every value emitted for `key`; the order of `values` is unspecified
    fn reduce(&self, key: &str, values: &[String]) -> String;

    /// Partition of `key`, in `[0, partition_count)`
    ///
    /// Must be deterministic: equal inputs give equal outputs on every call.
    fn partitioner(&self, key: &str, partition_count: NonZeroU32) -> u32;
}

/// Counts word occurrences
///
/// Commas split words, periods and colons are dropped, words are lowercased.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

/// FNV-1 32-bit prime, used as the rolling hash multiplier
const HASH_MULTIPLIER: u64 = 16_777_619;

impl MapReduceApp for WordCount {
    fn map<'a>(&self, _key: &'a str, value: &'a str) -> Box<dyn Iterator<Item = (String, String)> + 'a> {
        let cleaned: String = value
            .chars()
            .filter(|c| !matches!(c, '.' | ':'))
            .map(|c| if c == ',' { ' ' } else { c })
            .collect();
        let words: Vec<String> = cleaned.split_whitespace().map(str::to_lowercase).collect();
        Box::new(words.into_iter().map(|word| (word, "1".to_string())))
    }

    fn reduce(&self, _key: &str, values: &[String]) -> String {
        values.len().to_string()
    }

    fn partitioner(&self, key: &str, partition_count: NonZeroU32) -> u32 {
        let modulus = u64::from(partition_count.get());
        let hash = key
            .chars()
            .fold(0u64, |hash, c| (hash * HASH_MULTIPLIER + u64::from(c)) % modulus);
        // hash < modulus <= u32::MAX
        hash as u32
    }
}
