//! CLI command definitions
//!
//! Defines the clap commands for the sanity-check CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::scenario::SystemKind;
use crate::verify::{HashAlgorithm, DEFAULT_CHUNK_SIZE};

#[derive(Subcommand)]
pub enum Commands {
    /// Run the built-in end-to-end check for a system
    Check {
        /// System to check
        #[arg(value_enum)]
        system: SystemKind,

        /// Print the scenario as YAML instead of running it
        #[arg(long)]
        print: bool,
    },

    /// Execute a scenario defined in a YAML file
    Run {
        /// Path to the YAML scenario file
        path: PathBuf,
    },

    /// Wait until every URL answers `/healthcheck` with 200
    Health {
        /// Base URLs, e.g. http://localhost:8000
        #[arg(required = true)]
        urls: Vec<String>,

        /// Deadline per URL in seconds (default: from config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between probes (default: from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single verifier against local artifacts
    #[command(subcommand)]
    Verify(VerifyCommands),
}

#[derive(Subcommand)]
pub enum VerifyCommands {
    /// Two files must be byte-identical
    Hash {
        left: PathBuf,
        right: PathBuf,

        /// Digest algorithm (sha256 or sha512)
        #[arg(long, default_value = "sha256")]
        algorithm: HashAlgorithm,

        /// Read size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// A file (or `-` for stdin) must contain every needle
    Contains {
        file: PathBuf,

        #[arg(required = true)]
        needles: Vec<String>,
    },

    /// Two files must hold the same multiset of lines
    Snapshot { actual: PathBuf, expected: PathBuf },

    /// Partition files `0..N` must each match their snapshot
    Partitions {
        results_dir: PathBuf,
        snapshot_dir: PathBuf,

        /// Number of partitions
        #[arg(long, short = 'n', default_value = "3")]
        partitions: u32,
    },
}
