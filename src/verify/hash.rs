//! Streaming content hashes
//!
//! Files are digested chunk by chunk so large artifacts never sit in memory.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::common::{Error, Result, VerificationFailure};

/// Default read size, in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl std::str::FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(Error::Config(format!(
                "Unknown hash algorithm '{}'. Supported: sha256, sha512",
                other
            ))),
        }
    }
}

/// Digests of two files, compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashComparison {
    pub left: PathBuf,
    pub right: PathBuf,
    pub left_digest: String,
    pub right_digest: String,
}

impl HashComparison {
    pub fn is_equal(&self) -> bool {
        self.left_digest == self.right_digest
    }

    /// Turn an inequality into a verification error
    pub fn into_result(self) -> Result<()> {
        if self.is_equal() {
            return Ok(());
        }
        Err(VerificationFailure::HashMismatch {
            left: self.left,
            right: self.right,
            left_digest: self.left_digest,
            right_digest: self.right_digest,
        }
        .into())
    }
}

/// Hex digest of everything `reader` yields, read `chunk_size` bytes at a time
pub fn digest_reader<R: Read>(reader: R, algorithm: HashAlgorithm, chunk_size: usize) -> Result<String> {
    match algorithm {
        HashAlgorithm::Sha256 => stream_digest::<Sha256, R>(reader, chunk_size),
        HashAlgorithm::Sha512 => stream_digest::<Sha512, R>(reader, chunk_size),
    }
}

/// Hex digest of a file
pub fn file_digest(path: &Path, algorithm: HashAlgorithm, chunk_size: usize) -> Result<String> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::Verification(VerificationFailure::MissingArtifact {
            path: path.to_path_buf(),
        }),
        _ => Error::file_read(path, &e),
    })?;
    digest_reader(file, algorithm, chunk_size).map_err(|e| match e {
        Error::Io(io) => Error::file_read(path, &io),
        other => other,
    })
}

/// Digest both files and compare
pub fn hash_equality(
    left: &Path,
    right: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> Result<HashComparison> {
    let left_digest = file_digest(left, algorithm, chunk_size)?;
    let right_digest = file_digest(right, algorithm, chunk_size)?;
    tracing::debug!(left = %left.display(), %left_digest, right = %right.display(), %right_digest, "Compared digests");

    Ok(HashComparison {
        left: left.to_path_buf(),
        right: right.to_path_buf(),
        left_digest,
        right_digest,
    })
}

/// Fail unless both files are byte-identical
pub fn verify_hash_equality(
    left: &Path,
    right: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> Result<()> {
    hash_equality(left, right, algorithm, chunk_size)?.into_result()
}

fn stream_digest<D: Digest, R: Read>(mut reader: R, chunk_size: usize) -> Result<String> {
    if chunk_size == 0 {
        return Err(Error::Config("Hash chunk size must be positive".to_string()));
    }

    let mut hasher = D::new();
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&chunk[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}
