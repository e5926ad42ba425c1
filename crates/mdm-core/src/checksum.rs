//! Artifact digests (MD5, SHA-256) computed off the event loop.
//!
//! Reads in fixed-size chunks so multi-gigabyte model files never need to
//! fit in memory. The expected value always comes from the catalog.

use anyhow::{Context, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub(crate) const BUF_SIZE: usize = 64 * 1024;

/// Digest algorithm named by a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Expected digest for one artifact: algorithm plus hex value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedDigest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ExpectedDigest {
    pub fn new(algorithm: HashAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into(),
        }
    }

    pub fn sha256(hex: impl Into<String>) -> Self {
        Self::new(HashAlgorithm::Sha256, hex)
    }

    pub fn md5(hex: impl Into<String>) -> Self {
        Self::new(HashAlgorithm::Md5, hex)
    }

    /// Case-insensitive hex comparison; surrounding whitespace in the catalog value is ignored.
    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.trim().eq_ignore_ascii_case(actual_hex.trim())
    }
}

/// Incremental hasher over either supported algorithm.
pub enum DigestState {
    Md5(Md5),
    Sha256(Sha256),
}

impl DigestState {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => DigestState::Md5(Md5::new()),
            HashAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Md5(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
        }
    }

    /// Consume the state and return the digest as lowercase hex.
    pub fn finalize_hex(self) -> String {
        match self {
            DigestState::Md5(h) => hex::encode(h.finalize()),
            DigestState::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Compute the digest of a file with the given algorithm, as lowercase hex.
pub fn digest_path(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut state = DigestState::new(algorithm);
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        state.update(&buf[..n]);
    }
    Ok(state.finalize_hex())
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    digest_path(path, HashAlgorithm::Sha256)
}
