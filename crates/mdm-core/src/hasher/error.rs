use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::checksum::HashAlgorithm;

/// Why a staged file was not installed. The staged file is gone in every case.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Content does not hash to the catalog value.
    #[error("{algorithm} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },
    /// Staged file could not be read.
    #[error("could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// Verified file could not be flushed to disk.
    #[error("could not sync {}: {source}", path.display())]
    Sync { path: PathBuf, source: io::Error },
    /// Verified file could not be moved into place (permissions, cross-device).
    #[error("could not move {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    /// Download was cancelled before the file was installed.
    #[error("discarded after cancellation")]
    Aborted,
}

impl CommitError {
    /// Integrity failures are worth a fresh download; filesystem failures are not.
    pub fn is_integrity(&self) -> bool {
        matches!(self, CommitError::Mismatch { .. })
    }
}
