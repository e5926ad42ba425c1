//! Hash-and-commit worker.
//!
//! The only place a staged `.part` file becomes an installed artifact: the
//! worker digests the staged file and, on a match, flushes it to disk and
//! renames it onto the final path. Runs on its own thread so hashing never stalls the event loop.

mod commit;
mod error;
mod worker;

pub use commit::hash_and_save;
pub use error::CommitError;
pub use worker::HashWorker;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::checksum::ExpectedDigest;
use crate::storage::StagedFile;
use crate::transport::TransferId;

/// Work item: verify `staged` against `expected`, then move it to `final_path`.
#[derive(Debug)]
pub struct HashRequest {
    /// Transfer that produced the file; echoed back for correlation.
    pub id: TransferId,
    pub expected: ExpectedDigest,
    pub final_path: PathBuf,
    pub staged: StagedFile,
    /// Set by the orchestrator when the download is cancelled mid-verification.
    pub abort: Arc<AtomicBool>,
}

/// Result posted back to the orchestrator.
#[derive(Debug)]
pub struct HashOutcome {
    pub id: TransferId,
    pub final_path: PathBuf,
    pub result: Result<(), CommitError>,
}

impl HashOutcome {
    pub fn is_installed(&self) -> bool {
        self.result.is_ok()
    }
}
