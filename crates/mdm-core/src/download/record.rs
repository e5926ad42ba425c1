//! Active download records and the per-artifact state machine.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::CatalogEntry;
use crate::storage::{self, TempFile};

/// Per-artifact state.
///
/// `Idle → Downloading → Verifying → Installed`, with
/// `Verifying → FailedRetryable → Downloading` on a digest mismatch,
/// `Downloading → FailedRetryable → Downloading` on a transport error while
/// retries remain, `→ FailedTerminal` once they are exhausted, and
/// `Downloading|Verifying → Cancelled` on user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Downloading,
    Verifying,
    Installed,
    FailedRetryable,
    FailedTerminal,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadState::Installed | DownloadState::FailedTerminal | DownloadState::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, DownloadState::Downloading | DownloadState::Verifying)
    }
}

/// Who holds the `.part` file.
#[derive(Debug)]
pub(crate) enum Phase {
    /// Body still arriving; the orchestrator owns the write handle.
    Downloading(TempFile),
    /// Handed to the hash worker; the token cancels it.
    Verifying { abort: Arc<AtomicBool> },
}

/// One in-flight transfer, keyed by its `TransferId` in the active table.
#[derive(Debug)]
pub(crate) struct ActiveDownload {
    pub model: String,
    pub entry: CatalogEntry,
    pub credential: Option<String>,
    pub final_path: PathBuf,
    pub temp_path: PathBuf,
    pub attempt: u32,
    pub started_at: Instant,
    pub received: u64,
    pub total: Option<u64>,
    /// A regular file was already at `final_path` when this attempt began.
    pub had_installed: bool,
    pub phase: Phase,
}

impl ActiveDownload {
    pub fn state(&self) -> DownloadState {
        match self.phase {
            Phase::Downloading(_) => DownloadState::Downloading,
            Phase::Verifying { .. } => DownloadState::Verifying,
        }
    }

    pub fn filename(&self) -> &str {
        &self.entry.filename
    }

    /// Drop the record, removing the `.part` file whichever phase it is in.
    /// Returns what a retry needs plus the outcome of the cleanup.
    pub fn retire(self) -> (Retired, std::io::Result<()>) {
        let ActiveDownload {
            model,
            entry,
            credential,
            temp_path,
            attempt,
            phase,
            ..
        } = self;
        let cleanup = match phase {
            Phase::Downloading(temp) => temp.discard(),
            Phase::Verifying { .. } => storage::remove_if_exists(&temp_path),
        };
        let retired = Retired {
            model,
            entry,
            credential,
            attempt,
        };
        (retired, cleanup)
    }
}

/// What is left of a record once its files are gone.
#[derive(Debug)]
pub(crate) struct Retired {
    pub model: String,
    pub entry: CatalogEntry,
    pub credential: Option<String>,
    pub attempt: u32,
}

/// A download cancelled while its `.part` file was with the hash worker.
/// Kept until the worker's outcome arrives.
#[derive(Debug)]
pub(crate) struct Draining {
    pub filename: String,
    pub had_installed: bool,
    /// Start requested for the same file in the meantime.
    pub restart: Option<PendingStart>,
}

/// A start waiting for the hash worker to let go of the `.part` file.
#[derive(Debug)]
pub(crate) struct PendingStart {
    pub model: String,
    pub entry: CatalogEntry,
    pub credential: Option<String>,
}
