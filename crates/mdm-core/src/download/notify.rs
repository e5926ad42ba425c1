//! Lifecycle notifications broadcast to subscribers (GUI, CLI).

use std::path::PathBuf;
use std::time::Duration;

use crate::release::ReleaseInfo;

use super::progress::ProgressStats;

/// Why a download reached `FailedTerminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport or integrity failures exhausted the retry ceiling.
    RetriesExhausted,
    /// Filesystem error (create, write, rename, delete); not retried.
    Storage,
    /// Transport failure that is not retried.
    Transport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Started {
        model: String,
        filename: String,
        attempt: u32,
    },
    Progress {
        model: String,
        stats: ProgressStats,
    },
    /// Body complete; digest running on the hash worker.
    Verifying {
        model: String,
        elapsed: Duration,
    },
    Retrying {
        model: String,
        attempt: u32,
        reason: String,
    },
    Installed {
        model: String,
        path: PathBuf,
    },
    Failed {
        model: String,
        filename: String,
        kind: FailureKind,
        message: String,
    },
    Cancelled {
        model: String,
    },
    ReleaseInfoChanged(Option<ReleaseInfo>),
    HasNewerReleaseChanged(bool),
    ManifestUpdated {
        releases: usize,
    },
    ManifestFailed {
        message: String,
    },
}

impl Notification {
    /// Model the notification is about, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            Notification::Started { model, .. }
            | Notification::Progress { model, .. }
            | Notification::Verifying { model, .. }
            | Notification::Retrying { model, .. }
            | Notification::Installed { model, .. }
            | Notification::Failed { model, .. }
            | Notification::Cancelled { model } => Some(model),
            _ => None,
        }
    }

    /// True for Installed, Failed and Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Notification::Installed { .. }
                | Notification::Failed { .. }
                | Notification::Cancelled { .. }
        )
    }
}
