use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned synchronously from the control surface.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    /// Catalog filename is not a single plain path component.
    #[error("refusing unsafe model filename {0:?}")]
    InvalidFilename(String),
    #[error("invalid URL for {model}: {source}")]
    InvalidUrl {
        model: String,
        source: url::ParseError,
    },
    /// Filesystem error; not retried.
    #[error("storage error at {}: {source}", path.display())]
    Storage { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("download service has stopped")]
    ServiceStopped,
}

impl DownloadError {
    pub(crate) fn storage(path: &Path) -> impl FnOnce(io::Error) -> DownloadError + '_ {
        move |source| DownloadError::Storage {
            path: path.to_path_buf(),
            source,
        }
    }
}
