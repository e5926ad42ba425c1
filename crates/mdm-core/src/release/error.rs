use thiserror::Error;

use crate::transport::TransportError;

/// Manifest refresh failure. The previous cache snapshot is always kept.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed release manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("release manifest has invalid version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },
    #[error("release manifest exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("release manifest fetch failed: {0}")]
    Transport(#[from] TransportError),
}
