//! Release metadata cache.
//!
//! Holds the release notes published in the remote manifest, keyed by
//! release version, and answers whether a release newer than the running
//! application exists. A refresh replaces the whole map or nothing.

mod cache;
mod error;
mod manifest;

pub use cache::ReleaseCache;
pub use error::ManifestError;
pub use manifest::{parse_manifest, MAX_MANIFEST_BYTES};

use serde::{Deserialize, Serialize};

/// Immutable snapshot of one published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub contributors: String,
}
