//! Manifest parsing: a JSON array of `{version, notes, contributors}` objects.

use std::collections::BTreeMap;

use super::{ManifestError, ReleaseInfo};

/// Manifests larger than this are rejected before parsing.
pub const MAX_MANIFEST_BYTES: usize = 4 * 1024 * 1024;

/// Parse a manifest into `version -> ReleaseInfo`. All-or-nothing: any bad entry rejects the document.
/// A version listed twice keeps its last entry.
pub fn parse_manifest(bytes: &[u8]) -> Result<BTreeMap<String, ReleaseInfo>, ManifestError> {
    if bytes.len() > MAX_MANIFEST_BYTES {
        return Err(ManifestError::TooLarge {
            limit: MAX_MANIFEST_BYTES,
        });
    }
    let entries: Vec<ReleaseInfo> = serde_json::from_slice(bytes)?;
    let mut map = BTreeMap::new();
    for entry in entries {
        let version = entry.version.trim().to_string();
        semver::Version::parse(&version).map_err(|source| ManifestError::InvalidVersion {
            version: version.clone(),
            source,
        })?;
        map.insert(version.clone(), ReleaseInfo { version, ..entry });
    }
    Ok(map)
}
