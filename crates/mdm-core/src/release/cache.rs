use std::collections::BTreeMap;

use semver::Version;

use super::{parse_manifest, ManifestError, ReleaseInfo};

/// Release notes keyed by version, plus the running application's version.
#[derive(Debug, Clone)]
pub struct ReleaseCache {
    current: Version,
    releases: BTreeMap<String, ReleaseInfo>,
}

impl ReleaseCache {
    pub fn new(current: Version) -> Self {
        Self {
            current,
            releases: BTreeMap::new(),
        }
    }

    pub fn current_version(&self) -> &Version {
        &self.current
    }

    /// Parse `bytes` and swap the whole map in. On error the previous snapshot stays.
    /// Returns the number of releases now cached.
    pub fn apply_manifest(&mut self, bytes: &[u8]) -> Result<usize, ManifestError> {
        let releases = parse_manifest(bytes)?;
        self.releases = releases;
        Ok(self.releases.len())
    }

    /// Notes for the running version, if the manifest lists it.
    pub fn release_info(&self) -> Option<&ReleaseInfo> {
        self.releases.get(&self.current.to_string())
    }

    /// True if any cached release is newer than the running version.
    pub fn has_newer_release(&self) -> bool {
        self.releases
            .keys()
            .filter_map(|v| Version::parse(v).ok())
            .any(|v| v > self.current)
    }

    pub fn get(&self, version: &str) -> Option<&ReleaseInfo> {
        self.releases.get(version)
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}
