//! First-start detection: remembers the last application version that ran.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Marker file under the XDG state dir holding the last started version.
#[derive(Debug, Clone)]
pub struct AppState {
    path: PathBuf,
}

impl AppState {
    /// `~/.local/state/mdm/last_version`.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
        Ok(xdg_dirs.get_state_home().join("mdm").join("last_version"))
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::at(Self::default_path()?))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last recorded version, or `None` if nothing was recorded or the marker is unreadable.
    pub fn last_version(&self) -> Option<String> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        let v = data.trim();
        (!v.is_empty()).then(|| v.to_string())
    }

    /// True if `current` has never been recorded as started. Read-only.
    pub fn is_first_start(&self, current: &str) -> bool {
        self.last_version().as_deref() != Some(current)
    }

    /// Record `current` as started.
    pub fn record_start(&self, current: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        std::fs::write(&self.path, format!("{}\n", current))
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_until_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::at(dir.path().join("state").join("last_version"));
        assert!(state.is_first_start("1.0.0"));
        assert!(state.is_first_start("1.0.0"), "query must not record");
        state.record_start("1.0.0").unwrap();
        assert!(!state.is_first_start("1.0.0"));
        assert_eq!(state.last_version().as_deref(), Some("1.0.0"));
    }

    #[test]
    fn upgrade_counts_as_first_start() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::at(dir.path().join("last_version"));
        state.record_start("1.0.0").unwrap();
        assert!(state.is_first_start("1.1.0"));
    }
}
