//! Model catalog: where an artifact lives and what it must hash to.
//!
//! The catalog itself is maintained elsewhere (settings, remote model list);
//! the core only looks entries up by model id.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::checksum::ExpectedDigest;

/// One downloadable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    /// Canonical filename inside the model directory.
    pub filename: String,
    /// Full artifact URL. When absent the filename is joined onto the configured base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub digest: ExpectedDigest,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, digest: ExpectedDigest) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            url: None,
            digest,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Lookup of catalog entries by model id.
pub trait ModelCatalog: Send {
    fn lookup(&self, id: &str) -> Option<CatalogEntry>;
}

/// In-memory catalog, optionally loaded from a JSON array of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let list: Vec<CatalogEntry> = serde_json::from_slice(bytes).context("parse model catalog")?;
        Ok(list.into_iter().collect())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read model catalog: {}", path.display()))?;
        Self::from_json_slice(&bytes).with_context(|| format!("in {}", path.display()))
    }
}

impl FromIterator<CatalogEntry> for StaticCatalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut catalog = StaticCatalog::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}

impl ModelCatalog for StaticCatalog {
    fn lookup(&self, id: &str) -> Option<CatalogEntry> {
        self.entries.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::HashAlgorithm;

    #[test]
    fn parses_json_catalog() {
        let json = br#"[
            {"id": "tiny", "filename": "tiny.gguf",
             "digest": {"algorithm": "md5", "hex": "b1946ac92492d2347c6235b4d2611184"}},
            {"id": "big", "filename": "big.gguf", "url": "https://mirror.test/big.gguf",
             "digest": {"algorithm": "sha256", "hex": "abcd"}}
        ]"#;
        let catalog = StaticCatalog::from_json_slice(json).unwrap();
        assert_eq!(catalog.len(), 2);
        let tiny = catalog.lookup("tiny").unwrap();
        assert_eq!(tiny.filename, "tiny.gguf");
        assert!(tiny.url.is_none());
        assert_eq!(tiny.digest.algorithm, HashAlgorithm::Md5);
        let big = catalog.lookup("big").unwrap();
        assert_eq!(big.url.as_deref(), Some("https://mirror.test/big.gguf"));
        assert!(catalog.lookup("missing").is_none());
    }

    #[test]
    fn rejects_entry_without_digest() {
        let json = br#"[{"id": "x", "filename": "x.bin"}]"#;
        assert!(StaticCatalog::from_json_slice(json).is_err());
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let entries = vec![CatalogEntry::new("m", "m.bin", ExpectedDigest::sha256("00"))];
        std::fs::write(&path, serde_json::to_vec(&entries).unwrap()).unwrap();
        let catalog = StaticCatalog::load_from_path(&path).unwrap();
        assert_eq!(catalog.lookup("m").unwrap(), entries[0]);
    }
}
