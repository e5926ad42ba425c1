//! CLI command handlers. Each command is in its own file.

mod checksum;
mod download;
mod releases;
mod remove;

pub use checksum::run_checksum;
pub use download::run_download;
pub use releases::run_releases;
pub use remove::run_remove;

use anyhow::{bail, Result};
use mdm_core::catalog::{CatalogEntry, StaticCatalog};
use mdm_core::checksum::ExpectedDigest;

use super::CatalogArgs;

/// Catalog holding `model`: loaded from `--catalog`, or built from `--url` and a digest flag.
pub(crate) fn resolve_catalog(model: &str, args: &CatalogArgs) -> Result<StaticCatalog> {
    let mut catalog = match &args.catalog {
        Some(path) => StaticCatalog::load_from_path(path)?,
        None => StaticCatalog::new(),
    };
    if let Some(entry) = adhoc_entry(model, args)? {
        catalog.insert(entry);
    }
    if catalog.is_empty() {
        bail!("no catalog for {model}: pass --catalog, or --url with --sha256/--md5");
    }
    Ok(catalog)
}

fn adhoc_entry(model: &str, args: &CatalogArgs) -> Result<Option<CatalogEntry>> {
    let digest = match (&args.sha256, &args.md5) {
        (Some(hex), _) => Some(ExpectedDigest::sha256(hex.as_str())),
        (None, Some(hex)) => Some(ExpectedDigest::md5(hex.as_str())),
        (None, None) => None,
    };
    let Some(digest) = digest else {
        if args.url.is_some() {
            bail!("--url needs --sha256 or --md5");
        }
        return Ok(None);
    };
    let filename = match (&args.filename, &args.url) {
        (Some(name), _) => name.clone(),
        (None, Some(url)) => filename_from_url(url)
            .ok_or_else(|| anyhow::anyhow!("cannot derive a filename from {url}; pass --filename"))?,
        (None, None) => bail!("a digest flag needs --url or --filename"),
    };
    let mut entry = CatalogEntry::new(model, filename, digest);
    if let Some(url) = &args.url {
        entry = entry.with_url(url.as_str());
    }
    Ok(Some(entry))
}

/// Last non-empty path segment, without query or fragment.
fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let (_, path) = path.split_once('/')?;
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdm_core::catalog::ModelCatalog;
    use mdm_core::checksum::HashAlgorithm;

    #[test]
    fn filename_from_url_variants() {
        assert_eq!(
            filename_from_url("https://mirror.test/models/tiny.gguf?download=1").as_deref(),
            Some("tiny.gguf")
        );
        assert_eq!(
            filename_from_url("https://mirror.test/models/").as_deref(),
            Some("models")
        );
        assert_eq!(filename_from_url("https://mirror.test"), None);
    }

    #[test]
    fn adhoc_catalog_from_flags() {
        let args = CatalogArgs {
            url: Some("https://mirror.test/tiny.gguf".into()),
            md5: Some("b1946ac92492d2347c6235b4d2611184".into()),
            ..Default::default()
        };
        let catalog = resolve_catalog("tiny", &args).unwrap();
        let entry = catalog.lookup("tiny").unwrap();
        assert_eq!(entry.filename, "tiny.gguf");
        assert_eq!(entry.digest.algorithm, HashAlgorithm::Md5);
        assert_eq!(entry.url.as_deref(), Some("https://mirror.test/tiny.gguf"));
    }

    #[test]
    fn url_without_digest_is_rejected() {
        let args = CatalogArgs {
            url: Some("https://mirror.test/tiny.gguf".into()),
            ..Default::default()
        };
        assert!(resolve_catalog("tiny", &args).is_err());
        assert!(resolve_catalog("tiny", &CatalogArgs::default()).is_err());
    }
}
