//! CLI for the MDM model download manager.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use mdm_core::catalog::StaticCatalog;
use mdm_core::config::{self, MdmConfig};
use mdm_core::download::{Downloader, DownloaderSettings};
use mdm_core::event;
use mdm_core::service::{self, DownloaderHandle};
use mdm_core::transport::CurlTransport;
use semver::Version;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

use commands::{run_checksum, run_download, run_releases, run_remove};

/// Top-level CLI for the MDM model download manager.
#[derive(Debug, Parser)]
#[command(name = "mdm")]
#[command(about = "MDM: fetch, verify and install model artifacts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Where a model's filename, URL and digest come from.
#[derive(Debug, Clone, Default, Args)]
pub struct CatalogArgs {
    /// JSON catalog file (array of {id, filename, url?, digest}).
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Artifact URL for a model not in the catalog.
    #[arg(long)]
    pub url: Option<String>,

    /// Destination filename (defaults to the last URL path segment).
    #[arg(long)]
    pub filename: Option<String>,

    /// Expected SHA-256 of the artifact.
    #[arg(long, conflicts_with = "md5", value_name = "HEX")]
    pub sha256: Option<String>,

    /// Expected MD5 of the artifact.
    #[arg(long, value_name = "HEX")]
    pub md5: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download, verify and install a model.
    Download {
        /// Model identifier.
        model: String,

        #[command(flatten)]
        source: CatalogArgs,

        /// Bearer token sent with the request (installs gated models).
        #[arg(long)]
        token: Option<String>,
    },

    /// Delete an installed model from the model directory.
    Remove {
        /// Model identifier.
        model: String,

        #[command(flatten)]
        source: CatalogArgs,
    },

    /// Fetch the release manifest and show notes for this version.
    Releases,

    /// Compute the digest of a file (SHA-256 unless --md5).
    Checksum {
        /// Path to the file.
        path: String,

        #[arg(long)]
        md5: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Download {
                model,
                source,
                token,
            } => run_download(&cfg, &model, &source, token.as_deref()).await?,
            CliCommand::Remove { model, source } => run_remove(&cfg, &model, &source).await?,
            CliCommand::Releases => run_releases(&cfg).await?,
            CliCommand::Checksum { path, md5 } => run_checksum(Path::new(&path), md5).await?,
        }

        Ok(())
    }
}

/// Running version, compared against the release manifest.
pub(crate) fn app_version() -> Result<Version> {
    Ok(Version::parse(env!("CARGO_PKG_VERSION"))?)
}

/// Build a curl-backed downloader over `catalog` and run it on its own task.
pub(crate) fn start_service(
    cfg: &MdmConfig,
    catalog: StaticCatalog,
) -> Result<(DownloaderHandle, JoinHandle<()>)> {
    let settings = DownloaderSettings::from_config(cfg, app_version()?)?;
    let (tx, rx) = event::channel();
    let transport = CurlTransport::new(tx.clone(), cfg.transport_or_default());
    let downloader = Downloader::new(settings, Box::new(transport), Box::new(catalog), tx)?;
    Ok(service::spawn(downloader, rx))
}

#[cfg(test)]
mod tests;
