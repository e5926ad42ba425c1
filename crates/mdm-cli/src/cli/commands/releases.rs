//! `mdm releases` – refresh the release manifest and show what it says about
//! this version.

use anyhow::{bail, Result};
use mdm_core::app_state::AppState;
use mdm_core::catalog::StaticCatalog;
use mdm_core::config::MdmConfig;
use mdm_core::download::Notification;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{app_version, start_service};

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn run_releases(cfg: &MdmConfig) -> Result<()> {
    let version = app_version()?;
    let (handle, task) = start_service(cfg, StaticCatalog::new())?;
    let first_start = handle.is_first_start();
    let mut notes = handle.subscribe();
    handle.update_release_notes().await?;

    let outcome = tokio::time::timeout(MANIFEST_TIMEOUT, async {
        loop {
            match notes.recv().await {
                Ok(Notification::ManifestUpdated { releases }) => return Ok(releases),
                Ok(Notification::ManifestFailed { message }) => return Err(message),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err("download service stopped".to_string()),
            }
        }
    })
    .await;

    let info = handle.release_info();
    let newer = handle.has_newer_release();
    handle.shutdown().await?;
    task.await?;

    let releases = match outcome {
        Ok(Ok(n)) => n,
        Ok(Err(message)) => bail!("release manifest: {message}"),
        Err(_) => bail!("release manifest: timed out after {:?}", MANIFEST_TIMEOUT),
    };

    println!("mdm {version} ({releases} releases published)");
    match info {
        Some(info) => {
            println!("Notes: {}", info.notes);
            if !info.contributors.is_empty() {
                println!("Contributors: {}", info.contributors);
            }
        }
        None => println!("No release notes for this version."),
    }
    if newer {
        println!("A newer release is available.");
    }
    if first_start {
        println!("First start of this version.");
        if let Err(e) = AppState::open_default().and_then(|s| s.record_start(&version.to_string())) {
            tracing::warn!("could not record start: {:#}", e);
        }
    }
    Ok(())
}
