//! `mdm download <model>` – fetch, verify and install one model, reporting
//! progress until it is installed or fails. Ctrl-C cancels.

use anyhow::{anyhow, Result};
use mdm_core::config::MdmConfig;
use mdm_core::download::{Notification, StartOutcome};
use tokio::sync::broadcast::error::RecvError;

use super::resolve_catalog;
use crate::cli::{start_service, CatalogArgs};

pub async fn run_download(
    cfg: &MdmConfig,
    model: &str,
    source: &CatalogArgs,
    token: Option<&str>,
) -> Result<()> {
    let catalog = resolve_catalog(model, source)?;
    let (handle, task) = start_service(cfg, catalog)?;
    let mut notes = handle.subscribe();

    let started = match token {
        Some(token) => handle.install_model(model, token).await,
        None => handle.download_model(model).await,
    };
    match started {
        Ok(StartOutcome::Started) => {}
        Ok(StartOutcome::AlreadyActive) => println!("{model} is already downloading"),
        Err(e) => {
            handle.shutdown().await?;
            task.await?;
            return Err(e.into());
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut reporter = Reporter::default();
    let result = loop {
        tokio::select! {
            n = notes.recv() => match n {
                Ok(n) if n.model() == Some(model) => {
                    if let Some(done) = reporter.report(&n) {
                        break done;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notification stream lagged");
                }
                Err(RecvError::Closed) => break Err(anyhow!("download service stopped")),
            },
            _ = &mut ctrl_c => {
                handle.cancel_download(model).await?;
                eprintln!();
                println!("Cancelled {model}");
                break Ok(());
            }
        }
    };

    handle.shutdown().await?;
    task.await?;
    result
}

/// Prints notifications for one model; returns the final result on a terminal one.
#[derive(Default)]
struct Reporter {
    last_percent: Option<u64>,
}

impl Reporter {
    fn report(&mut self, n: &Notification) -> Option<Result<()>> {
        match n {
            Notification::Started {
                filename, attempt, ..
            } => {
                self.last_percent = None;
                if *attempt == 1 {
                    println!("Downloading {filename}");
                } else {
                    println!("Downloading {filename} (attempt {attempt})");
                }
            }
            Notification::Progress { stats, .. } => {
                let percent = stats.fraction().map(|f| (f * 100.0) as u64);
                if percent.is_some() && percent != self.last_percent {
                    self.last_percent = percent;
                    let eta = stats
                        .eta_secs()
                        .map(|s| format!(", ~{:.0}s left", s))
                        .unwrap_or_default();
                    eprint!(
                        "\r{:>3}%  {} bytes  {:.1} KiB/s{}   ",
                        percent.unwrap_or(0),
                        stats.bytes_done,
                        stats.bytes_per_sec() / 1024.0,
                        eta
                    );
                }
            }
            Notification::Verifying { elapsed, .. } => {
                eprintln!();
                println!("Verifying (downloaded in {:.1}s)", elapsed.as_secs_f64());
            }
            Notification::Retrying { attempt, reason, .. } => {
                eprintln!();
                eprintln!("Attempt failed: {reason}; retrying (attempt {attempt})");
            }
            Notification::Installed { path, .. } => {
                println!("Installed {}", path.display());
                return Some(Ok(()));
            }
            Notification::Failed {
                filename,
                kind,
                message,
                ..
            } => {
                eprintln!();
                return Some(Err(anyhow!("{filename}: {message} ({kind:?})")));
            }
            Notification::Cancelled { .. } => return Some(Ok(())),
            _ => {}
        }
        None
    }
}
