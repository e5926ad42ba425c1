//! `mdm remove <model>` – delete an installed model. Removing a model that
//! is not installed succeeds.

use anyhow::Result;
use mdm_core::config::MdmConfig;

use super::resolve_catalog;
use crate::cli::{start_service, CatalogArgs};

pub async fn run_remove(cfg: &MdmConfig, model: &str, source: &CatalogArgs) -> Result<()> {
    let catalog = resolve_catalog(model, source)?;
    let (handle, task) = start_service(cfg, catalog)?;
    let removed = handle.remove_model(model).await;
    handle.shutdown().await?;
    task.await?;
    removed?;
    println!("Removed {model}");
    Ok(())
}
