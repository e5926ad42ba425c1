//! `mdm checksum <path> [--md5]` – print a file's digest.

use anyhow::Result;
use mdm_core::checksum::{self, HashAlgorithm};
use std::path::Path;

pub async fn run_checksum(path: &Path, md5: bool) -> Result<()> {
    let algorithm = if md5 {
        HashAlgorithm::Md5
    } else {
        HashAlgorithm::Sha256
    };
    let digest = checksum::digest_path(path, algorithm)?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
