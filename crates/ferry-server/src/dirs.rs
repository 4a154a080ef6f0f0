use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Resolve the data directory for Ferry files (`ferry.db`, uploaded blobs).
///
/// Priority:
/// 1. `FERRY_DATA_DIR` environment variable
/// 2. Platform-specific app data dir (`~/.local/share/ferry/`, etc.)
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FERRY_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path).context("create FERRY_DATA_DIR")?;
        return Ok(path);
    }

    let dirs = ProjectDirs::from("", "", "ferry")
        .context("could not determine platform data directory")?;

    let path = dirs.data_dir().to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}
