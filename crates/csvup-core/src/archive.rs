//! On-disk copies of uploaded chunk files
//!
//! Layout: `<root>/<stem>_<YYYYmmdd_HHMMSS>/<stem>_<n>.csv`, moved into the
//! `uploaded/` subdirectory once the chunk is delivered. Whatever is left at
//! the top level after a run was not delivered.

use chrono::Local;
use csvup_common::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Subdirectory that receives delivered chunk files
pub const UPLOADED_DIR: &str = "uploaded";

#[derive(Debug, Clone)]
pub struct ChunkArchive {
    dir: PathBuf,
    uploaded: PathBuf,
}

impl ChunkArchive {
    /// Create a fresh, timestamped archive directory for `source` under `root`
    pub async fn create(root: &Path, source: &Path) -> Result<Self> {
        let stem = source_stem(source);
        let dir = root.join(format!("{}_{}", stem, Local::now().format("%Y%m%d_%H%M%S")));
        let uploaded = dir.join(UPLOADED_DIR);
        tokio::fs::create_dir_all(&uploaded).await?;

        debug!(dir = %dir.display(), "Chunk archive ready");
        Ok(Self { dir, uploaded })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a chunk file before its upload
    pub async fn stage(&self, file_name: &str, payload: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, payload).await?;
        debug!(file = %path.display(), bytes = payload.len(), "Chunk file written");
        Ok(path)
    }

    /// Move a staged chunk file into `uploaded/`
    pub async fn mark_delivered(&self, file_name: &str) -> Result<PathBuf> {
        let target = self.uploaded.join(file_name);
        tokio::fs::rename(self.dir.join(file_name), &target).await?;
        debug!(file = %target.display(), "Chunk file moved to uploaded");
        Ok(target)
    }
}

/// File name without directory or extension, used to name chunk files
pub fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "chunk".to_string())
}
