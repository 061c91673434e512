//! File-backed store backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::backend::StoreBackend;
use crate::model::Tables;
use nubz_common::Result;

/// File-backed store backend.
///
/// Keeps the whole store as one JSON document. Every persist writes a
/// temporary sibling file and renames it over the document, so a crash
/// leaves either the old or the new snapshot on disk.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Create a backend storing its snapshot at `path`.
    ///
    /// # Postconditions
    /// - Parent directory of `path` exists
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self { path })
    }

    /// Location of the snapshot document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sibling path used while `path` is being replaced.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace the content of `path` atomically.
///
/// Writes `data` to a temporary sibling, syncs it, then renames it over
/// `path`. Readers see either the old or the new content, never a mix.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    write_atomic_via(&temp_path_for(path), path, data).await
}

/// Replace the content of `path` atomically, staging the data in `temp`.
///
/// `temp` must be on the same filesystem as `path`.
pub async fn write_atomic_via(temp: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp, path).await?;
    Ok(())
}

#[async_trait]
impl StoreBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Option<Tables>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let content = fs::read(&self.path).await?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    async fn persist(&self, tables: &Tables) -> Result<()> {
        let json = serde_json::to_vec_pretty(tables)?;
        write_atomic(&self.path, &json).await?;
        debug!("Persisted store snapshot to {}", self.path.display());
        Ok(())
    }
}
