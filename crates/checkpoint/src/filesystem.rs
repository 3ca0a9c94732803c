//! Filesystem-based checkpoint storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::store::{CheckpointID, CheckpointStore, StoredCheckpoint};
use crate::CheckpointError;

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores one JSON file per instance, `{dir}/{instance}.checkpoint.json`,
/// replaced by write, fsync, rename, then fsync of the directory.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file for an instance.
    pub fn checkpoint_path(&self, instance: &str) -> PathBuf {
        self.dir.join(format!("{instance}.checkpoint.json"))
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn store_checkpoint(&self, id: &CheckpointID, checkpoint_data: String) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let stored = StoredCheckpoint {
            checkpoint_data,
            checkpoint_type: id.checkpoint_type.clone(),
            instance: id.instance.clone(),
            created_at: Utc::now(),
        };

        let path = self.checkpoint_path(&id.instance);
        let tmp = path.with_extension("json.tmp");
        replace_file(&path, &tmp, serde_json::to_string_pretty(&stored)?.as_bytes())?;

        tracing::debug!("Stored checkpoint to {}", path.display());
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>> {
        let path = self.checkpoint_path(&id.instance);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCheckpoint = serde_json::from_str(&content)
            .map_err(|e| CheckpointError::corrupt(path.display(), e))?;
        Ok(Some(stored))
    }
}

/// Atomically replace `path` with `data`, durable once this returns.
pub(crate) fn replace_file(path: &Path, tmp: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp, path)?;
    sync_parent(path)
}

/// Flush the directory entry of `path` so a rename or create survives a crash.
#[cfg(unix)]
pub(crate) fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => std::fs::File::open(parent)?.sync_all(),
        None => Ok(()),
    }
}

// directories cannot be opened for syncing here
#[cfg(not(unix))]
pub(crate) fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
