//! Local filesystem object sink.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::sink::{validate_key, ObjectSink, SinkError};

pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Stores objects as files below a root directory.
///
/// Keys map to relative paths. Each object is written to a temporary file,
/// synced, and renamed into place, then the directory is synced. A crash
/// never leaves a partial object under its final name, and a put that
/// returned survives one.
#[derive(Debug, Clone)]
pub struct LocalObjectSink {
    root: PathBuf,
}

impl LocalObjectSink {
    /// Create a sink rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn unavailable(action: &str, path: &Path, err: std::io::Error) -> SinkError {
    SinkError::Unavailable(format!("Failed to {action} {}: {err}", path.display()))
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl ObjectSink for LocalObjectSink {
    async fn put_object(&self, key: &str, bytes: Bytes) -> Result<(), SinkError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("create directory", parent, e))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(TEMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| unavailable("create", &tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| unavailable("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| unavailable("sync", &tmp, e))?;
        drop(file);
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| unavailable("rename", &tmp, e))?;
        if let Some(parent) = path.parent() {
            sync_dir(parent)
                .await
                .map_err(|e| unavailable("sync directory", parent, e))?;
        }

        tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, SinkError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable("read", &path, e)),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, SinkError> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(unavailable("list", &dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| unavailable("list", &dir, e))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                let key = format!("{key_prefix}{name}");
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| unavailable("stat", &entry.path(), e))?;

                if file_type.is_dir() {
                    // skip subtrees that cannot match
                    let dir_key = format!("{key}/");
                    if dir_key.starts_with(prefix) || prefix.starts_with(&dir_key) {
                        pending.push((entry.path(), dir_key));
                    }
                } else if file_type.is_file()
                    && !name.ends_with(TEMP_SUFFIX)
                    && key.starts_with(prefix)
                {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        tracing::debug!(
            "Listed {} objects with prefix '{}' in {}",
            keys.len(),
            prefix,
            self.root.display()
        );
        Ok(keys)
    }
}
