//! Generic checkpoint manager.

use std::sync::Arc;

use crate::{
    store::CheckpointStore, Checkpoint, CheckpointError, CheckpointFile, CheckpointID,
    FilesystemStore,
};

/// Saves and loads the checkpoint of one engine instance.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::CheckpointManager;
///
/// let manager = CheckpointManager::filesystem("/tmp/checkpoints", "orders-sim");
///
/// manager.save(&checkpoint).await?;
/// let loaded: Option<SimulationCheckpoint> = manager.load().await?;
/// ```
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    instance: String,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl CheckpointManager {
    /// Create a manager over any store.
    pub fn new(store: Arc<dyn CheckpointStore>, instance: impl Into<String>) -> Self {
        Self {
            store,
            instance: instance.into(),
        }
    }

    /// Create a manager storing JSON files in `dir`.
    pub fn filesystem(dir: impl Into<std::path::PathBuf>, instance: impl Into<String>) -> Self {
        Self::new(Arc::new(FilesystemStore::new(dir)), instance)
    }

    /// Instance name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    fn id<C: Checkpoint>(&self) -> CheckpointID {
        CheckpointID {
            checkpoint_type: C::CHECKPOINT_TYPE.to_string(),
            instance: self.instance.clone(),
        }
    }

    /// Persist a checkpoint, replacing the previous one.
    pub async fn save<C: Checkpoint>(&self, checkpoint: &C) -> Result<(), CheckpointError> {
        let data = serde_json::to_string(checkpoint).map_err(anyhow::Error::from)?;
        self.store
            .store_checkpoint(&self.id::<C>(), data)
            .await
            .map_err(into_checkpoint_error)?;

        tracing::debug!(
            "Saved {} checkpoint for '{}': {}",
            C::CHECKPOINT_TYPE,
            self.instance,
            checkpoint.to_cli_string()
        );
        Ok(())
    }

    /// Read the stored checkpoint file, if any.
    pub async fn read_file<C: Checkpoint>(&self) -> Result<Option<CheckpointFile>, CheckpointError> {
        let stored = self
            .store
            .read_checkpoint(&self.id::<C>())
            .await
            .map_err(into_checkpoint_error)?;

        let Some(stored) = stored else {
            return Ok(None);
        };
        if stored.instance != self.instance {
            return Err(CheckpointError::corrupt(
                &self.instance,
                format!("stored for instance '{}'", stored.instance),
            ));
        }

        let checkpoint = serde_json::from_str(&stored.checkpoint_data)
            .map_err(|e| CheckpointError::corrupt(&self.instance, e))?;
        Ok(Some(CheckpointFile {
            checkpoint_type: stored.checkpoint_type,
            checkpoint,
            instance: stored.instance,
            created_at: stored.created_at,
        }))
    }

    /// Load and parse the checkpoint. `None` when nothing was stored yet.
    pub async fn load<C: Checkpoint>(&self) -> Result<Option<C>, CheckpointError> {
        match self.read_file::<C>().await? {
            Some(file) => {
                let checkpoint = file.parse::<C>()?;
                tracing::info!(
                    "Loaded {} checkpoint for '{}': {}",
                    C::CHECKPOINT_TYPE,
                    self.instance,
                    checkpoint.to_cli_string()
                );
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }
}

/// Recover a typed error a backend wrapped in `anyhow`.
fn into_checkpoint_error(err: anyhow::Error) -> CheckpointError {
    match err.downcast::<CheckpointError>() {
        Ok(err) => err,
        Err(err) => CheckpointError::Store(err),
    }
}
