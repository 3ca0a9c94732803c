//! Checkpoint file wrapper for storage-agnostic serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Checkpoint, CheckpointError};

/// Storage-agnostic checkpoint file wrapper.
///
/// Wraps a typed checkpoint with the metadata needed to validate it on
/// load.
///
/// # File Format
///
/// ```json
/// {
///     "checkpoint_type": "cdc-simulation",
///     "checkpoint": {
///         "last_committed_lsn": 120,
///         "last_committed_xid": 40
///     },
///     "instance": "orders-sim",
///     "created_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Checkpoint type identifier
    pub checkpoint_type: String,
    /// Serialized checkpoint data as JSON Value
    pub checkpoint: serde_json::Value,
    /// Instance this checkpoint belongs to
    pub instance: String,
    /// Timestamp when this checkpoint file was created
    pub created_at: DateTime<Utc>,
}

impl CheckpointFile {
    /// Wrap a typed checkpoint for the given instance.
    pub fn new<C: Checkpoint>(checkpoint: &C, instance: &str) -> Result<Self, CheckpointError> {
        Ok(Self {
            checkpoint_type: C::CHECKPOINT_TYPE.to_string(),
            checkpoint: serde_json::to_value(checkpoint).map_err(anyhow::Error::from)?,
            instance: instance.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Parse the checkpoint into its typed form.
    ///
    /// Fails with [`CheckpointError::TypeMismatch`] when the stored type is
    /// not `C`, and with [`CheckpointError::Corrupt`] when the data does not
    /// deserialize.
    pub fn parse<C: Checkpoint>(&self) -> Result<C, CheckpointError> {
        if self.checkpoint_type != C::CHECKPOINT_TYPE {
            return Err(CheckpointError::TypeMismatch {
                expected: C::CHECKPOINT_TYPE.to_string(),
                found: self.checkpoint_type.clone(),
            });
        }
        serde_json::from_value(self.checkpoint.clone())
            .map_err(|e| CheckpointError::corrupt(&self.instance, e))
    }

    /// Get the checkpoint type of this file.
    pub fn checkpoint_type(&self) -> &str {
        &self.checkpoint_type
    }

    /// Get the timestamp when this checkpoint file was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
