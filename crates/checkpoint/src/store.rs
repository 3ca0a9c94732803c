//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus shared types.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint identifier for storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointID {
    /// Checkpoint type (e.g., "cdc-simulation")
    pub checkpoint_type: String,
    /// Engine instance the checkpoint belongs to
    pub instance: String,
}

/// Checkpoint data stored in backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Serialized checkpoint
    pub checkpoint_data: String,
    /// Checkpoint type for validation
    pub checkpoint_type: String,
    /// Instance for validation
    pub instance: String,
    /// Timestamp when checkpoint was created
    pub created_at: DateTime<Utc>,
}

/// Trait for checkpoint storage operations.
///
/// A store keeps one checkpoint per [`CheckpointID`]; storing replaces the
/// previous checkpoint atomically, so a reader sees either the old or the
/// new checkpoint, never a mix.
///
/// Backends report unreadable data by returning a
/// [`CheckpointError::Corrupt`](crate::CheckpointError::Corrupt) wrapped in
/// the `anyhow` error.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint in the storage backend.
    async fn store_checkpoint(&self, id: &CheckpointID, checkpoint_data: String) -> Result<()>;

    /// Read a checkpoint from the storage backend.
    ///
    /// Returns None if the checkpoint doesn't exist.
    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>>;
}
