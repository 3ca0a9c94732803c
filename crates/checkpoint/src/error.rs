//! Checkpoint error type.

use chrono::{DateTime, Utc};

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Stored checkpoint cannot be parsed. Never recovered from by guessing.
    #[error("Checkpoint '{location}' is corrupt: {reason}")]
    Corrupt { location: String, reason: String },

    /// Another live writer holds the lease for this instance
    #[error("Instance '{instance}' is leased by {holder} (renewed at {renewed_at})")]
    LeaseHeld {
        instance: String,
        holder: String,
        renewed_at: DateTime<Utc>,
    },

    /// Stored checkpoint belongs to a different checkpoint type
    #[error("Checkpoint type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// Storage backend failure
    #[error("Checkpoint store error: {0}")]
    Store(#[from] anyhow::Error),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    pub(crate) fn corrupt(location: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}
