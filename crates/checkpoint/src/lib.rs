//! Checkpoint management for cdc-sim
//!
//! Provides storage-agnostic checkpoint file handling for typed
//! checkpoints, plus the advisory lease that keeps a single writer per
//! engine instance.
//!
//! # Architecture
//!
//! This crate provides a generic checkpoint system that:
//! - Defines the `Checkpoint` trait for typed checkpoints
//! - Provides `CheckpointFile` wrapper for storage-agnostic serialization
//! - Manages checkpoint saving/loading via `CheckpointManager`
//! - Supports multiple storage backends via `CheckpointStore` trait
//! - Guards an instance against concurrent writers via `CheckpointLease`
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Stores one JSON file per instance, replaced atomically
//!
//! The crate that owns a pipeline defines its checkpoint type and implements
//! `Checkpoint` for it.

mod error;
mod file;
mod filesystem;
pub mod lease;
mod manager;
pub mod store;


pub use error::CheckpointError;
pub use file::CheckpointFile;
pub use filesystem::FilesystemStore;
pub use lease::{CheckpointLease, LeaseRecord};
pub use manager::CheckpointManager;
pub use store::{CheckpointID, CheckpointStore, StoredCheckpoint};

/// Trait that typed checkpoints must implement.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct OffsetCheckpoint {
///     pub offset: u64,
///     pub tick: u64,
/// }
///
/// impl Checkpoint for OffsetCheckpoint {
///     const CHECKPOINT_TYPE: &'static str = "offset";
///
///     fn to_cli_string(&self) -> String {
///         format!("{}:{}", self.offset, self.tick)
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         let (offset, tick) = s
///             .split_once(':')
///             .ok_or_else(|| anyhow::anyhow!("Invalid checkpoint format"))?;
///         Ok(Self {
///             offset: offset.parse()?,
///             tick: tick.parse()?,
///         })
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Checkpoint type identifier.
    ///
    /// This constant is used to:
    /// - Identify the checkpoint type in serialized files
    /// - Validate checkpoint type when loading
    const CHECKPOINT_TYPE: &'static str;

    /// Convert to CLI-friendly string format.
    ///
    /// The returned string should be parseable by `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}
