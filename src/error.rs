//! Fatal engine errors.

use cdc_core::{Lsn, SchemaError, SchemaVersion};
use cdc_generator::GeneratorError;
use cdc_log::{CodecError, SequenceError};
use cdc_sink::{SinkError, WriteError};
use checkpoint::CheckpointError;

use crate::config::ConfigError;

/// Error type for running, inspecting and planning simulations.
///
/// Every variant halts the instance; recoverable conditions (rejected
/// evolutions, update/delete fallbacks, transient sink outages) are handled
/// inside the pipeline and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Change generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Sequencing failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Regenerating the committed ticks did not reproduce the checkpoint
    #[error(
        "Replay of {ticks} ticks diverged from the checkpoint: expected LSN {expected_lsn} at \
         schema {expected_version}, got LSN {actual_lsn} at schema {actual_version}"
    )]
    ReplayDiverged {
        ticks: u64,
        expected_lsn: Lsn,
        actual_lsn: Lsn,
        expected_version: SchemaVersion,
        actual_version: SchemaVersion,
    },

    /// A schema feed object could not be read back
    #[error("Invalid schema object '{key}': {reason}")]
    SchemaFeed { key: String, reason: String },

    /// A data object could not be decoded
    #[error("Failed to decode '{key}': {source}")]
    Decode { key: String, source: CodecError },

    /// The producer or writer task panicked or was aborted
    #[error("Pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
