//! Replication log for the CDC simulation engine.
//!
//! [`LogSequencer`] places generated transactions in one totally ordered
//! log, and the [`codec`] module encodes the resulting messages in a binary
//! format modeled on PostgreSQL's `pgoutput` plugin.

pub mod codec;
pub mod sequencer;

pub use codec::{decode, decode_frames, encode, encode_frames, CodecError};
pub use sequencer::{LogSequencer, SequenceError};
