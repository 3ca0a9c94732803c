//! Object sinks and the sink writer.
//!
//! Encoded transactions flow from the producer into a [`SinkWriter`], which
//! cuts them into batches, writes one object per table and batch to an
//! [`ObjectSink`], and stores a [`SimulationCheckpoint`] once a batch is
//! durable.
//!
//! # Object layout
//!
//! ```text
//! _schemas/v0000000000.json                                 schema feed
//! orders/20240101T000000Z/00000000000000000001.cdc          data objects
//! orders/20240101T010000Z/00000000000000004711.cdc
//! users/20240101T000000Z/00000000000000000002.cdc
//! ```
//!
//! Data objects are length-prefixed frames (see [`cdc_log::decode_frames`]);
//! each table's slice of a transaction is framed by copies of the
//! transaction's Begin and Commit markers.
//!
//! # Sinks
//!
//! - [`LocalObjectSink`] - Files under a root directory
//! - [`S3ObjectSink`] - Objects in an S3 bucket under a prefix
//! - [`MemoryObjectSink`] - In-memory, with failure injection for tests

mod checkpoint;
mod local;
mod memory;
pub mod partition;
mod retry;
mod s3;
mod sink;
mod transaction;
mod writer;

pub use self::checkpoint::SimulationCheckpoint;
pub use local::LocalObjectSink;
pub use memory::MemoryObjectSink;
pub use retry::{RetryError, RetryPolicy};
pub use s3::S3ObjectSink;
pub use sink::{ObjectSink, SinkError};
pub use transaction::{EncodedTransaction, RelationTracker, TableSlice};
pub use writer::{Batch, BatchConfig, SinkWriter, WriteError};
