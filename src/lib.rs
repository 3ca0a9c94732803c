//! cdc-sim
//!
//! A change data capture simulation engine. It emulates a logical
//! replication source: a synthetic relational database whose schema evolves
//! over time produces inserts, updates and deletes, which are placed in a
//! single ordered log, encoded in a pgoutput-style wire format, and written
//! durably to object storage with exactly-once positions.
//!
//! # Crates
//!
//! - `cdc_core` - Schema registry, values, change events
//! - `cdc_generator` - Simulation clock, row state store, change generator
//! - `cdc_log` - Log sequencer and event codec
//! - `cdc_sink` - Object sinks and the batching sink writer
//! - `checkpoint` - Checkpoint storage and single-writer leases
//!
//! # CLI Usage
//!
//! ```bash
//! # Run (or resume) a simulation
//! cdc-sim run --config sim.yaml --max-ticks 1000 --instance orders-sim
//!
//! # Print the events written to a local sink as JSON lines
//! cdc-sim inspect --sink-dir ./cdc-out --table orders
//!
//! # Print the schema versions the workload publishes
//! cdc-sim schema-history --config sim.yaml
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod inspect;

pub use config::{ConfigError, EngineConfig, SinkConfig};
pub use engine::{build_sink, Engine, RunSummary};
pub use error::EngineError;
pub use inspect::{load_schema_history, planned_schema_history, read_events};
