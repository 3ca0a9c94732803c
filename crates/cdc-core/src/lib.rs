//! Core types for the CDC simulation engine.
//!
//! This crate provides the foundational types shared by every stage of the
//! pipeline:
//!
//! - [`ColumnType`] - Semantic column types of the simulated database
//! - [`Value`] / [`RowImage`] - Column values and row images (null vs absent)
//! - [`SchemaSnapshot`] - Immutable table definitions at one [`SchemaVersion`]
//! - [`EvolutionOp`] - Compatible schema changes
//! - [`SchemaRegistry`] - Append-only history of published versions
//! - [`ChangeEvent`] and transaction markers
//!
//! # Architecture
//!
//! ```text
//! cdc-core (this crate)
//!    │
//!    ├─── cdc-generator  (row state store, workload, change generator)
//!    ├─── cdc-log        (log sequencer, event codec)
//!    └─── cdc-sink       (object sinks, batching sink writer)
//! ```
//!
//! # Example
//!
//! ```rust
//! use cdc_core::{ColumnSpec, ColumnType, EvolutionOp, SchemaRegistry, TableSpec};
//!
//! let mut registry = SchemaRegistry::new(&[TableSpec {
//!     name: "orders".to_string(),
//!     primary_key: ColumnSpec::new("id", ColumnType::Int64),
//!     columns: vec![ColumnSpec::new("status", ColumnType::Text)],
//! }])
//! .unwrap();
//!
//! let version = registry
//!     .evolve(EvolutionOp::AddColumn {
//!         table: "orders".to_string(),
//!         column: ColumnSpec::nullable("shipped_at", ColumnType::Timestamp),
//!     })
//!     .unwrap();
//! assert_eq!(version.0, 1);
//! ```

pub mod change;
pub mod evolution;
pub mod registry;
pub mod schema;
pub mod types;
pub mod values;

// Re-exports for convenience
pub use change::{
    BeginMarker, ChangeEvent, CommitMarker, LogMessage, LogicalChange, Lsn, Operation,
    RelationColumn, RelationMessage, SequencedTransaction, TransactionBuffer, Xid,
};
pub use evolution::EvolutionOp;
pub use registry::{SchemaHistory, SchemaLookup, SchemaRegistry};
pub use schema::{
    ColumnDefinition, ColumnSpec, SchemaError, SchemaSnapshot, SchemaVersion, TableDefinition,
    TableSpec,
};
pub use types::{ColumnType, TypeConversion};
pub use values::{PrimaryKey, RowImage, Value, ValueError};
