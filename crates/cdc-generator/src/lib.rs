//! Workload generator for the CDC simulation engine.
//!
//! This crate turns a YAML workload into a stream of logical transactions,
//! one per tick. Every tick draws from its own seeded RNG, so the same
//! workload replayed over the same ticks produces identical changes.
//!
//! # Architecture
//!
//! ```text
//! WorkloadConfig (YAML)
//!        │
//!        ▼
//! ┌──────────────────────┐
//! │   ChangeGenerator    │
//! │                      │
//! │  - SchemaRegistry    │◄── evolution_schedule
//! │  - RowStore          │
//! │  - SimulationClock   │
//! └──────────┬───────────┘
//!            │ next_batch(tick)
//!            ▼
//!   TransactionBuffer { tick, schema_version, commit_ts, changes }
//! ```
//!
//! # Example
//!
//! ```rust
//! use cdc_generator::{ChangeGenerator, SimulationClock, WorkloadConfig};
//! use chrono::{TimeZone, Utc};
//! use std::time::Duration;
//!
//! let workload = WorkloadConfig::from_yaml(r#"
//! seed: 7
//! tables:
//!   - name: users
//!     primary_key:
//!       name: id
//!       type: uuid
//!       generator:
//!         type: uuid_v4
//!     columns:
//!       - name: email
//!         type: text
//!         generator:
//!           type: pattern
//!           pattern: "user_{index}@example.com"
//! "#).unwrap();
//!
//! let clock = SimulationClock::new(
//!     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     Duration::from_secs(1),
//! );
//! let mut generator = ChangeGenerator::new(workload, clock).unwrap();
//! let txn = generator.next_batch(1).unwrap();
//! assert_eq!(txn.changes.len(), 1);
//! ```
//!
//! # Generators
//!
//! - `uuid_v4` - Random UUID v4
//! - `sequential` - Sequential integers
//! - `pattern` - Pattern strings with placeholders (`{index}`, `{uuid}`, `{rand:N}`)
//! - `int_range` - Random integers in a range
//! - `float_range` - Random floats in a range
//! - `decimal_range` - Random decimals at the column's scale
//! - `timestamp_range` - Random timestamps in a range
//! - `sim_time` - Commit time of the generating tick
//! - `weighted_bool` - Boolean with a configurable true weight
//! - `one_of` - Random choice from a list
//! - `static` - Fixed value
//! - `null` - Always null

pub mod clock;
pub mod generator;
pub mod generators;
pub mod row_store;
pub mod workload;

pub use clock::{ClockMode, SimulationClock, TickPacer};
pub use generator::{tick_seed, ChangeGenerator, GeneratorError};
pub use row_store::{Row, RowStore, RowStoreError, SelectionPolicy, Tombstone};
pub use workload::{
    ColumnWorkload, GeneratorConfig, OpRatios, ReplicaIdentity, ScheduledEvolution, SizeWeight,
    TableWorkload, TombstoneRetention, TransactionSize, WorkloadConfig, WorkloadError,
};
