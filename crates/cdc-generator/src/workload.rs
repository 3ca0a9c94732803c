//! Typed workload configuration.
//!
//! A workload describes the simulated database: its tables and the
//! generator used for each column, the mix of operations, how many changes
//! a transaction holds, and a timeline of schema evolutions.
//!
//! ```yaml
//! seed: 42
//! tables:
//!   - name: orders
//!     weight: 3
//!     replica_identity: full
//!     primary_key:
//!       name: id
//!       type: big_int
//!       generator:
//!         type: sequential
//!         start: 1
//!     columns:
//!       - name: status
//!         type: text
//!         generator:
//!           type: one_of
//!           values: [pending, paid, shipped]
//! op_ratios:
//!   insert: 0.6
//!   update: 0.3
//!   delete: 0.1
//! transaction_size:
//!   type: uniform
//!   min: 1
//!   max: 4
//! evolution_schedule:
//!   - at_tick: 11
//!     operation:
//!       op: add_column
//!       table: orders
//!       column:
//!         name: shipped_at
//!         type: timestamp_tz
//!         nullable: true
//!     generators:
//!       shipped_at:
//!         type: sim_time
//! ```

use crate::row_store::SelectionPolicy;
use cdc_core::{ColumnSpec, ColumnType, EvolutionOp, TableSpec, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Error type for workload loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// Error reading workload file
    #[error("Failed to read workload file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Semantically invalid workload
    #[error("Invalid workload: {0}")]
    Invalid(String),
}

/// Value generator configuration for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Generate UUIDs (v4) from the seeded RNG
    UuidV4,

    /// Generate sequential integers
    Sequential {
        /// Starting value
        #[serde(default)]
        start: i64,
    },

    /// Generate values using a pattern with placeholders
    Pattern {
        /// Pattern string (supports `{index}`, `{uuid}`, `{rand:N}`)
        pattern: String,
    },

    /// Generate random integers in a range
    IntRange {
        /// Minimum value (inclusive)
        min: i64,
        /// Maximum value (inclusive)
        max: i64,
    },

    /// Generate random floats in a range
    FloatRange {
        /// Minimum value (inclusive)
        min: f64,
        /// Maximum value (inclusive)
        max: f64,
    },

    /// Generate random decimals in a range
    DecimalRange {
        /// Minimum value (inclusive)
        min: f64,
        /// Maximum value (inclusive)
        max: f64,
    },

    /// Generate timestamps in a range
    TimestampRange {
        /// Start timestamp (RFC 3339 or `YYYY-MM-DD`)
        start: String,
        /// End timestamp (RFC 3339 or `YYYY-MM-DD`)
        end: String,
    },

    /// The simulated commit time of the transaction
    SimTime,

    /// Generate weighted boolean values
    WeightedBool {
        /// Weight for true value (0.0 to 1.0)
        true_weight: f64,
    },

    /// Generate random selection from a pool of values
    OneOf {
        /// Pool of values to select from
        values: Vec<serde_yaml::Value>,
    },

    /// Generate a static value
    Static {
        /// The static value to use
        value: serde_yaml::Value,
    },

    /// Generate null values (for nullable fields)
    Null,
}

impl GeneratorConfig {
    /// Whether this generator may produce primary keys.
    pub fn is_key_generator(&self) -> bool {
        matches!(self, Self::Sequential { .. } | Self::UuidV4)
    }
}

/// Column with generator config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnWorkload {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether this column is nullable
    #[serde(default)]
    pub nullable: bool,

    /// Default value for rows that predate the column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Generator configuration; columns without one keep their default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorConfig>,
}

impl ColumnWorkload {
    /// Convert to a column declaration (discarding generator info).
    pub fn to_column_spec(&self) -> ColumnSpec {
        ColumnSpec {
            name: self.name.clone(),
            column_type: self.column_type.clone(),
            nullable: self.nullable,
            default: self.default.clone(),
        }
    }
}

/// What an update or delete event carries as its before image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaIdentity {
    /// Primary key only; other columns are absent
    #[default]
    Default,
    /// Every column of the old row
    Full,
}

fn default_weight() -> u32 {
    1
}

/// Table with generators and sampling weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWorkload {
    /// Table name
    pub name: String,

    /// Relative frequency of this table when sampling a change target
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Before-image policy
    #[serde(default)]
    pub replica_identity: ReplicaIdentity,

    /// Primary key column with generator
    pub primary_key: ColumnWorkload,

    /// Non-key columns with generators
    #[serde(default)]
    pub columns: Vec<ColumnWorkload>,
}

impl TableWorkload {
    /// Convert to a table declaration (discarding generator info).
    pub fn to_table_spec(&self) -> TableSpec {
        TableSpec {
            name: self.name.clone(),
            primary_key: self.primary_key.to_column_spec(),
            columns: self.columns.iter().map(|c| c.to_column_spec()).collect(),
        }
    }
}

/// Relative frequency of each operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpRatios {
    #[serde(default)]
    pub insert: f64,
    #[serde(default)]
    pub update: f64,
    #[serde(default)]
    pub delete: f64,
}

impl Default for OpRatios {
    fn default() -> Self {
        Self {
            insert: 1.0,
            update: 0.0,
            delete: 0.0,
        }
    }
}

/// One entry of a weighted transaction size distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeWeight {
    pub size: usize,
    pub weight: u32,
}

/// Number of changes per transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionSize {
    /// Always the same size
    Fixed { size: usize },
    /// Uniform in `min..=max`
    Uniform { min: usize, max: usize },
    /// Sampled from weighted sizes
    Weighted { sizes: Vec<SizeWeight> },
}

impl Default for TransactionSize {
    fn default() -> Self {
        Self::Fixed { size: 1 }
    }
}

/// A schema evolution injected at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvolution {
    /// Tick before whose changes the evolution is applied
    pub at_tick: u64,

    /// The evolution to apply
    pub operation: EvolutionOp,

    /// Generators for columns introduced by the evolution, by column name
    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorConfig>,

    /// Sampling weight of a table created by the evolution
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Before-image policy of a table created by the evolution
    #[serde(default)]
    pub replica_identity: ReplicaIdentity,
}

/// How long tombstoned rows stay resolvable in the row store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TombstoneRetention {
    /// Never purge
    #[default]
    Forever,
    /// Purge tombstones older than this many ticks
    Ticks { ticks: u64 },
}

/// Full workload description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Seed for every random decision
    #[serde(default)]
    pub seed: u64,

    /// Initial tables
    pub tables: Vec<TableWorkload>,

    /// Operation mix
    #[serde(default)]
    pub op_ratios: OpRatios,

    /// Transaction size distribution
    #[serde(default)]
    pub transaction_size: TransactionSize,

    /// Schema evolution timeline
    #[serde(default)]
    pub evolution_schedule: Vec<ScheduledEvolution>,

    /// Row selection policy for updates and deletes
    #[serde(default)]
    pub row_selection: SelectionPolicy,

    /// Tombstone retention
    #[serde(default)]
    pub tombstone_retention: TombstoneRetention,
}

impl WorkloadConfig {
    /// Load a workload from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WorkloadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a workload from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkloadError> {
        let workload: WorkloadConfig = serde_yaml::from_str(yaml)?;
        workload.validate()?;
        Ok(workload)
    }

    /// Initial table declarations.
    pub fn table_specs(&self) -> Vec<TableSpec> {
        self.tables.iter().map(|t| t.to_table_spec()).collect()
    }

    /// Check everything serde cannot.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        let invalid = |msg: String| Err(WorkloadError::Invalid(msg));

        if self.tables.is_empty() {
            return invalid("at least one table is required".to_string());
        }

        let ratios = &self.op_ratios;
        for (name, ratio) in [
            ("insert", ratios.insert),
            ("update", ratios.update),
            ("delete", ratios.delete),
        ] {
            if !ratio.is_finite() || ratio < 0.0 {
                return invalid(format!("op ratio '{name}' must be a non-negative number"));
            }
        }
        if ratios.insert + ratios.update + ratios.delete <= 0.0 {
            return invalid("op ratios must not all be zero".to_string());
        }

        match &self.transaction_size {
            TransactionSize::Fixed { size } if *size == 0 => {
                return invalid("transaction size must be at least 1".to_string())
            }
            TransactionSize::Uniform { min, max } if *min == 0 || min > max => {
                return invalid(format!(
                    "uniform transaction size needs 1 <= min <= max, got {min}..={max}"
                ))
            }
            TransactionSize::Weighted { sizes } => {
                if sizes.iter().any(|s| s.size == 0) {
                    return invalid("weighted transaction sizes must be at least 1".to_string());
                }
                if sizes.iter().map(|s| u64::from(s.weight)).sum::<u64>() == 0 {
                    return invalid("weighted transaction sizes need a positive weight".to_string());
                }
            }
            _ => {}
        }

        if self.tables.iter().all(|t| t.weight == 0) {
            return invalid("at least one table needs a positive weight".to_string());
        }

        for table in &self.tables {
            match &table.primary_key.generator {
                Some(generator) if generator.is_key_generator() => {}
                _ => {
                    return invalid(format!(
                        "primary key of table '{}' needs a sequential or uuid_v4 generator",
                        table.name
                    ))
                }
            }
            for column in &table.columns {
                if column.generator.is_none() && !column.nullable && column.default.is_none() {
                    return invalid(format!(
                        "column '{}.{}' is NOT NULL and has neither a generator nor a default",
                        table.name, column.name
                    ));
                }
            }
        }

        if let SelectionPolicy::RecencyBiased { bias } = self.row_selection {
            if !bias.is_finite() || bias <= 0.0 {
                return invalid(format!("recency bias must be positive, got {bias}"));
            }
        }

        for evolution in &self.evolution_schedule {
            if evolution.at_tick == 0 {
                return invalid("evolutions are scheduled at ticks starting from 1".to_string());
            }
            if let EvolutionOp::CreateTable { table } = &evolution.operation {
                match evolution.generators.get(&table.primary_key.name) {
                    Some(generator) if generator.is_key_generator() => {}
                    _ => {
                        return invalid(format!(
                            "created table '{}' needs a sequential or uuid_v4 key generator",
                            table.name
                        ))
                    }
                }
            }
        }

        Ok(())
    }
}
