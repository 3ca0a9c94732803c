//! Table and schema definitions for the simulated database.
//!
//! ## Type Hierarchy
//!
//! **Declarative types** (as written in workload configuration):
//! - `ColumnSpec` - Column name, type, nullability and default
//! - `TableSpec` - Table with a primary key and columns
//!
//! **Published types** (immutable once part of a schema version):
//! - `ColumnDefinition` - Column with a stable attribute number
//! - `TableDefinition` - Table as of a given schema version
//! - `SchemaSnapshot` - All tables at one `SchemaVersion`

use crate::evolution::EvolutionOp;
use crate::types::ColumnType;
use crate::values::{RowImage, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// An evolution operation was rejected; the registry is unchanged.
    #[error("Invalid evolution on table '{table}': {reason}")]
    InvalidEvolution { table: String, reason: String },

    /// A table definition is malformed.
    #[error("Invalid table definition '{table}': {reason}")]
    InvalidTable { table: String, reason: String },

    /// Table not found in schema
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column not found in table schema
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Schema version was never published
    #[error("Unknown schema version: {0}")]
    UnknownSchemaVersion(SchemaVersion),
}

impl SchemaError {
    pub(crate) fn invalid_evolution(table: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEvolution {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Versions
// ============================================================================

/// Monotonically increasing schema version number. Version 0 is the
/// initial schema.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    /// The version following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ============================================================================
// Declarative Types
// ============================================================================

/// Column as declared in configuration or an `AddColumn` evolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether this column is nullable
    #[serde(default)]
    pub nullable: bool,

    /// Value given to existing rows when the column is added
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnSpec {
    /// Create a new non-nullable column spec.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
        }
    }

    /// Create a new nullable column spec.
    pub fn nullable(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, column_type)
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Table as declared in configuration or a `CreateTable` evolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Primary key column
    pub primary_key: ColumnSpec,
    /// Non-key columns
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

// ============================================================================
// Published Types
// ============================================================================

/// Column definition inside a published table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    /// Attribute number, stable across renames and never reused in a table
    pub id: u16,

    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether this column is nullable
    #[serde(default)]
    pub nullable: bool,

    /// Whether this column is the primary key
    #[serde(default)]
    pub primary_key: bool,

    /// Default applied to rows that predate the column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Set when a lossy type change produced this column
    #[serde(default)]
    pub narrowed: bool,
}

impl ColumnDefinition {
    fn from_spec(id: u16, spec: &ColumnSpec, primary_key: bool) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            column_type: spec.column_type.clone(),
            nullable: spec.nullable && !primary_key,
            primary_key,
            default: spec.default.clone(),
            narrowed: false,
        }
    }

    /// Value for rows that existed before this column was added.
    pub fn backfill_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// Table definition as of one schema version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    /// Table name
    pub name: String,

    /// Ordered columns (primary key first)
    pub columns: Vec<ColumnDefinition>,

    /// Schema version in which this table was introduced or last modified
    pub modified_in: SchemaVersion,

    /// Next attribute number to hand out
    pub next_column_id: u16,
}

impl TableDefinition {
    /// Build and validate a table definition from its declaration.
    pub fn from_spec(spec: &TableSpec, version: SchemaVersion) -> Result<Self, SchemaError> {
        let mut columns = Vec::with_capacity(spec.columns.len() + 1);
        columns.push(ColumnDefinition::from_spec(1, &spec.primary_key, true));
        for (idx, column) in spec.columns.iter().enumerate() {
            columns.push(ColumnDefinition::from_spec(idx as u16 + 2, column, false));
        }

        let table = Self {
            name: spec.name.clone(),
            next_column_id: columns.len() as u16 + 1,
            columns,
            modified_in: version,
        };
        table.validate()?;
        Ok(table)
    }

    /// Check structural invariants: a valid name, one primary key, unique column names.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidTable {
            table: self.name.clone(),
            reason,
        };

        if !is_valid_identifier(&self.name) {
            return Err(invalid(
                "table names must be non-empty and use [A-Za-z0-9_-] without a leading '_'"
                    .to_string(),
            ));
        }

        let pk_count = self.columns.iter().filter(|c| c.primary_key).count();
        if pk_count != 1 {
            return Err(invalid(format!(
                "expected exactly one primary key column, found {pk_count}"
            )));
        }

        let pk = self.primary_key();
        if !matches!(
            pk.column_type,
            ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 | ColumnType::Uuid
        ) && !pk.column_type.is_textual()
        {
            return Err(invalid(format!(
                "primary key type {} is not supported",
                pk.column_type
            )));
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(invalid("column names must not be empty".to_string()));
            }
            if self.columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(invalid(format!("duplicate column '{}'", column.name)));
            }
        }
        Ok(())
    }

    /// The primary key column.
    pub fn primary_key(&self) -> &ColumnDefinition {
        // validate() guarantees exactly one
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .unwrap_or(&self.columns[0])
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get a column by attribute number.
    pub fn column_by_id(&self, id: u16) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Get all column names, primary key first.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Non-key columns.
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.primary_key)
    }
}

/// Check that a name is usable as a table name and partition key.
///
/// Names starting with `_` are reserved for sink metadata.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Immutable snapshot of every table at one schema version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaSnapshot {
    /// Version of this snapshot
    pub version: SchemaVersion,

    /// Table definitions, in creation order
    pub tables: Vec<TableDefinition>,

    /// Evolution that produced this version (`None` for the initial schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<EvolutionOp>,
}

impl SchemaSnapshot {
    /// Build the initial snapshot from table declarations.
    pub fn initial(specs: &[TableSpec]) -> Result<Self, SchemaError> {
        let mut tables: Vec<TableDefinition> = Vec::with_capacity(specs.len());
        for spec in specs {
            if tables.iter().any(|t| t.name == spec.name) {
                return Err(SchemaError::InvalidTable {
                    table: spec.name.clone(),
                    reason: "table declared twice".to_string(),
                });
            }
            tables.push(TableDefinition::from_spec(spec, SchemaVersion(0))?);
        }
        Ok(Self {
            version: SchemaVersion(0),
            tables,
            change: None,
        })
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Get a table by name or fail with `TableNotFound`.
    pub fn table(&self, name: &str) -> Result<&TableDefinition, SchemaError> {
        self.get_table(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }

    /// Get all table names in the schema.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Map a row image between two versions of the same table.
    ///
    /// Columns are matched by attribute number: renamed columns follow
    /// their new name, dropped columns disappear, columns added after
    /// `from` take their backfill value, and changed types are converted.
    /// Columns absent from `values` stay absent.
    pub fn project(values: &RowImage, from: &TableDefinition, to: &TableDefinition) -> RowImage {
        let mut projected = RowImage::new();
        for column in &to.columns {
            match from.column_by_id(column.id) {
                Some(old) => {
                    if let Some(value) = values.get(&old.name) {
                        let converted = value
                            .convert_to(&column.column_type)
                            .unwrap_or(Value::Null);
                        projected.insert(column.name.clone(), converted);
                    }
                }
                None => {
                    projected.insert(column.name.clone(), column.backfill_value());
                }
            }
        }
        projected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_spec() -> TableSpec {
        TableSpec {
            name: "orders".to_string(),
            primary_key: ColumnSpec::new("id", ColumnType::Int64),
            columns: vec![
                ColumnSpec::new("status", ColumnType::Text),
                ColumnSpec::nullable("note", ColumnType::VarChar { length: 32 }),
            ],
        }
    }

    #[test]
    fn test_table_from_spec_assigns_ids() {
        let table = TableDefinition::from_spec(&orders_spec(), SchemaVersion(0)).unwrap();

        assert_eq!(table.column_names(), vec!["id", "status", "note"]);
        assert_eq!(table.primary_key().name, "id");
        assert_eq!(table.get_column("status").unwrap().id, 2);
        assert_eq!(table.next_column_id, 4);
        assert!(table.get_column("note").unwrap().nullable);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut spec = orders_spec();
        spec.columns.push(ColumnSpec::new("status", ColumnType::Int32));

        let result = TableDefinition::from_spec(&spec, SchemaVersion(0));
        assert!(matches!(result, Err(SchemaError::InvalidTable { .. })));
    }

    #[test]
    fn test_reserved_table_name_rejected() {
        let mut spec = orders_spec();
        spec.name = "_schemas".to_string();
        assert!(TableDefinition::from_spec(&spec, SchemaVersion(0)).is_err());

        spec.name = "a/b".to_string();
        assert!(TableDefinition::from_spec(&spec, SchemaVersion(0)).is_err());
    }

    #[test]
    fn test_unsupported_primary_key_type() {
        let mut spec = orders_spec();
        spec.primary_key = ColumnSpec::new("id", ColumnType::Float64);
        assert!(TableDefinition::from_spec(&spec, SchemaVersion(0)).is_err());
    }

    #[test]
    fn test_initial_snapshot_rejects_duplicate_tables() {
        let result = SchemaSnapshot::initial(&[orders_spec(), orders_spec()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_project_follows_ids() {
        let from = TableDefinition::from_spec(&orders_spec(), SchemaVersion(0)).unwrap();

        // status renamed to state, note dropped, shipped added
        let mut to = from.clone();
        to.columns[1].name = "state".to_string();
        to.columns.retain(|c| c.name != "note");
        to.columns.push(ColumnDefinition {
            id: 4,
            name: "shipped".to_string(),
            column_type: ColumnType::Bool,
            nullable: false,
            primary_key: false,
            default: Some(Value::Bool(false)),
            narrowed: false,
        });

        let mut values = RowImage::new();
        values.insert("id".to_string(), Value::Int64(1));
        values.insert("status".to_string(), Value::Text("new".to_string()));
        values.insert("note".to_string(), Value::Null);

        let projected = SchemaSnapshot::project(&values, &from, &to);
        assert_eq!(projected.get("id"), Some(&Value::Int64(1)));
        assert_eq!(
            projected.get("state"),
            Some(&Value::Text("new".to_string()))
        );
        assert_eq!(projected.get("shipped"), Some(&Value::Bool(false)));
        assert!(!projected.contains_key("note"));
        assert!(!projected.contains_key("status"));
    }

    #[test]
    fn test_project_keeps_absent_columns_absent() {
        let table = TableDefinition::from_spec(&orders_spec(), SchemaVersion(0)).unwrap();

        let mut key_only = RowImage::new();
        key_only.insert("id".to_string(), Value::Int64(9));

        let projected = SchemaSnapshot::project(&key_only, &table, &table);
        assert_eq!(projected.len(), 1);
    }
}
