//! Schema evolution operations.
//!
//! Each operation is validated against the current snapshot and, when
//! accepted, produces the next snapshot. Validation failures never touch the
//! input snapshot, which makes every evolution all-or-nothing.

use crate::schema::{
    is_valid_identifier, ColumnDefinition, ColumnSpec, SchemaError, SchemaSnapshot,
    TableDefinition, TableSpec,
};
use crate::types::{ColumnType, TypeConversion};
use serde::{Deserialize, Serialize};

/// A compatible schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EvolutionOp {
    /// Introduce a new table.
    CreateTable { table: TableSpec },

    /// Append a column. Existing rows receive the default (or null).
    AddColumn { table: String, column: ColumnSpec },

    /// Rename a non-key column.
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },

    /// Change the type of a non-key column.
    ///
    /// Narrowing changes must set `allow_lossy`; the resulting column is
    /// flagged as `narrowed`.
    ChangeType {
        table: String,
        column: String,
        new_type: ColumnType,
        #[serde(default)]
        allow_lossy: bool,
    },

    /// Remove a non-key column.
    DropColumn { table: String, column: String },
}

impl EvolutionOp {
    /// Name of the table this operation targets.
    pub fn table_name(&self) -> &str {
        match self {
            Self::CreateTable { table } => &table.name,
            Self::AddColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::ChangeType { table, .. }
            | Self::DropColumn { table, .. } => table,
        }
    }

    /// Short operation label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "create_table",
            Self::AddColumn { .. } => "add_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::ChangeType { .. } => "change_type",
            Self::DropColumn { .. } => "drop_column",
        }
    }

    /// Validate this operation against `current` and build the next snapshot.
    pub fn apply(&self, current: &SchemaSnapshot) -> Result<SchemaSnapshot, SchemaError> {
        let version = current.version.next();
        let mut next = current.clone();
        next.version = version;
        next.change = Some(self.clone());

        if let Self::CreateTable { table } = self {
            if current.get_table(&table.name).is_some() {
                return Err(SchemaError::invalid_evolution(
                    &table.name,
                    "table already exists",
                ));
            }
            let definition = TableDefinition::from_spec(table, version).map_err(|e| {
                SchemaError::invalid_evolution(&table.name, e.to_string())
            })?;
            next.tables.push(definition);
            return Ok(next);
        }

        let table_name = self.table_name();
        let table = next
            .tables
            .iter_mut()
            .find(|t| t.name == table_name)
            .ok_or_else(|| SchemaError::invalid_evolution(table_name, "table does not exist"))?;

        match self {
            Self::CreateTable { .. } => unreachable!("handled above"),
            Self::AddColumn { column, .. } => add_column(table, column)?,
            Self::RenameColumn { from, to, .. } => rename_column(table, from, to)?,
            Self::ChangeType {
                column,
                new_type,
                allow_lossy,
                ..
            } => change_type(table, column, new_type, *allow_lossy)?,
            Self::DropColumn { column, .. } => drop_column(table, column)?,
        }

        table.modified_in = version;
        table
            .validate()
            .map_err(|e| SchemaError::invalid_evolution(table_name, e.to_string()))?;
        Ok(next)
    }
}

fn existing_value_column<'a>(
    table: &'a mut TableDefinition,
    column: &str,
) -> Result<&'a mut ColumnDefinition, SchemaError> {
    let table_name = table.name.clone();
    let definition = table
        .columns
        .iter_mut()
        .find(|c| c.name == column)
        .ok_or_else(|| {
            SchemaError::invalid_evolution(&table_name, format!("column '{column}' does not exist"))
        })?;
    if definition.primary_key {
        return Err(SchemaError::invalid_evolution(
            &table_name,
            format!("column '{column}' is the primary key and cannot be changed"),
        ));
    }
    Ok(definition)
}

fn ensure_name_free(table: &TableDefinition, name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || !is_valid_identifier(name) {
        return Err(SchemaError::invalid_evolution(
            &table.name,
            format!("'{name}' is not a valid column name"),
        ));
    }
    if table.get_column(name).is_some() {
        return Err(SchemaError::invalid_evolution(
            &table.name,
            format!("column '{name}' already exists"),
        ));
    }
    Ok(())
}

fn add_column(table: &mut TableDefinition, column: &ColumnSpec) -> Result<(), SchemaError> {
    ensure_name_free(table, &column.name)?;

    match &column.default {
        None if !column.nullable => {
            return Err(SchemaError::invalid_evolution(
                &table.name,
                format!(
                    "column '{}' is NOT NULL and needs a default for existing rows",
                    column.name
                ),
            ))
        }
        Some(default) if default.is_null() && !column.nullable => {
            return Err(SchemaError::invalid_evolution(
                &table.name,
                format!("column '{}' is NOT NULL but its default is null", column.name),
            ))
        }
        Some(default) if !default.matches(&column.column_type) => {
            return Err(SchemaError::invalid_evolution(
                &table.name,
                format!(
                    "default {default} does not match type {} of column '{}'",
                    column.column_type, column.name
                ),
            ))
        }
        _ => {}
    }

    let id = table.next_column_id;
    table.next_column_id += 1;
    table.columns.push(ColumnDefinition {
        id,
        name: column.name.clone(),
        column_type: column.column_type.clone(),
        nullable: column.nullable,
        primary_key: false,
        default: column.default.clone(),
        narrowed: false,
    });
    Ok(())
}

fn rename_column(table: &mut TableDefinition, from: &str, to: &str) -> Result<(), SchemaError> {
    existing_value_column(table, from)?;
    ensure_name_free(table, to)?;
    let column = existing_value_column(table, from)?;
    column.name = to.to_string();
    Ok(())
}

fn change_type(
    table: &mut TableDefinition,
    column: &str,
    new_type: &ColumnType,
    allow_lossy: bool,
) -> Result<(), SchemaError> {
    let table_name = table.name.clone();
    let definition = existing_value_column(table, column)?;

    match definition.column_type.conversion_to(new_type) {
        TypeConversion::Identity => {
            return Err(SchemaError::invalid_evolution(
                &table_name,
                format!("column '{column}' already has type {new_type}"),
            ))
        }
        TypeConversion::Incompatible => {
            return Err(SchemaError::invalid_evolution(
                &table_name,
                format!(
                    "cannot convert column '{column}' from {} to {new_type}",
                    definition.column_type
                ),
            ))
        }
        TypeConversion::Narrowing if !allow_lossy => {
            return Err(SchemaError::invalid_evolution(
                &table_name,
                format!(
                    "changing column '{column}' from {} to {new_type} is lossy; set allow_lossy",
                    definition.column_type
                ),
            ))
        }
        TypeConversion::Narrowing => definition.narrowed = true,
        TypeConversion::Widening => {}
    }

    definition.default = match &definition.default {
        Some(default) => default.convert_to(new_type),
        None => None,
    };
    definition.column_type = new_type.clone();
    Ok(())
}

fn drop_column(table: &mut TableDefinition, column: &str) -> Result<(), SchemaError> {
    existing_value_column(table, column)?;
    table.columns.retain(|c| c.name != column);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Value;

    fn initial() -> SchemaSnapshot {
        SchemaSnapshot::initial(&[TableSpec {
            name: "orders".to_string(),
            primary_key: ColumnSpec::new("id", ColumnType::Int64),
            columns: vec![
                ColumnSpec::new("status", ColumnType::VarChar { length: 16 }),
                ColumnSpec::new("quantity", ColumnType::Int64),
            ],
        }])
        .unwrap()
    }

    fn assert_invalid(result: Result<SchemaSnapshot, SchemaError>) {
        assert!(
            matches!(result, Err(SchemaError::InvalidEvolution { .. })),
            "expected InvalidEvolution, got {result:?}"
        );
    }

    #[test]
    fn test_add_nullable_column() {
        let op = EvolutionOp::AddColumn {
            table: "orders".to_string(),
            column: ColumnSpec::nullable("shipped_at", ColumnType::Timestamp),
        };
        let next = op.apply(&initial()).unwrap();

        assert_eq!(next.version.0, 1);
        let orders = next.get_table("orders").unwrap();
        assert_eq!(orders.modified_in.0, 1);
        let shipped = orders.get_column("shipped_at").unwrap();
        assert_eq!(shipped.id, 4);
        assert_eq!(next.change, Some(op));
    }

    #[test]
    fn test_add_not_null_column_requires_default() {
        let op = EvolutionOp::AddColumn {
            table: "orders".to_string(),
            column: ColumnSpec::new("priority", ColumnType::Int32),
        };
        assert_invalid(op.apply(&initial()));

        let op = EvolutionOp::AddColumn {
            table: "orders".to_string(),
            column: ColumnSpec::new("priority", ColumnType::Int32).with_default(Value::Int32(0)),
        };
        assert!(op.apply(&initial()).is_ok());
    }

    #[test]
    fn test_add_column_default_type_mismatch() {
        let op = EvolutionOp::AddColumn {
            table: "orders".to_string(),
            column: ColumnSpec::new("priority", ColumnType::Int32)
                .with_default(Value::Text("high".to_string())),
        };
        assert_invalid(op.apply(&initial()));
    }

    #[test]
    fn test_add_duplicate_column() {
        let op = EvolutionOp::AddColumn {
            table: "orders".to_string(),
            column: ColumnSpec::nullable("status", ColumnType::Text),
        };
        assert_invalid(op.apply(&initial()));
    }

    #[test]
    fn test_rename_column() {
        let op = EvolutionOp::RenameColumn {
            table: "orders".to_string(),
            from: "status".to_string(),
            to: "state".to_string(),
        };
        let next = op.apply(&initial()).unwrap();
        let orders = next.get_table("orders").unwrap();
        assert!(orders.get_column("status").is_none());
        assert_eq!(orders.get_column("state").unwrap().id, 2);
    }

    #[test]
    fn test_rename_missing_column() {
        let op = EvolutionOp::RenameColumn {
            table: "orders".to_string(),
            from: "nope".to_string(),
            to: "state".to_string(),
        };
        assert_invalid(op.apply(&initial()));
    }

    #[test]
    fn test_rename_to_existing_name() {
        let op = EvolutionOp::RenameColumn {
            table: "orders".to_string(),
            from: "status".to_string(),
            to: "quantity".to_string(),
        };
        assert_invalid(op.apply(&initial()));
    }

    #[test]
    fn test_primary_key_is_immutable() {
        let ops = vec![
            EvolutionOp::RenameColumn {
                table: "orders".to_string(),
                from: "id".to_string(),
                to: "order_id".to_string(),
            },
            EvolutionOp::ChangeType {
                table: "orders".to_string(),
                column: "id".to_string(),
                new_type: ColumnType::Text,
                allow_lossy: true,
            },
            EvolutionOp::DropColumn {
                table: "orders".to_string(),
                column: "id".to_string(),
            },
        ];
        for op in ops {
            assert_invalid(op.apply(&initial()));
        }
    }

    #[test]
    fn test_change_type_widening() {
        let op = EvolutionOp::ChangeType {
            table: "orders".to_string(),
            column: "status".to_string(),
            new_type: ColumnType::Text,
            allow_lossy: false,
        };
        let next = op.apply(&initial()).unwrap();
        let status = next.get_table("orders").unwrap().get_column("status").unwrap();
        assert_eq!(status.column_type, ColumnType::Text);
        assert!(!status.narrowed);
    }

    #[test]
    fn test_change_type_narrowing_requires_flag() {
        let op = EvolutionOp::ChangeType {
            table: "orders".to_string(),
            column: "quantity".to_string(),
            new_type: ColumnType::Int16,
            allow_lossy: false,
        };
        assert_invalid(op.apply(&initial()));

        let op = EvolutionOp::ChangeType {
            table: "orders".to_string(),
            column: "quantity".to_string(),
            new_type: ColumnType::Int16,
            allow_lossy: true,
        };
        let next = op.apply(&initial()).unwrap();
        let quantity = next
            .get_table("orders")
            .unwrap()
            .get_column("quantity")
            .unwrap();
        assert!(quantity.narrowed);
    }

    #[test]
    fn test_change_type_incompatible() {
        let op = EvolutionOp::ChangeType {
            table: "orders".to_string(),
            column: "quantity".to_string(),
            new_type: ColumnType::Uuid,
            allow_lossy: true,
        };
        assert_invalid(op.apply(&initial()));
    }

    #[test]
    fn test_drop_column() {
        let op = EvolutionOp::DropColumn {
            table: "orders".to_string(),
            column: "quantity".to_string(),
        };
        let next = op.apply(&initial()).unwrap();
        assert_eq!(
            next.get_table("orders").unwrap().column_names(),
            vec!["id", "status"]
        );
    }

    #[test]
    fn test_create_table() {
        let op = EvolutionOp::CreateTable {
            table: TableSpec {
                name: "customers".to_string(),
                primary_key: ColumnSpec::new("id", ColumnType::Uuid),
                columns: vec![ColumnSpec::new("name", ColumnType::Text)],
            },
        };
        let next = op.apply(&initial()).unwrap();
        assert_eq!(next.table_names(), vec!["orders", "customers"]);
        assert_eq!(next.get_table("customers").unwrap().modified_in.0, 1);

        assert_invalid(op.apply(&next));
    }

    #[test]
    fn test_unknown_table() {
        let op = EvolutionOp::DropColumn {
            table: "missing".to_string(),
            column: "x".to_string(),
        };
        assert_invalid(op.apply(&initial()));
    }

    #[test]
    fn test_failed_evolution_leaves_input_untouched() {
        let before = initial();
        let op = EvolutionOp::RenameColumn {
            table: "orders".to_string(),
            from: "status".to_string(),
            to: "quantity".to_string(),
        };
        let _ = op.apply(&before);
        assert_eq!(before, initial());
    }

    #[test]
    fn test_yaml_format() {
        let op: EvolutionOp = serde_yaml::from_str(
            r#"
op: change_type
table: orders
column: quantity
new_type: small_int
allow_lossy: true
"#,
        )
        .unwrap();
        assert_eq!(op.kind(), "change_type");
        assert_eq!(op.table_name(), "orders");
    }
}
