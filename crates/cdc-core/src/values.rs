//! Column values and row images.
//!
//! A [`RowImage`] is a map from column name to [`Value`]. The distinction
//! between a column that is *absent* from the map (its value was not
//! captured, e.g. a key-only before image) and a column that is present with
//! [`Value::Null`] (a SQL null) is significant and survives encoding.

use crate::types::ColumnType;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Row image keyed by column name. Missing keys are "not captured".
pub type RowImage = BTreeMap<String, Value>;

/// Error converting between values and their text representation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    /// Text could not be parsed as the requested column type.
    #[error("invalid {column_type} literal: {text:?}")]
    InvalidLiteral {
        column_type: ColumnType,
        text: String,
    },

    /// Value does not belong to the given column type.
    #[error("value {value} does not match column type {column_type}")]
    TypeMismatch { value: String, column_type: ColumnType },
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// SQL null
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Exact decimal kept in its canonical string form
    Decimal(String),
    /// Character data (`text` and `var_char` columns)
    Text(String),
    /// UUID value
    Uuid(Uuid),
    /// Timestamp with timezone
    Timestamp(DateTime<Utc>),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(i) => Some(i64::from(*i)),
            Self::Int32(i) => Some(i64::from(*i)),
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value can be stored in a column of the given type.
    pub fn matches(&self, column_type: &ColumnType) -> bool {
        match (self, column_type) {
            (Self::Null, _) => true,
            (Self::Bool(_), ColumnType::Bool) => true,
            (Self::Int16(_), ColumnType::Int16) => true,
            (Self::Int32(_), ColumnType::Int32) => true,
            (Self::Int64(_), ColumnType::Int64) => true,
            (Self::Float32(_), ColumnType::Float32) => true,
            (Self::Float64(_), ColumnType::Float64) => true,
            (Self::Decimal(_), ColumnType::Decimal { .. }) => true,
            (Self::Text(s), ColumnType::VarChar { length }) => s.chars().count() <= *length as usize,
            (Self::Text(_), ColumnType::Text) => true,
            (Self::Uuid(_), ColumnType::Uuid) => true,
            (Self::Timestamp(_), ColumnType::Timestamp) => true,
            (Self::Json(_), ColumnType::Json) => true,
            _ => false,
        }
    }

    /// Render the value in wire text format. Returns `None` for null.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            Self::Null => return None,
            Self::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            Self::Int16(i) => i.to_string(),
            Self::Int32(i) => i.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::Float32(f) => f.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Decimal(s) | Self::Text(s) => s.clone(),
            Self::Uuid(u) => u.to_string(),
            Self::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Json(v) => v.to_string(),
        };
        Some(text)
    }

    /// Parse a wire text value for a column of the given type.
    pub fn from_text(text: &str, column_type: &ColumnType) -> Result<Self, ValueError> {
        let invalid = || ValueError::InvalidLiteral {
            column_type: column_type.clone(),
            text: text.to_string(),
        };

        let value = match column_type {
            ColumnType::Bool => match text {
                "t" | "true" => Self::Bool(true),
                "f" | "false" => Self::Bool(false),
                _ => return Err(invalid()),
            },
            ColumnType::Int16 => Self::Int16(text.parse().map_err(|_| invalid())?),
            ColumnType::Int32 => Self::Int32(text.parse().map_err(|_| invalid())?),
            ColumnType::Int64 => Self::Int64(text.parse().map_err(|_| invalid())?),
            ColumnType::Float32 => Self::Float32(text.parse().map_err(|_| invalid())?),
            ColumnType::Float64 => Self::Float64(text.parse().map_err(|_| invalid())?),
            ColumnType::Decimal { .. } => {
                text.parse::<f64>().map_err(|_| invalid())?;
                Self::Decimal(text.to_string())
            }
            ColumnType::VarChar { .. } | ColumnType::Text => Self::Text(text.to_string()),
            ColumnType::Uuid => Self::Uuid(Uuid::parse_str(text).map_err(|_| invalid())?),
            ColumnType::Timestamp => Self::Timestamp(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| invalid())?
                    .with_timezone(&Utc),
            ),
            ColumnType::Json => Self::Json(serde_json::from_str(text).map_err(|_| invalid())?),
        };
        Ok(value)
    }

    /// Convert this value to another column type, applying truncation or
    /// rounding where the target is narrower. Returns `None` when no
    /// conversion exists.
    pub fn convert_to(&self, target: &ColumnType) -> Option<Value> {
        if self.is_null() {
            return Some(Self::Null);
        }
        if self.matches(target) {
            return Some(self.clone());
        }

        let converted = match target {
            ColumnType::Text => Self::Text(self.to_text()?),
            ColumnType::VarChar { length } => {
                let text = self.to_text()?;
                Self::Text(text.chars().take(*length as usize).collect())
            }
            ColumnType::Int16 => Self::Int16(clamp_i64(self.as_numeric_i64()?, i16::MIN, i16::MAX)),
            ColumnType::Int32 => Self::Int32(clamp_i64(self.as_numeric_i64()?, i32::MIN, i32::MAX)),
            ColumnType::Int64 => Self::Int64(self.as_numeric_i64()?),
            ColumnType::Float32 => Self::Float32(self.as_f64()? as f32),
            ColumnType::Float64 => Self::Float64(self.as_f64()?),
            ColumnType::Decimal { scale, .. } => {
                Self::Decimal(format!("{:.*}", *scale as usize, self.as_f64()?))
            }
            ColumnType::Bool | ColumnType::Uuid | ColumnType::Timestamp | ColumnType::Json => {
                return None
            }
        };
        Some(converted)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int16(i) => Some(f64::from(*i)),
            Self::Int32(i) => Some(f64::from(*i)),
            Self::Int64(i) => Some(*i as f64),
            Self::Float32(f) => Some(f64::from(*f)),
            Self::Float64(f) => Some(*f),
            Self::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_numeric_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int16(_) | Self::Int32(_) | Self::Int64(_) => self.as_i64(),
            other => other.as_f64().map(|f| f.round() as i64),
        }
    }
}

fn clamp_i64<T: TryFrom<i64>>(value: i64, min: T, max: T) -> T {
    T::try_from(value).unwrap_or(if value < 0 { min } else { max })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// Primary key of a row, restricted to hashable, totally ordered types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// Integer key (`small_int`, `int`, `big_int`)
    Int(i64),
    /// UUID key
    Uuid(Uuid),
    /// Character key
    Text(String),
}

impl PrimaryKey {
    /// Extract a primary key from a column value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => value.as_i64().map(Self::Int),
            Value::Uuid(u) => Some(Self::Uuid(*u)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Render the key as a value of the given column type.
    pub fn to_value(&self, column_type: &ColumnType) -> Value {
        match (self, column_type) {
            (Self::Int(i), ColumnType::Int16) => Value::Int16(*i as i16),
            (Self::Int(i), ColumnType::Int32) => Value::Int32(*i as i32),
            (Self::Int(i), _) => Value::Int64(*i),
            (Self::Uuid(u), _) => Value::Uuid(*u),
            (Self::Text(s), _) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}
