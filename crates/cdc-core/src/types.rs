//! Semantic column types for the simulated relational schema.
//!
//! `ColumnType` is the type universe of the simulated database. It is
//! deliberately narrower than a real PostgreSQL catalog: it only needs to
//! carry enough information to generate realistic values, render them in the
//! text format used on the wire, and classify type changes as widening or
//! narrowing during schema evolution.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Semantic type of a column.
///
/// # YAML Format
///
/// Simple types can be specified as strings:
/// ```yaml
/// type: uuid
/// type: big_int
/// type: text
/// ```
///
/// Parameterised types use object format:
/// ```yaml
/// type:
///   type: var_char
///   length: 255
/// type:
///   type: decimal
///   precision: 10
///   scale: 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Boolean value
    Bool,

    /// 16-bit signed integer
    Int16,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 32-bit IEEE 754 floating point
    Float32,

    /// 64-bit IEEE 754 floating point
    Float64,

    /// Exact decimal with specified precision and scale
    Decimal {
        /// Total number of digits
        precision: u8,
        /// Number of digits after the decimal point
        scale: u8,
    },

    /// Variable-length character string with max length
    VarChar {
        /// Maximum length in characters
        length: u16,
    },

    /// Unlimited text
    Text,

    /// UUID (128-bit)
    Uuid,

    /// Timestamp with timezone, microsecond precision
    Timestamp,

    /// JSON document
    Json,
}

/// Classification of a column type change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeConversion {
    /// Source and target are the same type.
    Identity,
    /// Every source value is representable in the target type.
    Widening,
    /// Some source values lose precision or get truncated.
    Narrowing,
    /// No meaningful conversion exists.
    Incompatible,
}

impl ColumnType {
    /// Whether values of this type are rendered as strings.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::VarChar { .. } | Self::Text)
    }

    /// Number of decimal digits needed to represent any integer of this type.
    fn integer_digits(&self) -> Option<u8> {
        match self {
            Self::Int16 => Some(5),
            Self::Int32 => Some(10),
            Self::Int64 => Some(19),
            _ => None,
        }
    }

    fn integer_rank(&self) -> Option<u8> {
        match self {
            Self::Int16 => Some(1),
            Self::Int32 => Some(2),
            Self::Int64 => Some(3),
            _ => None,
        }
    }

    /// Classify a change from `self` to `target`.
    pub fn conversion_to(&self, target: &ColumnType) -> TypeConversion {
        use ColumnType::*;
        use TypeConversion::*;

        if self == target {
            return Identity;
        }

        if let (Some(from), Some(to)) = (self.integer_rank(), target.integer_rank()) {
            return if to > from { Widening } else { Narrowing };
        }

        match (self, target) {
            (Bool, Int16 | Int32 | Int64) => Widening,
            (Int16 | Int32, Float64) | (Int16, Float32) => Widening,
            (Int32 | Int64, Float32) | (Int64, Float64) => Narrowing,
            (Int16 | Int32 | Int64, Decimal { precision, scale }) => {
                let digits = self.integer_digits().unwrap_or(u8::MAX);
                if precision.saturating_sub(*scale) >= digits {
                    Widening
                } else {
                    Narrowing
                }
            }
            (Float32, Float64) => Widening,
            (Float64, Float32) => Narrowing,
            (Float32 | Float64 | Decimal { .. }, Int16 | Int32 | Int64) => Narrowing,
            (Decimal { .. }, Float32 | Float64) | (Float32 | Float64, Decimal { .. }) => Narrowing,
            (
                Decimal {
                    precision: p1,
                    scale: s1,
                },
                Decimal {
                    precision: p2,
                    scale: s2,
                },
            ) => {
                if s2 >= s1 && p2.saturating_sub(*s2) >= p1.saturating_sub(*s1) {
                    Widening
                } else {
                    Narrowing
                }
            }
            (VarChar { length: from }, VarChar { length: to }) => {
                if to >= from {
                    Widening
                } else {
                    Narrowing
                }
            }
            (VarChar { .. }, Text) => Widening,
            (Text, VarChar { .. }) => Narrowing,
            (_, Text) => Widening,
            (Json, _) | (_, Json) => Incompatible,
            (_, VarChar { .. }) => Narrowing,
            _ => Incompatible,
        }
    }

    /// Canonical name used in YAML, JSON and log output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int16 => "small_int",
            Self::Int32 => "int",
            Self::Int64 => "big_int",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Decimal { .. } => "decimal",
            Self::VarChar { .. } => "var_char",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp_tz",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Self::VarChar { length } => write!(f, "var_char({length})"),
            other => f.write_str(other.name()),
        }
    }
}

// Custom serialization/deserialization for ColumnType
// Supports both simple string format ("uuid", "int") and object format ({"type": "var_char", "length": 255})

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            Self::Decimal { precision, scale } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "decimal")?;
                map.serialize_entry("precision", precision)?;
                map.serialize_entry("scale", scale)?;
                map.end()
            }
            Self::VarChar { length } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "var_char")?;
                map.serialize_entry("length", length)?;
                map.end()
            }
            simple => serializer.serialize_str(simple.name()),
        }
    }
}

fn simple_type(name: &str) -> Option<ColumnType> {
    match name {
        "bool" | "boolean" => Some(ColumnType::Bool),
        "small_int" | "smallint" => Some(ColumnType::Int16),
        "int" | "integer" => Some(ColumnType::Int32),
        "big_int" | "bigint" => Some(ColumnType::Int64),
        "float" | "real" => Some(ColumnType::Float32),
        "double" => Some(ColumnType::Float64),
        "text" => Some(ColumnType::Text),
        "uuid" => Some(ColumnType::Uuid),
        "timestamp_tz" | "timestamptz" | "timestamp" => Some(ColumnType::Timestamp),
        "json" | "jsonb" => Some(ColumnType::Json),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{Error, MapAccess, Visitor};

        struct ColumnTypeVisitor;

        impl<'de> Visitor<'de> for ColumnTypeVisitor {
            type Value = ColumnType;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or map representing a ColumnType")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                simple_type(value).ok_or_else(|| E::custom(format!("unknown simple type: {value}")))
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut type_name: Option<String> = None;
                let mut fields: HashMap<String, serde_json::Value> = HashMap::new();

                while let Some(key) = map.next_key::<String>()? {
                    if key == "type" {
                        type_name = Some(map.next_value()?);
                    } else {
                        fields.insert(key, map.next_value()?);
                    }
                }

                let type_name = type_name.ok_or_else(|| M::Error::missing_field("type"))?;

                if let Some(simple) = simple_type(&type_name) {
                    return Ok(simple);
                }

                match type_name.as_str() {
                    "decimal" | "numeric" => {
                        let precision = get_field_required(&fields, "precision")?;
                        let scale = get_field_required(&fields, "scale")?;
                        Ok(ColumnType::Decimal { precision, scale })
                    }
                    "var_char" | "varchar" => {
                        let length = get_field_required(&fields, "length")?;
                        Ok(ColumnType::VarChar { length })
                    }
                    _ => Err(M::Error::custom(format!("unknown type: {type_name}"))),
                }
            }
        }

        deserializer.deserialize_any(ColumnTypeVisitor)
    }
}

fn get_field_required<T: for<'de> Deserialize<'de>, E: serde::de::Error>(
    fields: &HashMap<String, serde_json::Value>,
    key: &'static str,
) -> Result<T, E> {
    let value = fields.get(key).ok_or_else(|| E::missing_field(key))?;
    serde_json::from_value(value.clone())
        .map_err(|e| E::custom(format!("invalid field '{key}': {e}")))
}
