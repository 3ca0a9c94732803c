//! Individual value generators for different data types.
//!
//! Every generator draws from the per-tick RNG only, so a tick always
//! produces the same values no matter when it is (re)played.

pub mod numeric;
pub mod pattern;
pub mod static_value;
pub mod timestamp;
pub mod uuid;

use crate::workload::GeneratorConfig;
use cdc_core::{ColumnType, Value};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Inputs a generator may depend on besides the RNG.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext {
    /// Per-table insert ordinal (`{index}`, `sequential`)
    pub index: u64,
    /// Commit time of the transaction being generated
    pub sim_time: DateTime<Utc>,
}

/// Generate a value based on the generator configuration, shaped for the
/// target column type.
///
/// Returns `None` when the generated value cannot be stored in the column.
pub fn generate_value_typed<R: Rng>(
    config: &GeneratorConfig,
    rng: &mut R,
    context: GenerationContext,
    target_type: &ColumnType,
) -> Option<Value> {
    let value = match config {
        GeneratorConfig::UuidV4 => uuid::generate_uuid_v4(rng),

        GeneratorConfig::Sequential { start } => {
            Value::Int64(start.wrapping_add(context.index as i64))
        }

        GeneratorConfig::Pattern { pattern } => {
            pattern::generate_pattern(pattern, rng, context.index)
        }

        GeneratorConfig::IntRange { min, max } => numeric::generate_int_range(rng, *min, *max),

        GeneratorConfig::FloatRange { min, max } => numeric::generate_float_range(rng, *min, *max),

        GeneratorConfig::DecimalRange { min, max } => {
            let scale = match target_type {
                ColumnType::Decimal { scale, .. } => *scale,
                _ => 2,
            };
            numeric::generate_decimal_range(rng, *min, *max, scale)
        }

        GeneratorConfig::TimestampRange { start, end } => {
            timestamp::generate_timestamp_range(rng, start, end)
        }

        GeneratorConfig::SimTime => Value::Timestamp(context.sim_time),

        GeneratorConfig::WeightedBool { true_weight } => {
            Value::Bool(rng.gen_bool(true_weight.clamp(0.0, 1.0)))
        }

        GeneratorConfig::OneOf { values } => {
            if values.is_empty() {
                Value::Null
            } else {
                let idx = rng.gen_range(0..values.len());
                static_value::yaml_to_value(&values[idx])
            }
        }

        GeneratorConfig::Static { value } => static_value::yaml_to_value(value),

        GeneratorConfig::Null => Value::Null,
    };

    coerce(value, target_type)
}

/// Shape a generated value for a column type, parsing text where needed.
pub fn coerce(value: Value, target_type: &ColumnType) -> Option<Value> {
    if let Some(converted) = value.convert_to(target_type) {
        return Some(converted);
    }
    match &value {
        Value::Text(text) => Value::from_text(text, target_type).ok(),
        Value::Json(json) => Value::from_text(&json.to_string(), target_type).ok(),
        _ => None,
    }
}
