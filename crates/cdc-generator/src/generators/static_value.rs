//! Static value generator and YAML to `Value` conversion.

use cdc_core::Value;
use serde_yaml::Value as YamlValue;

/// Convert a YAML scalar to a `Value`. Sequences and mappings become JSON.
pub fn yaml_to_value(yaml: &YamlValue) -> Value {
    match yaml {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float64(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        YamlValue::String(s) => Value::Text(s.clone()),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => serde_json::to_value(yaml)
            .map(Value::Json)
            .unwrap_or(Value::Null),
        YamlValue::Tagged(tagged) => yaml_to_value(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_null() {
        assert_eq!(yaml_to_value(&YamlValue::Null), Value::Null);
    }

    #[test]
    fn test_yaml_bool() {
        assert_eq!(yaml_to_value(&YamlValue::Bool(true)), Value::Bool(true));
    }

    #[test]
    fn test_yaml_int() {
        let yaml: YamlValue = serde_yaml::from_str("42").unwrap();
        assert_eq!(yaml_to_value(&yaml), Value::Int64(42));
    }

    #[test]
    fn test_yaml_float() {
        let yaml: YamlValue = serde_yaml::from_str("1.234").unwrap();
        if let Value::Float64(f) = yaml_to_value(&yaml) {
            assert!((f - 1.234).abs() < 0.001);
        } else {
            panic!("Expected Float64");
        }
    }

    #[test]
    fn test_yaml_string() {
        let yaml = YamlValue::String("hello".to_string());
        assert_eq!(yaml_to_value(&yaml), Value::Text("hello".to_string()));
    }

    #[test]
    fn test_yaml_mapping_becomes_json() {
        let yaml: YamlValue = serde_yaml::from_str("{ version: 1, name: test }").unwrap();
        assert_eq!(
            yaml_to_value(&yaml),
            Value::Json(serde_json::json!({"version": 1, "name": "test"}))
        );
    }
}
