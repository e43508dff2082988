//! Parameter validation against a tool's declared JSON schema
//!
//! Covers the subset tools actually declare: `type`, `required`,
//! `properties`, `enum` and `additionalProperties: false`. Unknown keywords
//! are ignored.

use extgate_core::{GatewayError, Result};
use serde_json::Value;

/// Check `args` against `schema`. The first violation is reported.
pub fn validate(tool: &str, schema: &Value, args: &Value) -> Result<()> {
    check(schema, args, "$").map_err(|reason| GatewayError::validation(tool, reason))
}

fn check(schema: &Value, value: &Value, path: &str) -> std::result::Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let ok = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).any(|t| type_matches(t, value)),
            _ => true,
        };
        if !ok {
            return Err(format!(
                "{} should be {}, got {}",
                path,
                expected_label(expected),
                type_name(value)
            ));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(format!("{} must be one of {}", path, Value::Array(allowed.clone())));
        }
    }

    if let Value::Object(obj) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(key) {
                    return Err(format!("missing required field '{}'", key));
                }
            }
        }

        let props = schema.get("properties").and_then(Value::as_object);
        if let Some(props) = props {
            for (key, sub) in props {
                if let Some(v) = obj.get(key) {
                    check(sub, v, &format!("{}.{}", path, key))?;
                }
            }
        }

        if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            for key in obj.keys() {
                if !props.is_some_and(|p| p.contains_key(key)) {
                    return Err(format!("unexpected field '{}'", key));
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i))?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn expected_label(expected: &Value) -> String {
    match expected {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extgate_core::ErrorKind;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" },
                "mode": { "type": "string", "enum": ["fast", "deep"] }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_valid_args() {
        assert!(validate("t", &schema(), &json!({ "query": "x", "limit": 3 })).is_ok());
    }

    #[test]
    fn missing_required_field() {
        let err = validate("t", &schema(), &json!({ "limit": 3 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn wrong_type_is_reported_with_path() {
        let err = validate("t", &schema(), &json!({ "query": 5 })).unwrap_err();
        assert!(err.to_string().contains("$.query"));
    }

    #[test]
    fn float_is_not_integer() {
        assert!(validate("t", &schema(), &json!({ "query": "x", "limit": 1.5 })).is_err());
    }

    #[test]
    fn enum_and_additional_properties() {
        assert!(validate("t", &schema(), &json!({ "query": "x", "mode": "slow" })).is_err());
        assert!(validate("t", &schema(), &json!({ "query": "x", "extra": 1 })).is_err());
    }

    #[test]
    fn non_object_args_rejected_for_object_schema() {
        assert!(validate("t", &schema(), &json!("query")).is_err());
    }

    #[test]
    fn empty_schema_accepts_anything() {
        assert!(validate("t", &json!({}), &json!([1, 2, 3])).is_ok());
    }
}
