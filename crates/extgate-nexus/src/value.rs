//! JSON <-> SQLite value conversion
//!
//! Statement parameters and result rows cross the Nexus boundary as
//! `serde_json::Value` so plugins never depend on the storage driver.

use base64::Engine;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Convert a positional JSON parameter into an owned SQLite value.
///
/// Arrays and objects are stored as their JSON text.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a column value read from SQLite into JSON.
///
/// Blobs are returned base64-encoded; non-finite reals become null.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}
