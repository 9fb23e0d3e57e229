//! Conversions between bind parameters / rows and SQLite values.

use rusqlite::types::{Value, ValueRef};
use serde_json::Value as JsonValue;
use sluice_core::{Param, Row};

/// Convert a bind parameter to a SQLite value.
///
/// Booleans bind as 0/1. Arrays and objects bind as their JSON text.
pub fn param_to_sqlite(param: &Param) -> Value {
    match param {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Real),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Convert a slice of bind parameters.
pub fn params_to_sqlite(params: &[Param]) -> Vec<Value> {
    params.iter().map(param_to_sqlite).collect()
}

/// Convert a SQLite value to JSON.
///
/// Text stays a string even if it looks like JSON. Blobs become an array of
/// byte values.
pub fn from_sqlite_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
        }
    }
}

/// Get a JSON value from a row at the given column index.
pub fn get_value_at_index(row: &rusqlite::Row<'_>, index: usize) -> JsonValue {
    row.get_ref(index)
        .map(from_sqlite_value)
        .unwrap_or(JsonValue::Null)
}

/// Build a JSON object from a row, keyed by column name.
pub(crate) fn row_to_json(row: &rusqlite::Row<'_>, columns: &[String]) -> Row {
    let mut map = serde_json::Map::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        map.insert(col.clone(), get_value_at_index(row, i));
    }
    JsonValue::Object(map)
}
