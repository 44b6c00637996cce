//! Conversions between `serde_json::Value` scalars and `libsql::Value`s, and
//! row-to-JSON helpers shared by the insertion engine, the query gate, and
//! the introspector.

use serde_json::{Map, Number, Value};

/// Convert a JSON scalar (null/bool/number/string) into the `libsql::Value`
/// it should be bound as (`spec.md` §4.2 observation rules). Arrays and
/// objects are not valid input — callers route those through the chunk
/// store and bind the resulting text instead.
#[must_use]
pub fn json_scalar_to_sql(value: &Value) -> libsql::Value {
    match value {
        Value::Null => libsql::Value::Null,
        Value::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                libsql::Value::Integer(i)
            } else if let Some(u) = n.as_u64() {
                // Lossy for u64 values beyond i64::MAX; SQLite has no unsigned type.
                libsql::Value::Integer(u as i64)
            } else {
                libsql::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => libsql::Value::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => libsql::Value::Text(value.to_string()),
    }
}

/// Convert one column of a returned `libsql::Row` into a `serde_json::Value`,
/// by the declared `libsql` column type.
///
/// # Errors
///
/// Returns a [`libsql::Error`] if the column cannot be read at all.
pub fn sql_value_to_json(row: &libsql::Row, idx: i32) -> Result<Value, libsql::Error> {
    use libsql::Value as V;
    let value = row.get_value(idx)?;
    Ok(match value {
        V::Null => Value::Null,
        V::Integer(i) => Value::Number(Number::from(i)),
        V::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        V::Text(s) => Value::String(s),
        V::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    })
}

/// Read an entire row into an ordered JSON object, given the column names
/// in declaration order (`spec.md` §4.7 "capture column names in declaration
/// order").
///
/// # Errors
///
/// Returns a [`libsql::Error`] if any column cannot be read.
pub fn row_to_object(row: &libsql::Row, column_names: &[String]) -> Result<Map<String, Value>, libsql::Error> {
    let mut map = Map::with_capacity(column_names.len());
    for (idx, name) in column_names.iter().enumerate() {
        map.insert(name.clone(), sql_value_to_json(row, idx as i32)?);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_scalars() {
        assert!(matches!(json_scalar_to_sql(&json!(null)), libsql::Value::Null));
        assert!(matches!(json_scalar_to_sql(&json!(true)), libsql::Value::Integer(1)));
        assert!(matches!(json_scalar_to_sql(&json!(false)), libsql::Value::Integer(0)));
        assert!(matches!(json_scalar_to_sql(&json!(42)), libsql::Value::Integer(42)));
        assert!(matches!(json_scalar_to_sql(&json!(1.5)), libsql::Value::Real(_)));
        assert!(matches!(json_scalar_to_sql(&json!("x")), libsql::Value::Text(s) if s == "x"));
    }
}
