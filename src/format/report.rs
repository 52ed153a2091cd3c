//! Report query preparation and JSON rendering.

use crate::storage::QueryResult;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

/// User substituted for `$USER` when none is given.
pub const DEFAULT_REPORT_USER: &str = "bob";

// Pattern is static and valid.
static TYPE_CAST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"::\w+").unwrap());

/// Adapt stored report SQL for SQLite.
///
/// Strips PostgreSQL-style casts (`::text`) and substitutes `$USER`.
#[must_use]
pub fn clean_sql(sql: &str, user: &str) -> String {
    TYPE_CAST.replace_all(sql, "").replace("$USER", user)
}

/// A SQL value as JSON.
#[must_use]
pub fn value_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(n) => Value::from(*n),
        SqlValue::Real(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Blob(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// A SQL value as a delimited-output field; NULL is empty.
#[must_use]
pub fn value_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(n) => n.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// `{"results": [{column: value, ...}, ...]}`.
#[must_use]
pub fn results_json(result: &QueryResult) -> Value {
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(value_json))
                .collect();
            Value::Object(object)
        })
        .collect();
    json!({ "results": rows })
}
