//! Tagged datetime encoding used on the RPC wire.
//!
//! The tracker wraps datetimes as `{"__jsonclass__": ["datetime", "<iso>"]}`.
//! Everything read from the wire is unwrapped to the plain ISO string at
//! every depth; values sent to the tracker are wrapped with `datetime`.

use serde_json::{Value, json};

const CLASS_KEY: &str = "__jsonclass__";

/// Wrap an ISO-8601 string for sending.
#[must_use]
pub fn datetime(iso: &str) -> Value {
    json!({ CLASS_KEY: ["datetime", iso] })
}

/// Unwrap every tagged datetime in `value`.
#[must_use]
pub fn normalize(mut value: Value) -> Value {
    normalize_in_place(&mut value);
    value
}

/// Unwrap every tagged datetime in `value`, in place.
pub fn normalize_in_place(value: &mut Value) {
    if let Some(iso) = tagged_datetime(value) {
        *value = Value::String(iso);
        return;
    }
    match value {
        Value::Object(map) => map.values_mut().for_each(normalize_in_place),
        Value::Array(items) => items.iter_mut().for_each(normalize_in_place),
        _ => {}
    }
}

fn tagged_datetime(value: &Value) -> Option<String> {
    let class = value.as_object()?.get(CLASS_KEY)?.as_array()?;
    match class.as_slice() {
        [Value::String(kind), Value::String(iso)] if kind == "datetime" => Some(iso.clone()),
        _ => None,
    }
}
