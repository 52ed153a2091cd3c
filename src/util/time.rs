//! Tracker time conversion.
//!
//! Datetimes travel as naive ISO-8601 strings in UTC (`2021-06-01T00:00:00`).
//! The relational store keeps them as integer epoch milliseconds.

use crate::error::{OfftracError, Result};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Watermark used when no ticket has been synced yet.
pub const MIN_RECENT: &str = "2000-01-01T00:00:00";

const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a wire timestamp.
///
/// Accepts the tracker's naive form, with or without fractional seconds,
/// and RFC3339 with an explicit offset (normalized to UTC).
///
/// # Errors
///
/// Returns `InvalidDocument` if the string is not a recognizable timestamp.
pub fn parse_wire_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, WIRE_FORMAT) {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    Err(OfftracError::invalid_document(
        s,
        "expected an ISO-8601 timestamp like 2021-06-01T00:00:00",
    ))
}

/// Convert a wire timestamp to epoch milliseconds.
///
/// # Errors
///
/// Returns an error if the string cannot be parsed.
pub fn iso8601_to_millis(s: &str) -> Result<i64> {
    Ok(parse_wire_timestamp(s)?.and_utc().timestamp_millis())
}

/// Convert a document time value to its stored form.
///
/// Falsy values (`null`, `false`, `0`, `""`) pass through unchanged, as do
/// numbers that are already epoch values.
///
/// # Errors
///
/// Returns an error for a non-empty string that is not a timestamp.
pub fn convert_time(value: &Value) -> Result<Value> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(Value::from(iso8601_to_millis(s)?)),
        other => Ok(other.clone()),
    }
}

/// Later of two watermarks.
///
/// Compares parsed instants when both parse; otherwise falls back to string
/// order, which agrees for the tracker's fixed-width format.
#[must_use]
pub fn later_watermark<'a>(current: &'a str, candidate: &'a str) -> &'a str {
    let later = match (parse_wire_timestamp(current), parse_wire_timestamp(candidate)) {
        (Ok(a), Ok(b)) => b > a,
        _ => candidate > current,
    };
    if later { candidate } else { current }
}

/// Strictly increasing clock for one changelog.
///
/// Each event gets `max(raw, previous + 1)`, so equal or backward source
/// timestamps still produce a strictly increasing sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock {
    last: Option<i64>,
}

impl MonotonicClock {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Derive the next time from a raw epoch-millisecond value.
    pub fn tick(&mut self, raw: i64) -> i64 {
        let next = match self.last {
            Some(last) if raw <= last => last + 1,
            _ => raw,
        };
        self.last = Some(next);
        next
    }
}
