//! Row derivation from snapshot documents.
//!
//! Every function takes the document's path relative to the snapshot root
//! and its parsed JSON, and returns the rows it projects to. The same
//! functions serve full and incremental reindexing.

use crate::error::{OfftracError, Result};
use crate::model::{ChangeEvent, Component, Milestone, ReportDocument, TicketDocument, Version};
use crate::snapshot::path::parent_dir;
use crate::snapshot::path_id;
use crate::storage::Row;
use crate::util::time::{MonotonicClock, convert_time, iso8601_to_millis};
use rusqlite::types::Value as SqlValue;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Ticket properties stored as `ticket` columns; anything else is custom.
pub const TICKET_COLUMNS: &[&str] = &[
    "type",
    "component",
    "severity",
    "priority",
    "owner",
    "reporter",
    "cc",
    "version",
    "milestone",
    "status",
    "resolution",
    "summary",
    "description",
    "keywords",
];

/// Convert a JSON value to its stored SQL form.
#[must_use]
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(n) => n.as_i64().map_or_else(
            || SqlValue::Real(n.as_f64().unwrap_or_default()),
            SqlValue::Integer,
        ),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Key value for an id recovered from a file name: numeric ids are integers.
#[must_use]
pub fn id_value(id: &str) -> SqlValue {
    id.parse::<i64>()
        .map_or_else(|_| SqlValue::Text(id.to_string()), SqlValue::Integer)
}

fn parse<T: DeserializeOwned>(path: &str, document: Value) -> Result<T> {
    serde_json::from_value(document)
        .map_err(|err| OfftracError::invalid_document(path, err.to_string()))
}

fn converted(path: &str, value: &Value) -> Result<SqlValue> {
    convert_time(value)
        .map(|value| to_sql(&value))
        .map_err(|err| OfftracError::invalid_document(path, err.to_string()))
}

fn name_or_path(name: &str, path: &str) -> String {
    if name.is_empty() {
        path_id(path)
    } else {
        name.to_string()
    }
}

/// `field/component/<name>.json` -> one `component` row.
///
/// # Errors
///
/// Returns `InvalidDocument` if the document is not a component record.
pub fn component_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    let component: Component = parse(path, document)?;
    Ok(vec![
        Row::new("component")
            .with("name", name_or_path(&component.name, path))
            .with("owner", to_sql(&component.owner))
            .with("description", to_sql(&component.description)),
    ])
}

/// `field/version/<name>.json` -> one `version` row.
///
/// # Errors
///
/// Returns `InvalidDocument` if the document is not a version record.
pub fn version_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    let version: Version = parse(path, document)?;
    Ok(vec![
        Row::new("version")
            .with("name", name_or_path(&version.name, path))
            .with("time", to_sql(&version.time))
            .with("description", to_sql(&version.description)),
    ])
}

/// `field/milestone/<name>.json` -> one `milestone` row with converted dates.
///
/// # Errors
///
/// Returns `InvalidDocument` for a bad record or an unparseable date.
pub fn milestone_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    let milestone: Milestone = parse(path, document)?;
    Ok(vec![
        Row::new("milestone")
            .with("name", name_or_path(&milestone.name, path))
            .with("due", converted(path, &milestone.due)?)
            .with("completed", converted(path, &milestone.completed)?)
            .with("description", to_sql(&milestone.description)),
    ])
}

/// `field/<enum>/<name>.json` -> one `enum` row; the document is the value.
///
/// # Errors
///
/// Infallible for any JSON document.
#[allow(clippy::unnecessary_wraps)]
pub fn enum_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    Ok(vec![
        Row::new("enum")
            .with("type", path_id(parent_dir(path)))
            .with("name", path_id(path))
            .with("value", to_sql(&document)),
    ])
}

/// `report/<id>.json` -> one `report` row.
///
/// # Errors
///
/// Returns `InvalidDocument` if the document lacks `title` or `sql`.
pub fn report_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    let report: ReportDocument = parse(path, document)?;
    Ok(vec![
        Row::new("report")
            .with("id", id_value(&path_id(path)))
            .with("author", String::new())
            .with("title", report.title)
            .with("query", report.sql)
            .with("description", String::new()),
    ])
}

/// `ticket/<id>.json` -> the `ticket` row plus one `ticket_custom` row per
/// non-standard property.
///
/// # Errors
///
/// Returns `InvalidDocument` for a malformed tuple or timestamp.
pub fn ticket_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    let ticket: TicketDocument = parse(path, document)?;
    let id = ticket.id();
    let mut row = Row::new("ticket");
    // Every column is present so a merge clears properties the ticket lost.
    for column in TICKET_COLUMNS {
        row.set(*column, SqlValue::Null);
    }
    let mut custom = Vec::new();
    for (key, value) in ticket.properties() {
        if TICKET_COLUMNS.contains(&key.as_str()) {
            row.set(key.as_str(), to_sql(value));
        } else if !is_internal_property(key) {
            custom.push(
                Row::new("ticket_custom")
                    .with("ticket", id)
                    .with("name", key.clone())
                    .with("value", to_sql(value)),
            );
        }
    }
    row.set("id", id);
    row.set("time", converted(path, &Value::from(ticket.created()))?);
    row.set("changetime", converted(path, &Value::from(ticket.changed()))?);

    let mut rows = Vec::with_capacity(custom.len() + 1);
    rows.push(row);
    rows.extend(custom);
    Ok(rows)
}

fn is_internal_property(key: &str) -> bool {
    key.starts_with('_') || matches!(key, "id" | "time" | "changetime")
}

/// `changelog/<id>.json` -> one `ticket_change` row per event, with times
/// forced strictly increasing.
///
/// # Errors
///
/// Returns `InvalidDocument` for a malformed event or timestamp.
pub fn changelog_rows(path: &str, document: Value) -> Result<Vec<Row>> {
    let events: Vec<ChangeEvent> = parse(path, document)?;
    let ticket = id_value(&path_id(path));
    let mut clock = MonotonicClock::new();
    events
        .iter()
        .map(|event| {
            let raw = iso8601_to_millis(event.time())
                .map_err(|err| OfftracError::invalid_document(path, err.to_string()))?;
            Ok(Row::new("ticket_change")
                .with("ticket", ticket.clone())
                .with("time", clock.tick(raw))
                .with("author", event.author().to_string())
                .with("field", event.field().to_string())
                .with("oldvalue", to_sql(event.old_value()))
                .with("newvalue", to_sql(event.new_value())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column<'a>(row: &'a Row, name: &str) -> &'a SqlValue {
        row.get(name).unwrap_or_else(|| panic!("missing column {name}"))
    }

    #[test]
    fn coerces_json_values() {
        assert_eq!(to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(to_sql(&json!(["a", 1])), SqlValue::Text("[\"a\",1]".to_string()));
    }

    #[test]
    fn numeric_ids_become_integers() {
        assert_eq!(id_value("42"), SqlValue::Integer(42));
        assert_eq!(id_value("rc 1"), SqlValue::Text("rc 1".to_string()));
    }

    #[test]
    fn ticket_row_converts_times_and_splits_custom_fields() {
        let doc = json!([7, "1970-01-01T00:00:01", "1970-01-01T00:00:02", {
            "status": "new",
            "summary": "Crash",
            "estimate": "3d",
            "_ts": "123",
            "time": "1970-01-01T00:00:01",
            "changetime": "1970-01-01T00:00:02"
        }]);
        let rows = ticket_rows("ticket/7.json", doc).unwrap();
        assert_eq!(rows.len(), 2);
        let ticket = &rows[0];
        assert_eq!(ticket.table, "ticket");
        assert_eq!(column(ticket, "id"), &SqlValue::Integer(7));
        assert_eq!(column(ticket, "time"), &SqlValue::Integer(1000));
        assert_eq!(column(ticket, "changetime"), &SqlValue::Integer(2000));
        assert_eq!(column(ticket, "status"), &SqlValue::Text("new".to_string()));
        assert!(ticket.get("estimate").is_none());
        assert!(ticket.get("_ts").is_none());
        assert_eq!(column(ticket, "owner"), &SqlValue::Null);

        let custom = &rows[1];
        assert_eq!(custom.table, "ticket_custom");
        assert_eq!(column(custom, "ticket"), &SqlValue::Integer(7));
        assert_eq!(column(custom, "name"), &SqlValue::Text("estimate".to_string()));
        assert_eq!(column(custom, "value"), &SqlValue::Text("3d".to_string()));
    }

    #[test]
    fn changelog_times_strictly_increase() {
        let doc = json!([
            ["1970-01-01T00:00:10", "ann", "status", "new", "assigned", 1],
            ["1970-01-01T00:00:10", "ann", "owner", "", "ann", 1],
            ["1970-01-01T00:00:09", "bob", "comment", "", "hi", 1]
        ]);
        let rows = changelog_rows("changelog/3.json", doc).unwrap();
        let times: Vec<&SqlValue> = rows.iter().map(|row| column(row, "time")).collect();
        assert_eq!(
            times,
            vec![&SqlValue::Integer(10_000), &SqlValue::Integer(10_001), &SqlValue::Integer(10_002)]
        );
        assert!(rows.iter().all(|row| column(row, "ticket") == &SqlValue::Integer(3)));
    }

    #[test]
    fn enum_row_keys_from_path() {
        let rows = enum_rows("field/priority/critical.json", json!("1")).unwrap();
        assert_eq!(column(&rows[0], "type"), &SqlValue::Text("priority".to_string()));
        assert_eq!(column(&rows[0], "name"), &SqlValue::Text("critical".to_string()));
        assert_eq!(column(&rows[0], "value"), &SqlValue::Text("1".to_string()));
    }

    #[test]
    fn milestone_dates_are_converted_and_falsy_kept() {
        let doc = json!({"name": "m1", "due": "1970-01-02T00:00:00", "completed": 0, "description": ""});
        let rows = milestone_rows("field/milestone/m1.json", doc).unwrap();
        assert_eq!(column(&rows[0], "due"), &SqlValue::Integer(86_400_000));
        assert_eq!(column(&rows[0], "completed"), &SqlValue::Integer(0));
    }

    #[test]
    fn version_time_is_stored_as_is() {
        let doc = json!({"name": "1.0", "time": "2020-01-01T00:00:00", "description": "first"});
        let rows = version_rows("field/version/1.0.json", doc).unwrap();
        assert_eq!(column(&rows[0], "time"), &SqlValue::Text("2020-01-01T00:00:00".to_string()));
    }

    #[test]
    fn report_row_defaults_author_and_description() {
        let rows = report_rows("report/11.json", json!({"title": "Mine", "sql": "SELECT 1"})).unwrap();
        let row = &rows[0];
        assert_eq!(column(row, "id"), &SqlValue::Integer(11));
        assert_eq!(column(row, "query"), &SqlValue::Text("SELECT 1".to_string()));
        assert_eq!(column(row, "author"), &SqlValue::Text(String::new()));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let err = ticket_rows("ticket/1.json", json!({"not": "a tuple"})).unwrap_err();
        assert!(matches!(err, OfftracError::InvalidDocument { ref path, .. } if path == "ticket/1.json"));
        let err = changelog_rows("changelog/1.json", json!([["yesterday", "a", "f", "", "", 1]])).unwrap_err();
        assert!(matches!(err, OfftracError::InvalidDocument { .. }));
    }
}
