//! Static dispatch from snapshot paths to index tables.

use super::derive;
use crate::error::Result;
use crate::model::FieldKind;
use crate::snapshot::path::{CHANGELOG_DIR, FIELD_DIR, REPORT_DIR, TICKET_DIR, parent_dir};
use crate::snapshot::path_id;
use crate::storage::Row;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Derivation function for one kind of document.
pub type DeriveFn = fn(&str, Value) -> Result<Vec<Row>>;

/// How one kind of snapshot document maps onto the index.
#[derive(Debug)]
pub struct TableSpec {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub key: &'static [&'static str],
    /// Whether the key recovered from a file name is numeric.
    pub integer_key: bool,
    /// Rows owned by the document in other tables, as `(table, column)`
    /// matched against the document id.
    pub family: &'static [(&'static str, &'static str)],
    pub derive: DeriveFn,
}

pub static COMPONENT: TableSpec = TableSpec {
    table: "component",
    columns: &["name", "owner", "description"],
    key: &["name"],
    integer_key: false,
    family: &[],
    derive: derive::component_rows,
};

pub static VERSION: TableSpec = TableSpec {
    table: "version",
    columns: &["name", "time", "description"],
    key: &["name"],
    integer_key: false,
    family: &[],
    derive: derive::version_rows,
};

pub static MILESTONE: TableSpec = TableSpec {
    table: "milestone",
    columns: &["name", "due", "completed", "description"],
    key: &["name"],
    integer_key: false,
    family: &[],
    derive: derive::milestone_rows,
};

pub static ENUM: TableSpec = TableSpec {
    table: "enum",
    columns: &["type", "name", "value"],
    key: &["type", "name"],
    integer_key: false,
    family: &[],
    derive: derive::enum_rows,
};

pub static REPORT: TableSpec = TableSpec {
    table: "report",
    columns: &["id", "author", "title", "query", "description"],
    key: &["id"],
    integer_key: true,
    family: &[],
    derive: derive::report_rows,
};

pub static TICKET: TableSpec = TableSpec {
    table: "ticket",
    columns: &[
        "id",
        "type",
        "time",
        "changetime",
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
    ],
    key: &["id"],
    integer_key: true,
    family: &[("ticket_custom", "ticket")],
    derive: derive::ticket_rows,
};

pub static TICKET_CHANGE: TableSpec = TableSpec {
    table: "ticket_change",
    columns: &["ticket", "time", "author", "field", "oldvalue", "newvalue"],
    key: &["ticket", "time", "field"],
    integer_key: true,
    family: &[("ticket_change", "ticket")],
    derive: derive::changelog_rows,
};

/// Primary key of tables that only appear as families.
pub const TICKET_CUSTOM_KEY: &[&str] = &["ticket", "name"];

/// Full rebuild order: reference fields, enumerations, tickets, reports,
/// changelogs.
pub static REBUILD_ORDER: [&TableSpec; 7] = [
    &COMPONENT,
    &VERSION,
    &MILESTONE,
    &ENUM,
    &TICKET,
    &REPORT,
    &TICKET_CHANGE,
];

impl TableSpec {
    /// Snapshot directories holding this kind of document.
    #[must_use]
    pub fn dirs(&self) -> Vec<String> {
        match self.table {
            "enum" => FieldKind::ALL
                .iter()
                .filter(|kind| kind.is_enumerated())
                .map(FieldKind::dir)
                .collect(),
            "component" | "version" | "milestone" => vec![format!("{FIELD_DIR}/{}", self.table)],
            "ticket_change" => vec![CHANGELOG_DIR.to_string()],
            other => vec![other.to_string()],
        }
    }

    /// Primary key used when upserting a derived row into `table`.
    #[must_use]
    pub fn key_for(&self, table: &str) -> &'static [&'static str] {
        if table == "ticket_custom" {
            TICKET_CUSTOM_KEY
        } else {
            self.key
        }
    }

    fn id_value(&self, path: &str) -> SqlValue {
        let id = path_id(path);
        if self.integer_key {
            derive::id_value(&id)
        } else {
            SqlValue::Text(id)
        }
    }

    /// Filter selecting the row owned by the document at `path`.
    ///
    /// Enumerations are keyed by `(type, name)` from directory and file
    /// name; other tables by their first key column.
    #[must_use]
    pub fn delete_filter(&self, path: &str) -> Vec<(&'static str, SqlValue)> {
        if self.table == "enum" {
            return vec![
                ("type", SqlValue::Text(path_id(parent_dir(path)))),
                ("name", SqlValue::Text(path_id(path))),
            ];
        }
        vec![(self.key[0], self.id_value(path))]
    }

    /// Filters selecting the family rows owned by the document at `path`.
    #[must_use]
    pub fn family_filters(&self, path: &str) -> Vec<(&'static str, [(&'static str, SqlValue); 1])> {
        self.family
            .iter()
            .map(|(table, column)| (*table, [(*column, self.id_value(path))]))
            .collect()
    }
}

/// Resolve a snapshot path to its table.
///
/// Top-level directories map directly (`ticket/1.json`); field documents
/// are one level deeper (`field/priority/major.json`). Anything else is
/// not indexed.
#[must_use]
pub fn resolve(path: &str) -> Option<&'static TableSpec> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [dir, file] if !file.is_empty() => match *dir {
            TICKET_DIR => Some(&TICKET),
            CHANGELOG_DIR => Some(&TICKET_CHANGE),
            REPORT_DIR => Some(&REPORT),
            _ => None,
        },
        [FIELD_DIR, field, file] if !file.is_empty() => {
            let kind: FieldKind = field.parse().ok()?;
            Some(match kind {
                FieldKind::Component => &COMPONENT,
                FieldKind::Version => &VERSION,
                FieldKind::Milestone => &MILESTONE,
                _ => &ENUM,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_top_level_documents() {
        assert_eq!(resolve("ticket/1.json").map(|s| s.table), Some("ticket"));
        assert_eq!(resolve("changelog/1.json").map(|s| s.table), Some("ticket_change"));
        assert_eq!(resolve("report/3.json").map(|s| s.table), Some("report"));
    }

    #[test]
    fn resolves_field_documents() {
        assert_eq!(resolve("field/priority/major.json").map(|s| s.table), Some("enum"));
        assert_eq!(resolve("field/type/defect.json").map(|s| s.table), Some("enum"));
        assert_eq!(resolve("field/milestone/m1.json").map(|s| s.table), Some("milestone"));
        assert_eq!(resolve("field/component/ui.json").map(|s| s.table), Some("component"));
    }

    #[test]
    fn unresolvable_paths_are_none() {
        for path in ["db.json", "field/priority.json", "field/keywords/x.json", "stray/1.json", "ticket/a/b.json"] {
            assert!(resolve(path).is_none(), "{path}");
        }
    }

    #[test]
    fn enum_delete_filter_uses_type_and_name() {
        let filter = ENUM.delete_filter("field/priority/critical.json");
        assert_eq!(
            filter,
            vec![
                ("type", SqlValue::Text("priority".to_string())),
                ("name", SqlValue::Text("critical".to_string())),
            ]
        );
    }

    #[test]
    fn numeric_tables_delete_by_integer_id() {
        assert_eq!(TICKET.delete_filter("ticket/9.json"), vec![("id", SqlValue::Integer(9))]);
        assert_eq!(
            COMPONENT.delete_filter("field/component/123.json"),
            vec![("name", SqlValue::Text("123".to_string()))]
        );
    }

    #[test]
    fn every_table_has_directories() {
        let dirs: Vec<String> = REBUILD_ORDER.iter().flat_map(|spec| spec.dirs()).collect();
        assert_eq!(dirs.len(), 10);
        assert!(dirs.contains(&"field/severity".to_string()));
        assert!(dirs.contains(&"report".to_string()));
    }
}
