//! Snapshot document types for `offtrac`.
//!
//! One JSON document per entity:
//! - `TicketDocument` - `[id, created, changed, properties]`
//! - `ChangeEvent` - one entry of a ticket's changelog
//! - `ReportDocument` - saved report title and SQL
//! - `Component`, `Version`, `Milestone` - structured reference fields
//! - `FieldKind` - the fixed set of synced ticket fields
//! - `SnapshotMetadata` - the `db.json` sync metadata

use crate::util::time::MIN_RECENT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A ticket field mirrored under `field/<name>/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    Component,
    Priority,
    Resolution,
    Severity,
    Type,
    Version,
    Milestone,
}

impl FieldKind {
    /// Sync order of the reference fields.
    pub const ALL: [Self; 7] = [
        Self::Component,
        Self::Priority,
        Self::Resolution,
        Self::Severity,
        Self::Type,
        Self::Version,
        Self::Milestone,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Priority => "priority",
            Self::Resolution => "resolution",
            Self::Severity => "severity",
            Self::Type => "type",
            Self::Version => "version",
            Self::Milestone => "milestone",
        }
    }

    /// Enumerated fields are flat named values stored in the `enum` table.
    #[must_use]
    pub const fn is_enumerated(&self) -> bool {
        matches!(
            self,
            Self::Priority | Self::Resolution | Self::Severity | Self::Type
        )
    }

    /// Snapshot directory relative to the root.
    #[must_use]
    pub fn dir(&self) -> String {
        format!("field/{}", self.as_str())
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

/// `ticket.get` result: `[id, created, changed, properties]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketDocument(pub i64, pub String, pub String, pub Map<String, Value>);

impl TicketDocument {
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn created(&self) -> &str {
        &self.1
    }

    #[must_use]
    pub fn changed(&self) -> &str {
        &self.2
    }

    #[must_use]
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.3
    }
}

/// `ticket.changeLog` entry: `[time, author, field, oldvalue, newvalue, permanent]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent(
    pub String,
    pub String,
    pub String,
    pub Value,
    pub Value,
    pub Value,
);

impl ChangeEvent {
    #[must_use]
    pub fn time(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.1
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.2
    }

    #[must_use]
    pub const fn old_value(&self) -> &Value {
        &self.3
    }

    #[must_use]
    pub const fn new_value(&self) -> &Value {
        &self.4
    }
}

/// Saved report as listed by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub title: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub owner: Value,
    #[serde(default)]
    pub description: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    #[serde(default)]
    pub time: Value,
    #[serde(default)]
    pub description: Value,
}

/// Milestone; `due` and `completed` are wire timestamps or falsy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    #[serde(default)]
    pub due: Value,
    #[serde(default)]
    pub completed: Value,
    #[serde(default)]
    pub description: Value,
}

/// Sync metadata persisted as `db.json`.
///
/// Unknown keys are preserved so they round-trip into `offtrac_meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SnapshotMetadata {
    /// Current watermark, defaulting to the minimum epoch.
    #[must_use]
    pub fn recent(&self) -> &str {
        self.recent.as_deref().unwrap_or(MIN_RECENT)
    }

    /// All key/value pairs in key order, as stored in `offtrac_meta`.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .extra
            .iter()
            .map(|(key, value)| (key.clone(), meta_value_text(value)))
            .collect();
        if let Some(version) = self.version {
            pairs.push(("version".to_string(), version.to_string()));
        }
        if let Some(recent) = &self.recent {
            pairs.push(("recent".to_string(), recent.clone()));
        }
        pairs.sort();
        pairs
    }
}

fn meta_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
