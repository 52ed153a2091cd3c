#![allow(dead_code)]

pub mod cli;

use offtrac::config::{ConfigLayer, Settings};
use offtrac::error::{OfftracError, Result};
use offtrac::model::FieldKind;
use offtrac::remote::wire;
use offtrac::remote::{RemoteClient, Transport};
use offtrac::snapshot::{Git, SnapshotStore};
use offtrac::storage::IndexStore;
use offtrac::sync::{SyncConfig, SyncDriver, SyncSummary};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        offtrac::logging::init_test_logging();
    });
}

/// Scripted tracker answering the RPC calls and report pages the sync
/// driver makes.
#[derive(Debug, Clone, Default)]
pub struct FakeTracker {
    /// id -> (created, changed, properties)
    pub tickets: BTreeMap<i64, (String, String, Value)>,
    /// id -> [(time, author, field, old, new)]
    pub changelogs: BTreeMap<i64, Vec<(String, String, String, String, String)>>,
    /// field -> name -> value
    pub fields: BTreeMap<String, BTreeMap<String, Value>>,
    /// id -> (title, sql)
    pub reports: BTreeMap<i64, (String, String)>,
    /// RPC requests received.
    pub posts: usize,
    /// Fail any request that includes this method.
    pub fail_on: Option<String>,
}

impl FakeTracker {
    pub fn ticket(mut self, id: i64, created: &str, changed: &str, properties: Value) -> Self {
        self.set_ticket(id, created, changed, properties);
        self
    }

    pub fn set_ticket(&mut self, id: i64, created: &str, changed: &str, properties: Value) {
        self.tickets
            .insert(id, (created.to_string(), changed.to_string(), properties));
    }

    pub fn change(mut self, id: i64, time: &str, author: &str, field: &str, old: &str, new: &str) -> Self {
        self.add_change(id, time, author, field, old, new);
        self
    }

    pub fn add_change(&mut self, id: i64, time: &str, author: &str, field: &str, old: &str, new: &str) {
        self.changelogs.entry(id).or_default().push((
            time.to_string(),
            author.to_string(),
            field.to_string(),
            old.to_string(),
            new.to_string(),
        ));
    }

    pub fn field(mut self, kind: FieldKind, name: &str, value: Value) -> Self {
        self.fields
            .entry(kind.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    pub fn report(mut self, id: i64, title: &str, sql: &str) -> Self {
        self.reports.insert(id, (title.to_string(), sql.to_string()));
        self
    }

    fn answer(&self, method: &str, params: &Value) -> Value {
        match method {
            "ticket.getRecentChanges" => {
                let since = wire::normalize(params[0].clone());
                let since = since.as_str().unwrap_or_default();
                let ids: Vec<i64> = self
                    .tickets
                    .iter()
                    .filter(|(_, (_, changed, _))| changed.as_str() >= since)
                    .map(|(id, _)| *id)
                    .collect();
                json!(ids)
            }
            "ticket.get" => {
                let id = params[0].as_i64().unwrap();
                let (created, changed, properties) = &self.tickets[&id];
                json!([id, wire::datetime(created), wire::datetime(changed), properties])
            }
            "ticket.changeLog" => {
                let id = params[0].as_i64().unwrap();
                let events: Vec<Value> = self
                    .changelogs
                    .get(&id)
                    .into_iter()
                    .flatten()
                    .map(|(time, author, field, old, new)| {
                        json!([wire::datetime(time), author, field, old, new, 1])
                    })
                    .collect();
                json!(events)
            }
            other => {
                let (kind, op) = other
                    .strip_prefix("ticket.")
                    .and_then(|rest| rest.split_once('.'))
                    .unwrap_or_else(|| panic!("unexpected method {other}"));
                let values = self.fields.get(kind);
                match op {
                    "getAll" => json!(values.map(|v| v.keys().collect::<Vec<_>>()).unwrap_or_default()),
                    "get" => values.unwrap()[params[0].as_str().unwrap()].clone(),
                    _ => panic!("unexpected method {other}"),
                }
            }
        }
    }
}

impl Transport for FakeTracker {
    fn post_json(&mut self, _path: &str, body: &Value) -> Result<Value> {
        self.posts += 1;
        let method = body["method"].as_str().unwrap();
        if let Some(failing) = &self.fail_on {
            let nested = body["params"]
                .as_array()
                .into_iter()
                .flatten()
                .any(|call| call["method"] == failing.as_str());
            if method == failing || nested {
                return Err(OfftracError::Transport {
                    url: "http://tracker.test".to_string(),
                    message: format!("{failing} unavailable"),
                });
            }
        }
        if method == "system.multicall" {
            // Answer out of order; the client restores it from the ids.
            let results: Vec<Value> = body["params"]
                .as_array()
                .unwrap()
                .iter()
                .rev()
                .map(|call| {
                    let result = self.answer(call["method"].as_str().unwrap(), &call["params"]);
                    json!({"id": call["id"], "result": result, "error": null})
                })
                .collect();
            return Ok(json!({"result": results, "error": null}));
        }
        Ok(json!({"result": self.answer(method, &body["params"]), "error": null}))
    }

    fn get_text(&mut self, path: &str) -> Result<String> {
        if path == "/report?asc=1&format=tab" {
            let mut body = String::from("report\ttitle\tdescription\n");
            for (id, (title, _)) in &self.reports {
                body.push_str(&format!("{id}\t{title}\t\n"));
            }
            return Ok(body);
        }
        let id: i64 = path
            .strip_prefix("/report?id=")
            .and_then(|rest| rest.strip_suffix("&format=sql"))
            .and_then(|id| id.parse().ok())
            .unwrap_or_else(|| panic!("unexpected path {path}"));
        Ok(self.reports[&id].1.clone())
    }
}

/// Tracker with two tickets, a changelog, reference fields and a report.
pub fn sample_tracker() -> FakeTracker {
    FakeTracker::default()
        .ticket(
            1,
            "2021-01-01T10:00:00",
            "2021-02-01T10:00:00",
            json!({"summary": "Crash on start", "status": "new", "owner": "ann",
                   "priority": "major", "component": "core", "points": "3", "_ts": "1612173600000000"}),
        )
        .ticket(
            2,
            "2021-01-05T09:00:00",
            "2021-01-05T09:00:00",
            json!({"summary": "Typo in docs", "status": "new", "owner": "bob", "priority": "minor"}),
        )
        .change(1, "2021-02-01T10:00:00", "ann", "status", "new", "assigned")
        .change(1, "2021-02-01T10:00:00", "ann", "comment", "", "Looking")
        .field(FieldKind::Priority, "major", json!("3"))
        .field(FieldKind::Priority, "minor", json!("4"))
        .field(FieldKind::Component, "core", json!({"name": "core", "owner": "ann", "description": ""}))
        .field(
            FieldKind::Milestone,
            "1.0",
            json!({"name": "1.0", "due": 0, "completed": wire::datetime("2021-03-01T00:00:00"), "description": "First"}),
        )
        .report(1, "Open tickets", "SELECT id, summary FROM ticket WHERE status <> 'closed' ORDER BY id::integer")
        .report(7, "My tickets", "SELECT id FROM ticket WHERE owner = '$USER' ORDER BY id")
}

/// Settings rooted in `dir/db`.
pub fn test_settings(dir: &Path) -> Settings {
    let mut layer = ConfigLayer::default();
    layer.set("root", dir.join("db").to_string_lossy());
    Settings::from_layer(&layer).expect("settings")
}

pub fn open_snapshot(root: &Path) -> SnapshotStore {
    init_test_logging();
    let mut snapshot = SnapshotStore::new(Git::new("git", root));
    snapshot.init().expect("init snapshot");
    snapshot
}

/// Pull `tracker` into the snapshot at `root`.
pub fn pull(root: &Path, tracker: &mut FakeTracker, batch_size: usize) -> Result<SyncSummary> {
    let mut snapshot = open_snapshot(root);
    let mut remote = RemoteClient::new(tracker).with_batch_size(batch_size);
    SyncDriver::new(&mut snapshot, &mut remote, SyncConfig::default()).pull()
}

/// Temp dir holding a snapshot synced from `sample_tracker()`.
pub fn seeded_snapshot() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let mut tracker = sample_tracker();
    pull(&dir.path().join("db"), &mut tracker, 2).expect("seed pull");
    dir
}

/// Every modeled row, sorted, for comparing two indexes.
pub fn dump(index: &IndexStore) -> Vec<String> {
    let mut rows = Vec::new();
    for table in ["component", "version", "milestone", "enum", "report", "ticket", "ticket_custom", "ticket_change"] {
        let result = index.run_query(&format!("SELECT * FROM {table}")).expect("dump");
        for row in result.rows {
            rows.push(format!("{table} {row:?}"));
        }
    }
    rows.sort();
    rows
}
