//! Reindexer: projects the snapshot onto the relational index.
//!
//! A run is either a full rebuild (clear every modeled table, derive every
//! document) or incremental (apply only the documents git reports as
//! changed since the last indexed revision). Either way the whole run is
//! one transaction, and ends by replacing `offtrac_meta` with the current
//! head and the snapshot metadata.

pub mod derive;
pub mod table;

use crate::error::Result;
use crate::snapshot::path::METADATA_FILE;
use crate::snapshot::{ChangedFile, SnapshotStore};
use crate::storage::schema::MODELED_TABLES;
use crate::storage::{IndexStore, Row, clear_table, delete_rows, insert_row, upsert_row};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use table::{REBUILD_ORDER, TableSpec, resolve};
use tracing::{debug, info, warn};

/// `offtrac_meta` key holding the last indexed revision.
pub const GIT_HEAD_KEY: &str = "git_head";

/// Which strategy a run used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    Full,
    Incremental { since: String },
}

/// Outcome of one reindex run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexSummary {
    #[serde(flatten)]
    pub strategy: Strategy,
    pub head: String,
    /// Documents derived and written.
    pub written: usize,
    /// Documents whose rows were deleted.
    pub deleted: usize,
    /// Changed paths that do not map to a table.
    pub skipped: usize,
}

impl ReindexSummary {
    const fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            head: String::new(),
            written: 0,
            deleted: 0,
            skipped: 0,
        }
    }
}

/// Loads a `SnapshotStore` into an `IndexStore`.
pub struct Reindexer<'a> {
    snapshot: &'a SnapshotStore,
    index: &'a mut IndexStore,
}

impl<'a> Reindexer<'a> {
    pub const fn new(snapshot: &'a SnapshotStore, index: &'a mut IndexStore) -> Self {
        Self { snapshot, index }
    }

    /// Bring the index up to the snapshot's current revision.
    ///
    /// Runs incrementally from the stored `git_head` when there is one and
    /// `force_full` is false; otherwise rebuilds everything.
    ///
    /// # Errors
    ///
    /// Any derivation, git or database error aborts the run and rolls the
    /// index back to its previous state.
    pub fn reindex(&mut self, force_full: bool) -> Result<ReindexSummary> {
        let snapshot = self.snapshot;
        self.index.transaction(|tx| {
            let stored = if force_full { None } else { stored_head(tx)? };
            let head = snapshot.current_revision()?;
            let mut summary = match stored {
                Some(since) => incremental(tx, snapshot, &since)?,
                None => full(tx, snapshot)?,
            };
            write_meta(tx, snapshot, &head)?;
            summary.head = head;
            Ok(summary)
        })
    }
}

fn stored_head(conn: &Connection) -> Result<Option<String>> {
    let value: Option<Option<String>> = conn
        .query_row(
            "SELECT value FROM offtrac_meta WHERE key = ?",
            [GIT_HEAD_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.flatten().filter(|head| !head.is_empty()))
}

fn full(conn: &Connection, snapshot: &SnapshotStore) -> Result<ReindexSummary> {
    info!("Starting full reindex");
    for table in MODELED_TABLES {
        clear_table(conn, table)?;
    }
    let mut summary = ReindexSummary::new(Strategy::Full);
    for spec in REBUILD_ORDER {
        for dir in spec.dirs() {
            for path in snapshot.list_documents(&dir)? {
                let rows = (spec.derive)(&path, snapshot.load_json(&path)?)?;
                for row in &rows {
                    insert_row(conn, row)?;
                }
                summary.written += 1;
            }
        }
        debug!(table = spec.table, "Rebuilt");
    }
    Ok(summary)
}

fn incremental(conn: &Connection, snapshot: &SnapshotStore, since: &str) -> Result<ReindexSummary> {
    info!(since, "Starting incremental reindex");
    let mut summary = ReindexSummary::new(Strategy::Incremental {
        since: since.to_string(),
    });
    for change in snapshot.changed_files(since)? {
        apply_change(conn, snapshot, &change, &mut summary)?;
    }
    Ok(summary)
}

fn apply_change(
    conn: &Connection,
    snapshot: &SnapshotStore,
    change: &ChangedFile,
    summary: &mut ReindexSummary,
) -> Result<()> {
    let mode = &change.mode;
    // A rename moves the document: the old key goes away. A copy keeps it.
    let renamed_from = change
        .previous
        .as_deref()
        .filter(|_| mode.is_renamed())
        .and_then(|previous| resolve(previous).map(|spec| (previous, spec)));
    if let Some((previous, spec)) = renamed_from {
        debug!(path = previous, "Deleting rows of renamed document");
        delete_document(conn, spec, previous)?;
        summary.deleted += 1;
    }

    let path = change.path.as_str();
    let Some(spec) = resolve(path) else {
        if path == METADATA_FILE {
            debug!(path, "Skipping metadata file");
        } else {
            warn!(path, mode = mode.as_str(), "Skipping path outside the indexed layout");
        }
        summary.skipped += 1;
        return Ok(());
    };

    if mode.is_deleted() {
        debug!(path, table = spec.table, "Deleting rows");
        delete_document(conn, spec, path)?;
        summary.deleted += 1;
        return Ok(());
    }

    let rows = (spec.derive)(path, snapshot.load_json(path)?)?;
    let insert = mode.is_added();
    debug!(path, table = spec.table, insert, rows = rows.len(), "Writing rows");
    write_document(conn, spec, path, &rows, insert)?;
    summary.written += 1;
    Ok(())
}

fn delete_document(conn: &Connection, spec: &TableSpec, path: &str) -> Result<()> {
    delete_rows(conn, spec.table, &spec.delete_filter(path))?;
    for (table, filter) in spec.family_filters(path) {
        delete_rows(conn, table, &filter)?;
    }
    Ok(())
}

/// Write the rows of one document.
///
/// Family rows are replaced wholesale; the document's own row is inserted
/// when `insert` is set and merged by key otherwise.
fn write_document(
    conn: &Connection,
    spec: &TableSpec,
    path: &str,
    rows: &[Row],
    insert: bool,
) -> Result<()> {
    for (table, filter) in spec.family_filters(path) {
        delete_rows(conn, table, &filter)?;
    }
    for row in rows {
        let in_family = spec.family.iter().any(|(table, _)| *table == row.table);
        if insert || in_family {
            insert_row(conn, row)?;
        } else {
            upsert_row(conn, row, spec.key_for(row.table))?;
        }
    }
    Ok(())
}

fn write_meta(conn: &Connection, snapshot: &SnapshotStore, head: &str) -> Result<()> {
    clear_table(conn, "offtrac_meta")?;
    insert_row(
        conn,
        &Row::new("offtrac_meta")
            .with("key", GIT_HEAD_KEY.to_string())
            .with("value", head.to_string()),
    )?;
    for (key, value) in snapshot.metadata().pairs() {
        if key == GIT_HEAD_KEY {
            continue;
        }
        insert_row(conn, &Row::new("offtrac_meta").with("key", key).with("value", value))?;
    }
    Ok(())
}
