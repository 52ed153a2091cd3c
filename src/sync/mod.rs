//! Sync Driver: pulls the tracker into the snapshot.
//!
//! Order per run:
//! 1. Reports: cleared and rewritten.
//! 2. Reference fields: each field directory cleared and rewritten.
//! 3. Tickets changed since the watermark (inclusive): overwritten.
//! 4. Changelogs for exactly those tickets: overwritten.
//! 5. Watermark persisted, snapshot checkpointed.
//!
//! The relational index is never touched here.

use crate::error::Result;
use crate::model::FieldKind;
use crate::remote::{RemoteClient, Transport};
use crate::snapshot::SnapshotStore;
use crate::snapshot::path::{CHANGELOG_DIR, REPORT_DIR, TICKET_DIR};
use crate::util::progress::ProgressTracker;
use crate::util::time::later_watermark;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Configuration for a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Show progress bars for ticket and changelog fetches.
    pub show_progress: bool,
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Watermark the run started from.
    pub since: String,
    /// Watermark after the run.
    pub recent: String,
    pub reports: usize,
    /// Values written per field.
    pub fields: BTreeMap<String, usize>,
    /// Ids of tickets changed since `since`.
    pub tickets: Vec<i64>,
    pub changelogs: usize,
    /// Whether the checkpoint produced a commit.
    pub committed: bool,
}

/// Pulls from a `RemoteClient` into a `SnapshotStore`.
pub struct SyncDriver<'a, T> {
    snapshot: &'a mut SnapshotStore,
    remote: &'a mut RemoteClient<T>,
    config: SyncConfig,
}

impl<'a, T: Transport> SyncDriver<'a, T> {
    pub fn new(
        snapshot: &'a mut SnapshotStore,
        remote: &'a mut RemoteClient<T>,
        config: SyncConfig,
    ) -> Self {
        Self {
            snapshot,
            remote,
            config,
        }
    }

    /// Run one full pull and checkpoint.
    ///
    /// The snapshot should have been `init`ed first so the run starts from
    /// the last checkpoint.
    ///
    /// # Errors
    ///
    /// Any remote, file or git error ends the run. Nothing is committed in
    /// that case; the next `init` discards the partial writes.
    pub fn pull(&mut self) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            since: self.snapshot.recent().to_string(),
            ..SyncSummary::default()
        };

        summary.reports = self.sync_reports()?;
        for kind in FieldKind::ALL {
            let written = self.sync_field(kind)?;
            summary.fields.insert(kind.to_string(), written);
        }

        info!(since = %summary.since, "Fetching changed ticket ids");
        summary.tickets = self.remote.recent_tickets(&summary.since)?;
        summary.recent = self.sync_tickets(&summary.tickets, &summary.since)?;
        summary.changelogs = self.sync_changelogs(&summary.tickets)?;

        self.snapshot.set_recent(summary.recent.clone());
        self.snapshot.write_metadata()?;
        info!(recent = %summary.recent, "Synced");
        summary.committed = self.snapshot.checkpoint()?;
        Ok(summary)
    }

    fn sync_reports(&mut self) -> Result<usize> {
        info!("Syncing reports");
        self.snapshot.nuke(REPORT_DIR)?;
        let reports = self.remote.report_list()?;
        for (id, title) in &reports {
            let document = self.remote.report(id, title)?;
            self.snapshot.write_entity(REPORT_DIR, id, &document)?;
        }
        debug!(count = reports.len(), "Reports written");
        Ok(reports.len())
    }

    fn sync_field(&mut self, kind: FieldKind) -> Result<usize> {
        info!(field = %kind, "Syncing field");
        let dir = kind.dir();
        self.snapshot.nuke(&dir)?;
        let snapshot = &*self.snapshot;
        let mut written = 0;
        for entry in self.remote.field_values(kind)? {
            let (name, value) = entry?;
            snapshot.write_entity(&dir, &name, &value)?;
            written += 1;
        }
        Ok(written)
    }

    fn sync_tickets(&mut self, ids: &[i64], since: &str) -> Result<String> {
        info!(count = ids.len(), "Fetching tickets");
        let progress = ProgressTracker::new(ids.len() as u64, "Tickets", self.config.show_progress);
        let snapshot = &*self.snapshot;
        let mut recent = since.to_string();
        for entry in self.remote.tickets(ids) {
            let (id, ticket) = entry?;
            recent = later_watermark(&recent, ticket.changed()).to_string();
            snapshot.write_entity(TICKET_DIR, &id.to_string(), &ticket)?;
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(recent)
    }

    fn sync_changelogs(&mut self, ids: &[i64]) -> Result<usize> {
        info!(count = ids.len(), "Fetching changelogs");
        let progress =
            ProgressTracker::new(ids.len() as u64, "Changelogs", self.config.show_progress);
        let snapshot = &*self.snapshot;
        let mut written = 0;
        for entry in self.remote.changelogs(ids) {
            let (id, events) = entry?;
            snapshot.write_entity(CHANGELOG_DIR, &id.to_string(), &events)?;
            written += 1;
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(written)
    }
}
