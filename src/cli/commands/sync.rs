//! `offtrac sync`: pull the tracker into the snapshot.

use super::{CommandContext, open_snapshot, print_json, remote_client};
use crate::config::Settings;
use crate::error::Result;
use crate::sync::{SyncConfig, SyncDriver, SyncSummary};

/// Run one pull against the configured tracker.
///
/// # Errors
///
/// Returns the first remote, snapshot or git error.
pub fn run(settings: &Settings, show_progress: bool) -> Result<SyncSummary> {
    let mut snapshot = open_snapshot(settings)?;
    let mut remote = remote_client(settings);
    SyncDriver::new(&mut snapshot, &mut remote, SyncConfig { show_progress }).pull()
}

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if settings are invalid or the pull fails.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    let summary = run(&settings, ctx.show_progress())?;
    if ctx.json {
        print_json(&summary)?;
    } else if ctx.human() {
        print_summary(&summary);
    }
    Ok(())
}

pub(super) fn print_summary(summary: &SyncSummary) {
    println!(
        "Synced {} tickets, {} changelogs, {} reports (since {}, now {})",
        summary.tickets.len(),
        summary.changelogs,
        summary.reports,
        summary.since,
        summary.recent
    );
    if !summary.committed {
        println!("No changes to checkpoint");
    }
}
