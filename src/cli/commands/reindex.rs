//! `offtrac reindex`: load the snapshot into the relational index.

use super::{CommandContext, open_index, open_snapshot, print_json};
use crate::config::Settings;
use crate::error::Result;
use crate::index::{ReindexSummary, Reindexer, Strategy};

/// Reindex the configured snapshot.
///
/// # Errors
///
/// Returns an error if the snapshot or index cannot be opened, or the run fails.
pub fn run(settings: &Settings, full: bool) -> Result<ReindexSummary> {
    let snapshot = open_snapshot(settings)?;
    let mut index = open_index(settings, true)?;
    Reindexer::new(&snapshot, &mut index).reindex(full)
}

/// Execute the reindex command.
///
/// # Errors
///
/// Returns an error if settings are invalid or the run fails.
pub fn execute(full: bool, ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    let summary = run(&settings, full)?;
    if ctx.json {
        print_json(&summary)?;
    } else if ctx.human() {
        print_summary(&summary);
    }
    Ok(())
}

pub(super) fn print_summary(summary: &ReindexSummary) {
    let strategy = match &summary.strategy {
        Strategy::Full => "full".to_string(),
        Strategy::Incremental { since } => format!("incremental from {since}"),
    };
    println!(
        "Reindexed to {} ({strategy}): {} written, {} deleted, {} skipped",
        summary.head, summary.written, summary.deleted, summary.skipped
    );
}
