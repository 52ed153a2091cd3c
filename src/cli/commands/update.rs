//! `offtrac update`: sync followed by reindex.

use super::{CommandContext, print_json, reindex, sync};
use crate::error::Result;
use serde_json::json;

/// Execute the update command.
///
/// The reindex only runs after a successful pull.
///
/// # Errors
///
/// Returns the first error from either step.
pub fn execute(full: bool, ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    let synced = sync::run(&settings, ctx.show_progress())?;
    let reindexed = reindex::run(&settings, full)?;
    if ctx.json {
        print_json(&json!({ "sync": synced, "reindex": reindexed }))?;
    } else if ctx.human() {
        sync::print_summary(&synced);
        reindex::print_summary(&reindexed);
    }
    Ok(())
}
