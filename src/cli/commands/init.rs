//! `offtrac init`: prepare the snapshot directory.

use super::{CommandContext, open_snapshot, print_json};
use crate::error::Result;
use serde_json::json;
use tracing::info;

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be initialized.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    let snapshot = open_snapshot(&settings)?;
    let head = snapshot.current_revision()?;
    info!(root = %settings.root.display(), %head, "Snapshot ready");

    if ctx.json {
        print_json(&json!({
            "root": settings.root.display().to_string(),
            "head": head,
            "recent": snapshot.recent(),
        }))?;
    } else if ctx.human() {
        println!("Initialized snapshot in {} at {head}", settings.root.display());
    }
    Ok(())
}
