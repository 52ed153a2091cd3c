//! `offtrac reports`: list stored reports.

use super::{CommandContext, open_index, print_json};
use crate::error::Result;
use serde_json::json;

/// Execute the reports command.
///
/// # Errors
///
/// Returns `IndexNotFound` before the first reindex, or a database error.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    let index = open_index(&settings, false)?;
    let reports = index.list_reports()?;

    if ctx.json {
        let listed: Vec<_> = reports
            .iter()
            .map(|report| json!({ "id": report.id, "title": report.title }))
            .collect();
        return print_json(&listed);
    }
    for report in &reports {
        println!("{}\t{}", report.id, report.title);
    }
    Ok(())
}
