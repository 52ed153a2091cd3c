//! `offtrac report`: run a stored report against the index.

use super::{CommandContext, open_index};
use crate::cli::{ReportArgs, ReportFormat};
use crate::error::{OfftracError, Result};
use crate::format::{COMMA, TAB, clean_sql, results_json, write_delimited};
use crate::storage::{IndexStore, StoredReport};
use std::io::{self, Write};
use tracing::debug;

/// Look up a report by its textual id.
///
/// # Errors
///
/// Returns `ReportNotFound` for non-numeric or unknown ids.
pub fn find_report(index: &IndexStore, id: &str) -> Result<StoredReport> {
    let not_found = || OfftracError::ReportNotFound { id: id.to_string() };
    let numeric: i64 = id.trim().parse().map_err(|_| not_found())?;
    index.get_report(numeric)?.ok_or_else(not_found)
}

/// Run report `id` and write it in `format`.
///
/// # Errors
///
/// Returns `ReportNotFound`, a database error from the report's query, or
/// a write error.
pub fn render<W: Write>(
    index: &IndexStore,
    id: &str,
    format: ReportFormat,
    user: &str,
    out: &mut W,
) -> Result<()> {
    let report = find_report(index, id)?;
    if format == ReportFormat::Sql {
        writeln!(out, "{}", report.query)?;
        return Ok(());
    }

    let sql = clean_sql(&report.query, user);
    debug!(id = report.id, %sql, "Running report");
    let result = index.run_query(&sql)?;
    match format {
        ReportFormat::Json => {
            serde_json::to_writer(&mut *out, &results_json(&result))?;
            writeln!(out)?;
        }
        ReportFormat::Csv => write_delimited(out, &result, COMMA)?,
        ReportFormat::Tab => write_delimited(out, &result, TAB)?,
        ReportFormat::Sql => {}
    }
    Ok(())
}

/// Execute the report command.
///
/// # Errors
///
/// Returns `IndexNotFound` before the first reindex, or any `render` error.
pub fn execute(args: &ReportArgs, ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    let index = open_index(&settings, false)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    render(&index, &args.id, args.format, &args.user, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Row, insert_row};

    fn index() -> IndexStore {
        let mut index = IndexStore::open_memory().unwrap();
        index
            .transaction(|tx| {
                insert_row(
                    tx,
                    &Row::new("report")
                        .with("id", 1_i64)
                        .with("title", "Mine".to_string())
                        .with("query", "SELECT id, owner FROM ticket WHERE owner = '$USER' ORDER BY id::int".to_string()),
                )?;
                for (id, owner) in [(1_i64, "ann"), (2, "bob"), (3, "ann")] {
                    insert_row(
                        tx,
                        &Row::new("ticket")
                            .with("id", id)
                            .with("owner", owner.to_string()),
                    )?;
                }
                Ok(())
            })
            .unwrap();
        index
    }

    fn rendered(id: &str, format: ReportFormat, user: &str) -> Result<String> {
        let mut out = Vec::new();
        render(&index(), id, format, user, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn json_substitutes_user() {
        assert_eq!(
            rendered("1", ReportFormat::Json, "ann").unwrap(),
            "{\"results\":[{\"id\":1,\"owner\":\"ann\"},{\"id\":3,\"owner\":\"ann\"}]}\n"
        );
    }

    #[test]
    fn csv_and_tab() {
        assert_eq!(
            rendered("1", ReportFormat::Csv, "bob").unwrap(),
            "id,owner\r\n2,bob\r\n"
        );
        assert_eq!(
            rendered("1", ReportFormat::Tab, "bob").unwrap(),
            "id\towner\r\n2\tbob\r\n"
        );
    }

    #[test]
    fn csv_of_empty_result_is_empty() {
        assert_eq!(rendered("1", ReportFormat::Csv, "nobody").unwrap(), "");
    }

    #[test]
    fn sql_prints_stored_query() {
        assert!(rendered("1", ReportFormat::Sql, "ann").unwrap().contains("::int"));
    }

    #[test]
    fn unknown_and_non_numeric_ids() {
        for id in ["2", "abc"] {
            let err = rendered(id, ReportFormat::Json, "bob").unwrap_err();
            assert!(matches!(err, OfftracError::ReportNotFound { .. }), "{id}: {err}");
        }
    }
}
