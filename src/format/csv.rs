//! Delimited report output.
//!
//! Spreadsheet-style CSV and TSV: records end with CRLF, and a field is
//! quoted when it contains the delimiter, a quote, or a line break.

use crate::storage::QueryResult;
use std::io::{self, Write};

use super::report::value_text;

pub const COMMA: char = ',';
pub const TAB: char = '\t';

const LINE_END: &str = "\r\n";

/// Escape one field for the given delimiter.
///
/// Doubles any quotes within the value.
#[must_use]
pub fn escape_field(value: &str, delimiter: char) -> String {
    let needs_quoting = value.contains(delimiter)
        || value.contains('"')
        || value.contains('\n')
        || value.contains('\r');

    if needs_quoting {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

fn write_record<W: Write, S: AsRef<str>>(
    writer: &mut W,
    fields: impl Iterator<Item = S>,
    delimiter: char,
) -> io::Result<()> {
    let line = fields
        .map(|field| escape_field(field.as_ref(), delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string());
    write!(writer, "{line}{LINE_END}")
}

/// Write a result set as delimited text.
///
/// An empty result set produces no output at all, not even a header.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_delimited<W: Write>(
    writer: &mut W,
    result: &QueryResult,
    delimiter: char,
) -> io::Result<()> {
    if result.rows.is_empty() {
        return Ok(());
    }
    write_record(writer, result.columns.iter(), delimiter)?;
    for row in &result.rows {
        write_record(writer, row.iter().map(value_text), delimiter)?;
    }
    Ok(())
}

/// Format a result set as a delimited string.
#[must_use]
pub fn format_delimited(result: &QueryResult, delimiter: char) -> String {
    let mut output = Vec::new();
    if write_delimited(&mut output, result, delimiter).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&output).into_owned()
}
