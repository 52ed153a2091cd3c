//! Report rendering.
//!
//! - [`report`] prepares stored report SQL and renders results as JSON
//! - [`csv`] writes results as CSV or TSV

pub mod csv;
pub mod report;

pub use csv::{COMMA, TAB, format_delimited, write_delimited};
pub use report::{DEFAULT_REPORT_USER, clean_sql, results_json};
