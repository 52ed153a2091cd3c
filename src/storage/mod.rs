//! Relational index storage.

pub mod schema;
pub mod sqlite;

pub use sqlite::{
    IndexStore, QueryResult, Row, StoredReport, clear_table, delete_rows, insert_row, upsert_row,
};
