use crate::error::Result;
use crate::storage::schema::apply_schema;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params_from_iter};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tracing::trace;

/// SQLite-backed relational index.
///
/// The handle owns its connection; dropping it closes the database. All
/// writes go through `transaction`, which rolls back on any error.
#[derive(Debug)]
pub struct IndexStore {
    conn: Connection,
}

/// One row destined for a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub table: &'static str,
    pub columns: Vec<(String, SqlValue)>,
}

impl Row {
    #[must_use]
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing any earlier value for it.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

/// A saved report as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    pub id: i64,
    pub title: String,
    pub query: String,
}

/// Column names and rows of an executed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Insert `row`; fails on a primary-key collision.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_row(conn: &Connection, row: &Row) -> Result<()> {
    let columns: Vec<String> = row.columns.iter().map(|(name, _)| quote_ident(name)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(row.table),
        columns.join(", "),
        placeholders(columns.len())
    );
    trace!(table = row.table, "insert");
    conn.execute(&sql, params_from_iter(row.columns.iter().map(|(_, value)| value)))?;
    Ok(())
}

/// Insert `row`, or merge its columns into the row with the same key.
///
/// Columns absent from `row` keep their stored values.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn upsert_row(conn: &Connection, row: &Row, key: &[&str]) -> Result<()> {
    let columns: Vec<String> = row.columns.iter().map(|(name, _)| quote_ident(name)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO ",
        quote_ident(row.table),
        columns.join(", "),
        placeholders(columns.len()),
        key.iter().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ")
    );
    let updates: Vec<String> = row
        .columns
        .iter()
        .filter(|(name, _)| !key.contains(&name.as_str()))
        .map(|(name, _)| format!("{0} = excluded.{0}", quote_ident(name)))
        .collect();
    if updates.is_empty() {
        sql.push_str("NOTHING");
    } else {
        let _ = write!(sql, "UPDATE SET {}", updates.join(", "));
    }
    trace!(table = row.table, "upsert");
    conn.execute(&sql, params_from_iter(row.columns.iter().map(|(_, value)| value)))?;
    Ok(())
}

/// Delete rows of `table` matching every `(column, value)` pair.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_rows(conn: &Connection, table: &str, filter: &[(&str, SqlValue)]) -> Result<usize> {
    let mut sql = format!("DELETE FROM {}", quote_ident(table));
    if !filter.is_empty() {
        let clauses: Vec<String> = filter
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_ident(column)))
            .collect();
        let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
    }
    let deleted = conn.execute(&sql, params_from_iter(filter.iter().map(|(_, value)| value)))?;
    trace!(table, deleted, "delete");
    Ok(deleted)
}

/// Delete every row of `table`.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn clear_table(conn: &Connection, table: &str) -> Result<usize> {
    delete_rows(conn, table, &[])
}

impl IndexStore {
    /// Open the index at `path`, creating it and its schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory index for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` in one all-or-nothing transaction.
    ///
    /// # Errors
    ///
    /// Returns the first error from `f` or from committing; the
    /// transaction is rolled back in that case.
    pub fn transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fetch a value from `offtrac_meta`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM offtrac_meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    /// Number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Look up a saved report by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_report(&self, id: i64) -> Result<Option<StoredReport>> {
        let report = self
            .conn
            .query_row(
                "SELECT id, COALESCE(title, ''), COALESCE(query, '') FROM report WHERE id = ?",
                [id],
                |row| {
                    Ok(StoredReport {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        query: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(report)
    }

    /// All saved reports, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_reports(&self) -> Result<Vec<StoredReport>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, COALESCE(title, ''), COALESCE(query, '') FROM report ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredReport {
                id: row.get(0)?,
                title: row.get(1)?,
                query: row.get(2)?,
            })
        })?;
        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    /// Execute trusted report SQL and collect its result set.
    ///
    /// A statement that yields no result set (DDL, DML) produces an empty
    /// result.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL is invalid or execution fails.
    pub fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            stmt.execute([])?;
            return Ok(QueryResult::default());
        }
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(row.get::<_, SqlValue>(index)?);
            }
            rows.push(values);
        }
        Ok(QueryResult { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn enum_row(name: &str, value: &str) -> Row {
        Row::new("enum")
            .with("type", "priority".to_string())
            .with("name", name.to_string())
            .with("value", value.to_string())
    }

    #[test]
    fn insert_then_upsert_merges_columns() {
        let mut store = IndexStore::open_memory().unwrap();
        store
            .transaction(|tx| {
                insert_row(tx, &Row::new("component").with("name", "ui".to_string()).with("owner", "ann".to_string()).with("description", "front".to_string()))?;
                upsert_row(tx, &Row::new("component").with("name", "ui".to_string()).with("owner", "bob".to_string()), &["name"])
            })
            .unwrap();
        let (owner, description): (String, String) = store
            .connection()
            .query_row("SELECT owner, description FROM component WHERE name = 'ui'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(owner, "bob");
        assert_eq!(description, "front");
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut store = IndexStore::open_memory().unwrap();
        let result = store.transaction(|tx| {
            insert_row(tx, &enum_row("major", "3"))?;
            insert_row(tx, &enum_row("major", "3"))
        });
        assert!(result.is_err());
        assert_eq!(store.count_rows("enum").unwrap(), 0);
    }

    #[test]
    fn delete_by_composite_key() {
        let mut store = IndexStore::open_memory().unwrap();
        let deleted = store
            .transaction(|tx| {
                insert_row(tx, &enum_row("major", "3"))?;
                insert_row(tx, &enum_row("minor", "4"))?;
                delete_rows(
                    tx,
                    "enum",
                    &[("type", SqlValue::from("priority".to_string())), ("name", SqlValue::from("major".to_string()))],
                )
            })
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_rows("enum").unwrap(), 1);
    }

    #[test]
    fn query_without_result_set_is_empty() {
        let store = IndexStore::open_memory().unwrap();
        let result = store.run_query("CREATE TABLE scratch (x INTEGER)").unwrap();
        assert_eq!(result, QueryResult::default());
    }

    #[test]
    fn query_collects_columns_and_rows() {
        let store = IndexStore::open_memory().unwrap();
        let result = store.run_query("SELECT 1 AS a, 'x' AS b, NULL AS c").unwrap();
        assert_eq!(result.columns, vec!["a", "b", "c"]);
        assert_eq!(
            result.rows,
            vec![vec![SqlValue::Integer(1), SqlValue::Text("x".to_string()), SqlValue::Null]]
        );
    }

    #[test]
    fn reports_and_meta_lookup() {
        let mut store = IndexStore::open_memory().unwrap();
        store
            .transaction(|tx| {
                insert_row(tx, &Row::new("report").with("id", 2_i64).with("title", "Mine".to_string()).with("query", "SELECT 2".to_string()))?;
                insert_row(tx, &Row::new("report").with("id", 1_i64).with("title", "All".to_string()).with("query", "SELECT 1".to_string()))?;
                insert_row(tx, &Row::new("offtrac_meta").with("key", "git_head".to_string()).with("value", "abc".to_string()))
            })
            .unwrap();
        let ids: Vec<i64> = store.list_reports().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.get_report(2).unwrap().unwrap().title, "Mine");
        assert!(store.get_report(9).unwrap().is_none());
        assert_eq!(store.get_meta("git_head").unwrap().as_deref(), Some("abc"));
        assert_eq!(store.get_meta("recent").unwrap(), None);
    }

    #[test]
    fn open_on_disk_creates_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offtrac.db");
        {
            let store = IndexStore::open(&path).unwrap();
            assert_eq!(store.count_rows("ticket").unwrap(), 0);
        }
        assert!(path.exists());
    }

    #[test]
    fn row_set_replaces_existing_column() {
        let mut row = Row::new("ticket").with("status", "new".to_string());
        row.set("status", "closed".to_string());
        assert_eq!(row.columns.len(), 1);
        assert_eq!(row.get("status"), Some(&SqlValue::Text("closed".to_string())));
    }
}
