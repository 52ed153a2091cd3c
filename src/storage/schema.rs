//! Relational schema for the index database.

use rusqlite::{Connection, Result};

/// Tables owned by the reindexer, in the order a full rebuild clears them.
pub const MODELED_TABLES: &[&str] = &[
    "component",
    "version",
    "milestone",
    "enum",
    "report",
    "ticket_change",
    "ticket_custom",
    "ticket",
    "offtrac_meta",
];

/// The complete SQL schema for the index database.
///
/// Column types follow the tracker's own database so stored report SQL
/// runs unchanged. Times are epoch milliseconds.
pub const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS offtrac_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );

    CREATE TABLE IF NOT EXISTS ticket (
        id INTEGER PRIMARY KEY,
        type TEXT,
        time INTEGER,
        changetime INTEGER,
        component TEXT,
        severity TEXT,
        priority TEXT,
        owner TEXT,
        reporter TEXT,
        cc TEXT,
        version TEXT,
        milestone TEXT,
        status TEXT,
        resolution TEXT,
        summary TEXT,
        description TEXT,
        keywords TEXT
    );
    CREATE INDEX IF NOT EXISTS ticket_time_idx ON ticket(time);
    CREATE INDEX IF NOT EXISTS ticket_status_idx ON ticket(status);

    CREATE TABLE IF NOT EXISTS ticket_change (
        ticket INTEGER NOT NULL,
        time INTEGER NOT NULL,
        author TEXT,
        field TEXT NOT NULL,
        oldvalue TEXT,
        newvalue TEXT,
        PRIMARY KEY (ticket, time, field)
    );
    CREATE INDEX IF NOT EXISTS ticket_change_ticket_idx ON ticket_change(ticket);
    CREATE INDEX IF NOT EXISTS ticket_change_time_idx ON ticket_change(time);

    CREATE TABLE IF NOT EXISTS ticket_custom (
        ticket INTEGER NOT NULL,
        name TEXT NOT NULL,
        value TEXT,
        PRIMARY KEY (ticket, name)
    );

    CREATE TABLE IF NOT EXISTS enum (
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        value TEXT,
        PRIMARY KEY (type, name)
    );

    CREATE TABLE IF NOT EXISTS component (
        name TEXT PRIMARY KEY,
        owner TEXT,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS version (
        name TEXT PRIMARY KEY,
        time INTEGER,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS milestone (
        name TEXT PRIMARY KEY,
        due INTEGER,
        completed INTEGER,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS report (
        id INTEGER PRIMARY KEY,
        author TEXT,
        title TEXT,
        query TEXT,
        description TEXT
    );

    -- Tracker tables kept for report compatibility; never populated.
    CREATE TABLE IF NOT EXISTS attachment (
        type TEXT NOT NULL,
        id TEXT NOT NULL,
        filename TEXT NOT NULL,
        size INTEGER,
        time INTEGER,
        description TEXT,
        author TEXT,
        ipnr TEXT,
        PRIMARY KEY (type, id, filename)
    );

    CREATE TABLE IF NOT EXISTS wiki (
        name TEXT NOT NULL,
        version INTEGER NOT NULL,
        time INTEGER,
        author TEXT,
        ipnr TEXT,
        text TEXT,
        comment TEXT,
        readonly INTEGER,
        PRIMARY KEY (name, version)
    );
    CREATE INDEX IF NOT EXISTS wiki_time_idx ON wiki(time);

    CREATE TABLE IF NOT EXISTS repository (
        id INTEGER NOT NULL,
        name TEXT NOT NULL,
        value TEXT,
        PRIMARY KEY (id, name)
    );

    CREATE TABLE IF NOT EXISTS revision (
        repos INTEGER NOT NULL,
        rev TEXT NOT NULL,
        time INTEGER,
        author TEXT,
        message TEXT,
        PRIMARY KEY (repos, rev)
    );
    CREATE INDEX IF NOT EXISTS revision_repos_time_idx ON revision(repos, time);

    CREATE TABLE IF NOT EXISTS node_change (
        repos INTEGER NOT NULL,
        rev TEXT NOT NULL,
        path TEXT NOT NULL,
        node_type TEXT,
        change_type TEXT NOT NULL,
        base_path TEXT,
        base_rev TEXT,
        PRIMARY KEY (repos, rev, path, change_type)
    );

    CREATE TABLE IF NOT EXISTS system (
        name TEXT PRIMARY KEY,
        value TEXT
    );

    CREATE TABLE IF NOT EXISTS permission (
        username TEXT NOT NULL,
        action TEXT NOT NULL,
        PRIMARY KEY (username, action)
    );

    CREATE TABLE IF NOT EXISTS session (
        sid TEXT NOT NULL,
        authenticated INTEGER NOT NULL,
        last_visit INTEGER,
        PRIMARY KEY (sid, authenticated)
    );

    CREATE TABLE IF NOT EXISTS session_attribute (
        sid TEXT NOT NULL,
        authenticated INTEGER NOT NULL,
        name TEXT NOT NULL,
        value TEXT,
        PRIMARY KEY (sid, authenticated, name)
    );

    CREATE TABLE IF NOT EXISTS auth_cookie (
        cookie TEXT NOT NULL,
        name TEXT NOT NULL,
        ipnr TEXT NOT NULL,
        time INTEGER,
        PRIMARY KEY (cookie, ipnr, name)
    );

    CREATE TABLE IF NOT EXISTS cache (
        id TEXT PRIMARY KEY,
        generation INTEGER
    );
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables = table_names(&conn);
        for table in MODELED_TABLES {
            assert!(tables.contains(&(*table).to_string()), "missing {table}");
        }
        for legacy in ["attachment", "wiki", "session_attribute", "auth_cookie", "cache"] {
            assert!(tables.contains(&legacy.to_string()), "missing {legacy}");
        }
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn.execute("INSERT INTO enum (type, name, value) VALUES ('priority', 'major', '3')", [])
            .unwrap();
        apply_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM enum", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
