//! Snapshot layout and entity file names.
//!
//! Every entity lives at `<dir>/<url-safe-id>.json`. The id is escaped the
//! way HTML form values are (`quote_plus`): ASCII letters, digits and
//! `_.-` stay as they are, space becomes `+`, every other byte is `%XX`.

use crate::model::FieldKind;
use std::fmt::Write as _;

/// Sync metadata file at the snapshot root.
pub const METADATA_FILE: &str = "db.json";
/// Ignore file at the snapshot root.
pub const GITIGNORE_FILE: &str = ".gitignore";
/// Patterns that must always be ignored (the relational store lives in the root).
pub const IGNORES: &[&str] = &["*.db", "*.db-journal", "*.db-shm", "*.db-wal"];
/// Files `SQLite` keeps next to a database, as suffixes of its name.
pub const INDEX_SIDECARS: &[&str] = &["-journal", "-shm", "-wal"];

pub const REPORT_DIR: &str = "report";
pub const TICKET_DIR: &str = "ticket";
pub const CHANGELOG_DIR: &str = "changelog";
pub const FIELD_DIR: &str = "field";

/// Layout version written to `db.json`.
pub const SNAPSHOT_VERSION: i64 = 2;
/// Oldest layout that can still be read.
pub const MIN_SNAPSHOT_VERSION: i64 = 2;

/// All fixed subdirectories, relative to the root.
#[must_use]
pub fn snapshot_dirs() -> Vec<String> {
    let mut dirs = vec![
        REPORT_DIR.to_string(),
        TICKET_DIR.to_string(),
        CHANGELOG_DIR.to_string(),
    ];
    dirs.extend(FieldKind::ALL.iter().map(FieldKind::dir));
    dirs
}

/// Escape an entity id for use as a file stem.
#[must_use]
pub fn url_safe_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.' | b'-' => {
                out.push(char::from(byte));
            }
            b' ' => out.push('+'),
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}

/// Relative path of an entity document inside `dir`.
#[must_use]
pub fn entity_path(dir: &str, id: &str) -> String {
    format!("{dir}/{}.json", url_safe_id(id))
}

/// Recover the entity id from a document path.
///
/// Takes the final path component, drops its extension and reverses
/// `url_safe_id`. Malformed escapes are kept verbatim.
#[must_use]
pub fn path_id(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    unquote_plus(stem)
}

fn unquote_plus(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// The index file at `relative` and its sidecars, relative to the root.
#[must_use]
pub fn index_files(relative: &str) -> Vec<String> {
    std::iter::once(relative.to_string())
        .chain(INDEX_SIDECARS.iter().map(|suffix| format!("{relative}{suffix}")))
        .collect()
}

/// Anchored ignore pattern matching exactly `relative`.
#[must_use]
pub fn literal_ignore(relative: &str) -> String {
    let mut pattern = String::with_capacity(relative.len() + 1);
    pattern.push('/');
    for ch in relative.chars() {
        if matches!(ch, '*' | '?' | '[' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern
}

/// Directory part of a relative path (`field/priority/x.json` -> `field/priority`).
#[must_use]
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}
