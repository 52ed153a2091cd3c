//! `offtrac status`: show snapshot and index state without changing either.

use super::{CommandContext, git_for, print_json};
use crate::config::Settings;
use crate::error::Result;
use crate::index::GIT_HEAD_KEY;
use crate::model::SnapshotMetadata;
use crate::snapshot::path::{METADATA_FILE, SNAPSHOT_VERSION};
use crate::storage::IndexStore;
use serde::Serialize;
use std::fs;
use std::io;

/// Snapshot and index state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub root: String,
    pub recent: String,
    pub version: i64,
    /// Snapshot HEAD, if anything was checkpointed.
    pub head: Option<String>,
    /// Revision the index was last built from.
    pub indexed_head: Option<String>,
    pub up_to_date: bool,
}

/// Collect status for the configured root.
///
/// # Errors
///
/// Returns an error if `db.json`, git or the index cannot be read.
pub fn collect(settings: &Settings) -> Result<Status> {
    let metadata = match fs::read_to_string(settings.root.join(METADATA_FILE)) {
        Ok(contents) => serde_json::from_str(&contents)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => SnapshotMetadata::default(),
        Err(err) => return Err(err.into()),
    };

    let git = git_for(settings);
    let head = if settings.root.join(".git").exists() && git.has_head()? {
        Some(git.rev_parse_head()?)
    } else {
        None
    };

    let database = settings.database_path();
    let indexed_head = if database.exists() {
        IndexStore::open(&database)?.get_meta(GIT_HEAD_KEY)?
    } else {
        None
    };

    Ok(Status {
        root: settings.root.display().to_string(),
        recent: metadata.recent().to_string(),
        version: metadata.version.unwrap_or(SNAPSHOT_VERSION),
        up_to_date: head.is_some() && head == indexed_head,
        head,
        indexed_head,
    })
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if state cannot be read.
pub fn execute(ctx: &CommandContext) -> Result<()> {
    let status = collect(&ctx.settings()?)?;
    if ctx.json {
        return print_json(&status);
    }
    let none = "(none)";
    println!("Root:         {}", status.root);
    println!("Watermark:    {}", status.recent);
    println!("Version:      {}", status.version);
    println!("Head:         {}", status.head.as_deref().unwrap_or(none));
    println!("Indexed head: {}", status.indexed_head.as_deref().unwrap_or(none));
    if !status.up_to_date {
        println!("Index is behind the snapshot; run: offtrac reindex");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLayer;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        let mut layer = ConfigLayer::default();
        layer.set("root", dir.path().join("db").to_string_lossy());
        Settings::from_layer(&layer).unwrap()
    }

    #[test]
    fn missing_root_reports_defaults() {
        let dir = TempDir::new().unwrap();
        let status = collect(&settings(&dir)).unwrap();
        assert_eq!(status.recent, "2000-01-01T00:00:00");
        assert_eq!(status.version, 2);
        assert_eq!(status.head, None);
        assert_eq!(status.indexed_head, None);
        assert!(!status.up_to_date);
    }

    #[test]
    fn reindexed_snapshot_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        crate::cli::commands::reindex::run(&settings, false).unwrap();
        let status = collect(&settings).unwrap();
        assert!(status.head.is_some());
        assert_eq!(status.head, status.indexed_head);
        assert!(status.up_to_date);
    }
}
