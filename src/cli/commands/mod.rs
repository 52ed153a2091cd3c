//! Command implementations.
//!
//! Each command resolves [`Settings`] from the layered config, opens the
//! stores it needs, and prints either human-readable text or JSON.

pub mod completions;
pub mod init;
pub mod reindex;
pub mod report;
pub mod reports;
pub mod status;
pub mod sync;
pub mod update;

use crate::config::{CliOverrides, Settings, load_settings};
use crate::error::{OfftracError, Result};
use crate::remote::{HttpTransport, RemoteClient};
use crate::snapshot::{Git, SnapshotStore};
use crate::storage::IndexStore;
use crate::util::progress::should_show_progress;
use serde::Serialize;
use std::path::Path;

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub overrides: CliOverrides,
    pub json: bool,
    pub quiet: bool,
}

impl CommandContext {
    /// Resolve settings from every config layer.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or value is invalid.
    pub fn settings(&self) -> Result<Settings> {
        load_settings(&self.overrides)
    }

    /// Progress bars only make sense for interactive, human-readable runs.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json && should_show_progress()
    }

    /// Human-readable output is suppressed by `--quiet`.
    #[must_use]
    pub const fn human(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Git runner for the snapshot root with the configured identity.
#[must_use]
pub fn git_for(settings: &Settings) -> Git {
    Git::new(settings.git.clone(), settings.root.clone()).with_identity(settings.git_identity())
}

/// Open the snapshot and bring it to its last checkpoint.
///
/// The configured index file is kept out of git and survives cleanup.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be initialized.
pub fn open_snapshot(settings: &Settings) -> Result<SnapshotStore> {
    let mut snapshot =
        SnapshotStore::new(git_for(settings)).with_index_file(Path::new(&settings.database));
    snapshot.init()?;
    Ok(snapshot)
}

/// Open the index, creating it when `create` is set.
///
/// # Errors
///
/// Returns `IndexNotFound` when the file is missing and `create` is false.
pub fn open_index(settings: &Settings, create: bool) -> Result<IndexStore> {
    let path = settings.database_path();
    if !create && !path.exists() {
        return Err(OfftracError::IndexNotFound { path });
    }
    IndexStore::open(&path)
}

#[must_use]
pub fn remote_client(settings: &Settings) -> RemoteClient<HttpTransport> {
    let config = settings.remote_config();
    RemoteClient::new(HttpTransport::new(&config))
        .with_rpc_path(config.rpc_path.clone())
        .with_batch_size(config.batch_size)
}

/// Print a value as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
