//! Error types and handling for `offtrac`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Every failure propagates to the top-level command and terminates the run
//! - Provides recovery hints for operator-facing errors
//! - Provides structured JSON output for `--json` runs

mod structured;

pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `offtrac` operations.
#[derive(Error, Debug)]
pub enum OfftracError {
    // === Remote Errors ===
    /// The tracker answered an RPC call with an error payload.
    #[error("Remote call '{method}' failed: {message}")]
    RemoteCall { method: String, message: String },

    /// HTTP transport failed (after the bounded retries for bad responses).
    #[error("Transport error for '{url}': {message}")]
    Transport { url: String, message: String },

    /// The tracker answered with a body that does not follow the RPC contract.
    #[error("Malformed RPC response: {0}")]
    Protocol(String),

    // === Snapshot Errors ===
    /// An external version-control command exited non-zero.
    #[error("{command} returned {code}: {stderr}")]
    Process {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The on-disk snapshot predates the oldest supported layout.
    #[error("Snapshot version {found} no longer supported (minimum {minimum})")]
    UnsupportedSnapshotVersion { found: i64, minimum: i64 },

    /// The on-disk snapshot was written by a newer release.
    #[error("Snapshot version {found} is newer than supported version {current}")]
    FutureSnapshotVersion { found: i64, current: i64 },

    /// A snapshot document could not be turned into rows.
    #[error("Invalid document '{path}': {reason}")]
    InvalidDocument { path: String, reason: String },

    // === Storage Errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested report does not exist in the relational store.
    #[error("Report not found: {id}")]
    ReportNotFound { id: String },

    /// The relational store file is missing.
    #[error("Index database not found at '{path}'")]
    IndexNotFound { path: PathBuf },

    // === Configuration Errors ===
    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OfftracError {
    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedSnapshotVersion { .. } => {
                Some("Move the snapshot directory aside and run: offtrac sync")
            }
            Self::FutureSnapshotVersion { .. } => Some("Upgrade offtrac to read this snapshot"),
            Self::IndexNotFound { .. } => Some("Run: offtrac reindex"),
            Self::ReportNotFound { .. } => Some("List known reports with: offtrac reports"),
            Self::Transport { .. } => Some("Check the tracker URL and network connectivity"),
            Self::Process { .. } => Some("Check that git is installed and the snapshot is a git work tree"),
            _ => None,
        }
    }

    /// Get the exit code for this error.
    ///
    /// There is no exit-code taxonomy: any failure exits with 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create an invalid-document error for a snapshot path.
    #[must_use]
    pub fn invalid_document(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `OfftracError`.
pub type Result<T> = std::result::Result<T, OfftracError>;
