//! Structured error output.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags

use crate::error::OfftracError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// Format: `SCREAMING_SNAKE_CASE` for easy parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Remote RPC returned an error payload
    RemoteCallError,
    /// HTTP transport failed
    TransportError,
    /// RPC response did not follow the protocol
    ProtocolError,
    /// A version-control command failed
    ProcessError,
    /// Snapshot layout too old or too new
    UnsupportedSnapshotVersion,
    /// Snapshot document could not be derived
    InvalidDocument,
    /// Relational store failure
    DatabaseError,
    /// Report id unknown
    ReportNotFound,
    /// Relational store missing
    IndexNotFound,
    /// Configuration problem
    ConfigError,
    /// File I/O error
    IoError,
    /// JSON serialization error
    JsonError,
    /// YAML parsing error
    YamlError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteCallError => "REMOTE_CALL_ERROR",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::ProcessError => "PROCESS_ERROR",
            Self::UnsupportedSnapshotVersion => "UNSUPPORTED_SNAPSHOT_VERSION",
            Self::InvalidDocument => "INVALID_DOCUMENT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ReportNotFound => "REPORT_NOT_FOUND",
            Self::IndexNotFound => "INDEX_NOT_FOUND",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
        }
    }

    /// Whether re-running the same command may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError | Self::DatabaseError)
    }
}

/// A structured error ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl StructuredError {
    /// Build a structured error from an `OfftracError`.
    #[must_use]
    pub fn from_error(err: &OfftracError) -> Self {
        let code = code_for(err);
        Self {
            code,
            message: err.to_string(),
            hint: err.suggestion().map(str::to_string),
            retryable: code.is_retryable(),
        }
    }

    /// JSON form written to stderr in `--json` mode.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
            }
        })
    }

    /// Human-readable form, optionally colored.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }
        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }
}

const fn code_for(err: &OfftracError) -> ErrorCode {
    match err {
        OfftracError::RemoteCall { .. } => ErrorCode::RemoteCallError,
        OfftracError::Transport { .. } => ErrorCode::TransportError,
        OfftracError::Protocol(_) => ErrorCode::ProtocolError,
        OfftracError::Process { .. } => ErrorCode::ProcessError,
        OfftracError::UnsupportedSnapshotVersion { .. }
        | OfftracError::FutureSnapshotVersion { .. } => ErrorCode::UnsupportedSnapshotVersion,
        OfftracError::InvalidDocument { .. } => ErrorCode::InvalidDocument,
        OfftracError::Database(_) => ErrorCode::DatabaseError,
        OfftracError::ReportNotFound { .. } => ErrorCode::ReportNotFound,
        OfftracError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
        OfftracError::Config(_) => ErrorCode::ConfigError,
        OfftracError::Io(_) => ErrorCode::IoError,
        OfftracError::Json(_) => ErrorCode::JsonError,
        OfftracError::Yaml(_) => ErrorCode::YamlError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ProcessError.as_str(), "PROCESS_ERROR");
        assert_eq!(
            ErrorCode::UnsupportedSnapshotVersion.as_str(),
            "UNSUPPORTED_SNAPSHOT_VERSION"
        );
    }

    #[test]
    fn test_structured_error_to_json() {
        let err = OfftracError::ReportNotFound {
            id: "12".to_string(),
        };
        let structured = StructuredError::from_error(&err);
        let json = structured.to_json();
        assert_eq!(json["error"]["code"], "REPORT_NOT_FOUND");
        assert_eq!(json["error"]["message"], "Report not found: 12");
        assert_eq!(json["error"]["retryable"], false);
        assert_eq!(
            json["error"]["hint"],
            "List known reports with: offtrac reports"
        );
    }

    #[test]
    fn test_to_human_output() {
        let err = OfftracError::Config("batch-size must be at least 1".to_string());
        let structured = StructuredError::from_error(&err);
        let human = structured.to_human(false);
        assert_eq!(
            human,
            "Error: Configuration error: batch-size must be at least 1"
        );
    }
}
