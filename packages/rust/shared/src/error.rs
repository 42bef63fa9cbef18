//! Error types for ReportKit.
//!
//! Library crates use [`ReportKitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only whole-file problems travel as errors. Row-level problems are folded
//! into the import report as [`ErrorKind`]-tagged failures or soft warnings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all ReportKit operations.
#[derive(Debug, thiserror::Error)]
pub enum ReportKitError {
    /// The file bytes could not be decoded as the declared kind.
    #[error("malformed file: {message}")]
    MalformedFile { message: String },

    /// The file decoded but contains no data rows.
    #[error("empty file: no data rows found")]
    EmptyFile,

    /// The file exceeds the configured size cap and was not parsed.
    #[error("file is {size} bytes, exceeding the {limit} byte limit")]
    OversizeFile { size: usize, limit: usize },

    /// No column maps to a field every record needs.
    #[error("no column maps to required field '{field}'")]
    MissingRequiredField { field: String },

    /// The persistence collaborator rejected a call.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A persistence call did not finish within its time budget.
    #[error("timed out after {millis} ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReportKitError>;

impl ReportKitError {
    /// Create a malformed-file error from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFile {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// How this error is reported when it only affects a single row.
    pub fn row_kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Persistence,
        }
    }
}

/// Classification of a row-level failure in the import report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An insert or update call failed.
    Persistence,
    /// An insert, update or lookup call exceeded its time budget.
    Timeout,
    /// The natural-key lookup failed before classification.
    Lookup,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistence => "persistence",
            Self::Timeout => "timeout",
            Self::Lookup => "lookup",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
