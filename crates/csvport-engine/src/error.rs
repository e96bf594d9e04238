//! Error types for the migration engine.
//!
//! File workers branch on a tagged [`FileFailure`] rather than on
//! exception downcasts: a structural failure (missing file, undetectable
//! delimiter, empty header) aborts that file only, while anything else is
//! carried as an opaque message. Row-level problems never surface here —
//! they are reported through error sinks and persisted as job errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// File system operations failed.
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// The migration root folder does not exist or is not a directory.
    #[error("Root folder '{}' does not exist or is not a directory", .0.display())]
    RootFolderMissing(PathBuf),

    /// A SQL Server operation failed.
    #[error("Database operation failed: {operation}: {reason}")]
    Database { operation: String, reason: String },

    /// Invalid argument passed to an engine operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested entity does not exist in the control tables.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// A defect in the engine itself, e.g. a panicked worker.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn database(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<tiberius::error::Error> for EngineError {
    fn from(e: tiberius::error::Error) -> Self {
        EngineError::database("sql", e)
    }
}

/// Why a single file's processing was aborted.
#[derive(Error, Debug)]
pub enum FileFailure {
    /// Unrecoverable defect in the file's shape: missing or unreadable
    /// file, undetectable delimiter, empty or missing header.
    #[error("Structural failure: {0}")]
    Structural(String),

    /// Any other failure while processing the file.
    #[error("{0}")]
    Other(String),
}

impl FileFailure {
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub fn other(message: impl std::fmt::Display) -> Self {
        Self::Other(message.to_string())
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, FileFailure::Structural(_))
    }

    pub fn message(&self) -> &str {
        match self {
            FileFailure::Structural(m) | FileFailure::Other(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_failure_kinds() {
        let s = FileFailure::structural("empty header");
        assert!(s.is_structural());
        assert_eq!(s.message(), "empty header");

        let o = FileFailure::other("disk on fire");
        assert!(!o.is_structural());
        assert_eq!(o.to_string(), "disk on fire");
    }

    #[test]
    fn test_engine_error_display() {
        let e = EngineError::database("create table", "login failed");
        assert!(e.to_string().contains("create table"));
        assert!(e.to_string().contains("login failed"));

        let e = EngineError::not_found("Job", "abc");
        assert_eq!(e.to_string(), "Job 'abc' not found");
    }
}
