//! Error types for geiger-store.

use std::path::PathBuf;

/// Result type for geiger-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in geiger-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A device vanished between a conflicting insert and the re-fetch.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Stored timestamp is outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
