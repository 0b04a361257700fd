//! Error types for verdant-store.

use std::path::PathBuf;

/// Result type for verdant-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in verdant-store.
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

    /// The database was written with a schema this build does not know.
    #[error("Unsupported schema version {found} (this build supports {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// An entity key does not match its table's identity strategy.
    #[error("Key for {table} is {found:?}, table is keyed by {expected:?}")]
    KeyStrategy {
        table: &'static str,
        expected: verdant_types::IdentityStrategy,
        found: verdant_types::IdentityStrategy,
    },

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A stored history payload could not be decoded.
    #[error("Corrupt history payload: {0}")]
    Payload(#[from] verdant_types::PayloadError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
