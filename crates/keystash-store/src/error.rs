//! Error types for the keystash-store crate.
//!
//! All fallible operations return [`StoreError`] via [`StoreResult`].
//! Malformed slot contents are recovered locally and never reach this type;
//! backend I/O failures always do.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the store, its backends, or the backup path.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// A slot name cannot be mapped onto the backend.
    #[error("invalid slot name `{0}`")]
    InvalidSlotName(String),

    /// The backing adapter rejected an operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backup timestamp failed date validation.
    #[error("invalid backup timestamp `{0}`")]
    InvalidTimestamp(String),

    /// A backup document does not belong to the filename it was loaded as.
    #[error("backup identity mismatch: expected {expected}, found {found}")]
    IdentityMismatch { expected: String, found: String },

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned(err.to_string())
    }
}
