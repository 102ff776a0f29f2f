//! Store error types

use thiserror::Error;

/// Errors raised by project store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
