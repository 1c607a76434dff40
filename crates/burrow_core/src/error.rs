//! Error types for the database core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by the database core.
#[derive(Debug, Error)]
pub enum DbError {
    /// The requested key does not exist.
    #[error("key not found")]
    KeyNotFound,

    /// The key already exists and neither overwrite nor duplicate was
    /// requested.
    #[error("duplicate key")]
    DuplicateKey,

    /// The key exists but was erased in a transaction.
    ///
    /// Internal sentinel: cursor moves translate this to [`Self::KeyNotFound`]
    /// before returning to the caller.
    #[error("key was erased in a transaction")]
    KeyErasedInTxn,

    /// The key is claimed by another still-active transaction.
    #[error("write conflict with an active transaction")]
    TxnConflict,

    /// The database is still modified by an active transaction.
    #[error("a transaction with operations on this database is still open")]
    TxnStillOpen,

    /// The cursor does not point at a key.
    #[error("cursor is nil")]
    CursorIsNil,

    /// The supplied key does not match the configured key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Configured key size.
        expected: usize,
        /// Size of the supplied key.
        actual: usize,
    },

    /// The supplied record does not match the configured record size.
    #[error("invalid record size: expected {expected} bytes, got {actual}")]
    InvalidRecordSize {
        /// Configured record size.
        expected: usize,
        /// Size of the supplied record.
        actual: usize,
    },

    /// An argument failed validation.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the violation.
        message: String,
    },

    /// An index structure failed its integrity check.
    #[error("integrity check failed: {message}")]
    Corruption {
        /// Description of the inconsistency.
        message: String,
    },

    /// The database handle was already closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Storage backend failure, surfaced from the journal.
    #[error("storage error: {0}")]
    Storage(#[from] burrow_storage::StorageError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DbError {
    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid-key-size error.
    pub fn invalid_key_size(expected: usize, actual: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates an invalid-record-size error.
    pub fn invalid_record_size(expected: usize, actual: usize) -> Self {
        Self::InvalidRecordSize { expected, actual }
    }
}
