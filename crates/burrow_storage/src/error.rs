//! Storage error types.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A read or truncate referenced bytes beyond the end of the store.
    #[error("out of bounds: offset {offset} + {len} exceeds size {size}")]
    OutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Current store size.
        size: u64,
    },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Creates an out-of-bounds error.
    pub fn out_of_bounds(offset: u64, len: u64, size: u64) -> Self {
        Self::OutOfBounds { offset, len, size }
    }
}
