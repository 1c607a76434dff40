//! Backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// Backends make no assumptions about content. The journal layered on top
/// owns the record format; a backend only guarantees:
///
/// - `append` returns the offset the data was written at,
/// - `read_at` returns exactly the bytes previously appended there,
/// - after `sync` returns, appended data survives process termination,
/// - `truncate` discards everything at and after the given offset.
///
/// Backends must be `Send + Sync`; the caller serialises writers.
pub trait Backend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::OutOfBounds`] when the range extends
    /// past the current size, or with an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes (the next append offset).
    fn len(&self) -> StorageResult<u64>;

    /// Returns `true` when the store holds no bytes.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Forces appended data (and metadata) to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::OutOfBounds`] when `new_size`
    /// exceeds the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
