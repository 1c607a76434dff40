//! In-memory backend.

use crate::backend::Backend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A backend that keeps all bytes in memory.
///
/// Used by tests and by environments opened without a journal path. Data is
/// lost when the backend is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-filled with `bytes`.
    ///
    /// Useful when a test wants to start from a captured journal image.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Returns a copy of the full contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl Backend for MemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| StorageError::out_of_bounds(offset, len as u64, bytes.len() as u64))?;
        if end > bytes.len() as u64 {
            return Err(StorageError::out_of_bounds(
                offset,
                len as u64,
                bytes.len() as u64,
            ));
        }
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        if new_size > bytes.len() as u64 {
            return Err(StorageError::out_of_bounds(
                new_size,
                0,
                bytes.len() as u64,
            ));
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}
