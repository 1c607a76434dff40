//! File-backed backend.

use crate::backend::Backend;
use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A backend over a single append-only file.
///
/// The file length is cached so `len` does not hit the filesystem; the cache
/// is only ever updated by this handle, which matches the single-writer
/// contract of [`Backend`].
#[derive(Debug)]
pub struct FileBackend {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens (or creates) the file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }

    /// Opens the file at `path`, creating parent directories first.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }
}

impl Backend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| StorageError::out_of_bounds(offset, len as u64, self.size))?;
        if end > self.size {
            return Err(StorageError::out_of_bounds(offset, len as u64, self.size));
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::out_of_bounds(new_size, 0, self.size));
        }
        self.file.set_len(new_size)?;
        self.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        let mut backend = FileBackend::open(&path).unwrap();

        assert_eq!(backend.append(b"first").unwrap(), 0);
        assert_eq!(backend.append(b"second").unwrap(), 5);
        assert_eq!(backend.read_at(5, 6).unwrap(), b"second");
    }

    #[test]
    fn size_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"0123456789").unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.len().unwrap(), 10);
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"abcdef").unwrap();
        backend.truncate(3).unwrap();
        assert_eq!(backend.len().unwrap(), 3);
        assert_eq!(backend.read_at(0, 3).unwrap(), b"abc");
    }

    #[test]
    fn create_dirs_builds_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/log");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.len().unwrap(), 0);
    }
}
