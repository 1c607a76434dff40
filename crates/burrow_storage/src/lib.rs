//! # Burrow Storage
//!
//! Append-only byte stores used by the Burrow database journal.
//!
//! Backends are opaque: they read, append, sync and truncate raw bytes and
//! never interpret journal records or page images. Format knowledge lives
//! entirely in `burrow_core`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::Backend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
