//! # Burrow Core
//!
//! The transactional key-value core of Burrow: a durable ordered B-tree
//! index reconciled with an in-memory transaction overlay.
//!
//! Every read, insert, erase, scan and cursor move produces a result
//! consistent with both stores. The overlay buffers uncommitted and
//! recently-committed mutations as per-key chronological operation lists;
//! committed operations are later flushed into the B-tree. The core detects
//! write-write conflicts between concurrent transactions, supports duplicate
//! keys, approximate (nearest-neighbour) lookups, auto-incrementing
//! record-number keys, and keeps every open cursor consistent across every
//! mutation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod btree;
mod config;
mod cursor;
mod db;
mod env;
mod error;
mod journal;
mod page;
mod record;
mod txn;
mod types;

pub use btree::BtreeStats;
pub use config::{DatabaseConfig, EnvConfig};
pub use cursor::Cursor;
pub use db::{Database, Parameter, ParameterName, ScanVisitor};
pub use env::Environment;
pub use error::{DbError, DbResult};
pub use journal::{Journal, JournalEntry};
pub use record::{Key, Record};
pub use txn::{Txn, TxnState};
pub use types::{
    DupePosition, FindFlags, InsertFlags, KeyType, Lsn, MoveDirection, MoveFlags, PageAddr,
    TxnId, KEY_SIZE_UNLIMITED, RECORD_SIZE_UNLIMITED,
};
