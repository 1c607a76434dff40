//! Page manager and change-set accounting.
//!
//! Raw page I/O is outside the core; the page manager here issues leaf
//! addresses for the B-tree, tracks which pages sit in the cache, and owns
//! the change-set of pages dirtied by the current non-transactional
//! mutation. The journal-backed replay of a flushed change-set is recovery
//! territory and not implemented.

use crate::error::{DbError, DbResult};
use crate::types::{Lsn, PageAddr};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Issues page addresses and tracks cache residency per database.
pub(crate) struct PageManager {
    next_addr: AtomicU64,
    /// Pages owned by each database.
    owned: Mutex<HashMap<u16, HashSet<PageAddr>>>,
    /// Pages currently held in the cache.
    cached: Mutex<HashSet<PageAddr>>,
}

impl PageManager {
    pub(crate) fn new() -> Self {
        Self {
            next_addr: AtomicU64::new(1),
            owned: Mutex::new(HashMap::new()),
            cached: Mutex::new(HashSet::new()),
        }
    }

    /// Allocates a fresh page address for database `db`.
    pub(crate) fn allocate(&self, db: u16) -> PageAddr {
        let addr = PageAddr(self.next_addr.fetch_add(1, Ordering::SeqCst));
        self.owned.lock().entry(db).or_default().insert(addr);
        addr
    }

    /// Releases one page of database `db`.
    pub(crate) fn free(&self, db: u16, addr: PageAddr) {
        if let Some(pages) = self.owned.lock().get_mut(&db) {
            pages.remove(&addr);
        }
        self.cached.lock().remove(&addr);
    }

    /// Fetches a page of database `db`, marking it cache-resident.
    pub(crate) fn fetch(&self, db: u16, addr: PageAddr) -> DbResult<PageAddr> {
        let owned = self.owned.lock();
        let valid = owned.get(&db).is_some_and(|pages| pages.contains(&addr));
        if !valid {
            return Err(DbError::corruption(format!(
                "page {addr} is not owned by database {db}"
            )));
        }
        self.cached.lock().insert(addr);
        Ok(addr)
    }

    /// Evicts all cached pages.
    pub(crate) fn purge_cache(&self) {
        let mut cached = self.cached.lock();
        if !cached.is_empty() {
            trace!(pages = cached.len(), "purging page cache");
            cached.clear();
        }
    }

    /// Evicts every cached page of database `db`.
    ///
    /// Ownership is untouched: the pages themselves outlive the close and
    /// are fetched again when the database is reopened.
    pub(crate) fn close_database(&self, db: u16) {
        let owned = self.owned.lock();
        if let Some(pages) = owned.get(&db) {
            let mut cached = self.cached.lock();
            let before = cached.len();
            for addr in pages {
                cached.remove(addr);
            }
            debug!(db, evicted = before - cached.len(), "database pages evicted");
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_count(&self) -> usize {
        self.cached.lock().len()
    }
}

/// Pages dirtied by the current mutation.
///
/// Cleared when an implicit transaction finalizes; flushed with the next LSN
/// in recovery-only mode. The two finishes are mutually exclusive.
#[derive(Default)]
pub(crate) struct Changeset {
    dirty: HashSet<PageAddr>,
}

impl Changeset {
    pub(crate) fn mark(&mut self, addr: PageAddr) {
        self.dirty.insert(addr);
    }

    pub(crate) fn clear(&mut self) {
        self.dirty.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Flushes the dirty set atomically under `lsn` and clears it.
    pub(crate) fn flush(&mut self, lsn: Lsn) {
        if !self.is_empty() {
            trace!(%lsn, pages = self.dirty.len(), "flushing change-set");
            self.dirty.clear();
        }
    }
}
