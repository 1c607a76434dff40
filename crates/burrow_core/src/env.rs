//! The database environment.

use crate::config::{DatabaseConfig, EnvConfig};
use crate::db::{Database, DatabaseInner};
use crate::error::{DbError, DbResult};
use crate::journal::Journal;
use crate::page::{Changeset, PageManager};
use crate::txn::{Txn, TxnManager};
use crate::types::Lsn;
use burrow_storage::Backend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared state of all databases: flags, the LSN counter, the page manager,
/// the transaction manager, the journal and the change-set.
pub struct Environment {
    config: EnvConfig,
    lsn: AtomicU64,
    pages: Arc<PageManager>,
    changeset: Mutex<Changeset>,
    journal: Option<Journal>,
    txn_manager: TxnManager,
    databases: Mutex<HashMap<u16, Arc<DatabaseInner>>>,
}

impl Environment {
    /// Creates an environment without a journal.
    pub fn new(config: EnvConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Creates an environment whose journal writes through `backend`.
    ///
    /// The journal is only written when both recovery and transactions are
    /// enabled.
    pub fn with_journal(config: EnvConfig, backend: Box<dyn Backend>) -> Arc<Self> {
        let journal = Journal::new(backend, config.sync_journal);
        Self::build(config, Some(journal))
    }

    fn build(config: EnvConfig, journal: Option<Journal>) -> Arc<Self> {
        debug!(
            transactions = config.enable_transactions,
            recovery = config.enable_recovery,
            "environment opened"
        );
        Arc::new(Self {
            config,
            lsn: AtomicU64::new(1),
            pages: Arc::new(PageManager::new()),
            changeset: Mutex::new(Changeset::default()),
            journal,
            txn_manager: TxnManager::new(),
            databases: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a database. Fails when `config.name` is already taken.
    pub fn create_database(self: &Arc<Self>, config: DatabaseConfig) -> DbResult<Database> {
        let mut databases = self.databases.lock();
        if databases.contains_key(&config.name) {
            return Err(DbError::invalid_parameter(format!(
                "database {} already exists",
                config.name
            )));
        }
        let inner = DatabaseInner::create(Arc::clone(self), config)?;
        databases.insert(inner.name(), Arc::clone(&inner));
        drop(databases);
        Ok(Database::from_inner(inner))
    }

    /// Opens an existing database, re-initialising its record-number counter
    /// from the largest stored key.
    pub fn open_database(self: &Arc<Self>, name: u16) -> DbResult<Database> {
        let inner = self
            .databases
            .lock()
            .get(&name)
            .cloned()
            .ok_or_else(|| DbError::invalid_parameter(format!("database {name} does not exist")))?;
        inner.reopen()?;
        Ok(Database::from_inner(inner))
    }

    /// Begins an explicit transaction.
    pub fn txn_begin(&self) -> DbResult<Txn> {
        if !self.config.enable_transactions {
            return Err(DbError::invalid_parameter(
                "transactions are disabled in this environment",
            ));
        }
        Ok(self.txn_manager.begin(false))
    }

    pub(crate) fn txn_begin_temporary(&self) -> Txn {
        self.txn_manager.begin(true)
    }

    /// Commits `txn` and flushes every transaction whose turn has come.
    pub fn txn_commit(&self, txn: Txn) -> DbResult<()> {
        self.txn_manager.commit(txn.id())?;
        self.flush_committed_txns()
    }

    /// Aborts `txn`, dropping its operations from the overlay.
    pub fn txn_abort(&self, txn: Txn) -> DbResult<()> {
        let ops = self.txn_manager.abort(txn.id())?;
        for op in ops {
            let db = self.databases.lock().get(&op.db).cloned();
            if let Some(db) = db {
                db.discard_aborted_op(&op.key, op.lsn);
            }
        }
        self.txn_manager.forget(txn.id());
        Ok(())
    }

    /// Drains committed transactions, oldest first, into their B-trees.
    ///
    /// Stops at the first still-active transaction so flush order never
    /// crosses a live one.
    pub fn flush_committed_txns(&self) -> DbResult<()> {
        while let Some((id, ops)) = self.txn_manager.take_flushable() {
            for op in ops {
                let db = self.databases.lock().get(&op.db).cloned();
                if let Some(db) = db {
                    db.flush_txn_operation(&op)?;
                }
            }
            debug!(txn = %id, "transaction flushed");
        }
        Ok(())
    }

    /// Read access to the journal, when one is configured.
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    pub(crate) fn journal_for_write(&self) -> Option<&Journal> {
        if self.config.enable_recovery && self.config.enable_transactions {
            self.journal.as_ref()
        } else {
            None
        }
    }

    pub(crate) fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub(crate) fn pages(&self) -> &Arc<PageManager> {
        &self.pages
    }

    pub(crate) fn txn_manager(&self) -> &TxnManager {
        &self.txn_manager
    }

    pub(crate) fn next_lsn(&self) -> Lsn {
        Lsn::new(self.lsn.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn changeset_clear(&self) {
        self.changeset.lock().clear();
    }

    pub(crate) fn changeset_mark(&self, addr: crate::types::PageAddr) {
        self.changeset.lock().mark(addr);
    }

    /// Flushes the change-set with a fresh LSN (recovery-only mode).
    pub(crate) fn changeset_flush(&self) {
        let lsn = self.next_lsn();
        self.changeset.lock().flush(lsn);
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("transactions", &self.config.enable_transactions)
            .field("recovery", &self.config.enable_recovery)
            .field("databases", &self.databases.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsn_counter_is_monotonic() {
        let env = Environment::new(EnvConfig::default());
        let a = env.next_lsn();
        let b = env.next_lsn();
        assert!(a < b);
    }

    #[test]
    fn txn_begin_requires_transactions() {
        let env = Environment::new(EnvConfig::default().enable_transactions(false));
        assert!(env.txn_begin().is_err());
    }

    #[test]
    fn duplicate_database_name_rejected() {
        let env = Environment::new(EnvConfig::default());
        env.create_database(DatabaseConfig::new(1)).unwrap();
        assert!(env.create_database(DatabaseConfig::new(1)).is_err());
    }

    #[test]
    fn open_unknown_database_fails() {
        let env = Environment::new(EnvConfig::default());
        assert!(env.open_database(9).is_err());
    }
}
