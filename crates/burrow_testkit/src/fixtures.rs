//! Environment and database fixtures.

use burrow_core::{
    Database, DatabaseConfig, EnvConfig, Environment, InsertFlags, Key, KeyType, Record,
};
use burrow_storage::MemoryBackend;
use std::sync::Arc;

/// An environment with transactions enabled (the default configuration).
#[must_use]
pub fn txn_env() -> Arc<Environment> {
    Environment::new(EnvConfig::default())
}

/// An environment with transactions disabled: every mutation goes straight
/// to the B-tree.
#[must_use]
pub fn plain_env() -> Arc<Environment> {
    Environment::new(EnvConfig::default().enable_transactions(false))
}

/// An environment with recovery enabled and an in-memory journal.
#[must_use]
pub fn recovery_env() -> Arc<Environment> {
    Environment::with_journal(
        EnvConfig::default().enable_recovery(true),
        Box::new(MemoryBackend::new()),
    )
}

/// A fresh binary-key database named 1.
#[must_use]
pub fn fresh_db(env: &Arc<Environment>) -> Database {
    env.create_database(DatabaseConfig::new(1)).unwrap()
}

/// A fresh database with duplicate keys enabled.
#[must_use]
pub fn dupes_db(env: &Arc<Environment>) -> Database {
    env.create_database(DatabaseConfig::new(1).enable_duplicates(true))
        .unwrap()
}

/// A fresh 64-bit record-number database.
#[must_use]
pub fn recno_db(env: &Arc<Environment>) -> Database {
    env.create_database(DatabaseConfig::new(1).key_type(KeyType::RecordNumber64))
        .unwrap()
}

/// Inserts `pairs` outside any transaction, so they end up flushed into the
/// B-tree.
pub fn seed(db: &Database, pairs: &[(&[u8], &[u8])]) {
    for (key, record) in pairs {
        db.insert(
            None,
            &mut Key::from_slice(key),
            &Record::from_slice(record),
            InsertFlags::new(),
        )
        .unwrap();
    }
}

/// Reads `key` and returns its record, or `None` when it does not exist.
#[must_use]
pub fn get(db: &Database, key: &[u8]) -> Option<Vec<u8>> {
    let mut record = Record::new();
    match db.find(
        None,
        &mut Key::from_slice(key),
        Some(&mut record),
        burrow_core::FindFlags::exact(),
    ) {
        Ok(()) => Some(record.as_slice().to_vec()),
        Err(_) => None,
    }
}
