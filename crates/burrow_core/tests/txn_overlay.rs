//! Transaction overlay behavior: shadowing, isolation, conflicts, close.

use burrow_core::{DbError, FindFlags, InsertFlags, JournalEntry, Key, Record};
use burrow_testkit::{fresh_db, get, recovery_env, seed, txn_env};

#[test]
fn overlay_shadows_committed_state() {
    let env = txn_env();
    let db = fresh_db(&env);

    // T1 writes and commits; the pair ends up in the btree
    let t1 = env.txn_begin().unwrap();
    db.insert(
        Some(&t1),
        &mut Key::from_slice(b"a"),
        &Record::from_slice(b"1"),
        InsertFlags::new(),
    )
    .unwrap();
    env.txn_commit(t1).unwrap();

    // T2 overwrites but does not commit
    let t2 = env.txn_begin().unwrap();
    db.insert(
        Some(&t2),
        &mut Key::from_slice(b"a"),
        &Record::from_slice(b"2"),
        InsertFlags::new().overwrite(),
    )
    .unwrap();

    // T3 sees a conflict while T2 is alive
    let t3 = env.txn_begin().unwrap();
    let result = db.find(Some(&t3), &mut Key::from_slice(b"a"), None, FindFlags::exact());
    assert!(matches!(result, Err(DbError::TxnConflict)));

    // after the abort T3 reads the committed value
    env.txn_abort(t2).unwrap();
    let mut record = Record::new();
    db.find(
        Some(&t3),
        &mut Key::from_slice(b"a"),
        Some(&mut record),
        FindFlags::exact(),
    )
    .unwrap();
    assert_eq!(record.as_slice(), b"1");
    env.txn_abort(t3).unwrap();
}

#[test]
fn own_writes_are_visible_before_commit() {
    let env = txn_env();
    let db = fresh_db(&env);

    let txn = env.txn_begin().unwrap();
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"k"),
        &Record::from_slice(b"v"),
        InsertFlags::new(),
    )
    .unwrap();

    let mut record = Record::new();
    db.find(
        Some(&txn),
        &mut Key::from_slice(b"k"),
        Some(&mut record),
        FindFlags::exact(),
    )
    .unwrap();
    assert_eq!(record.as_slice(), b"v");

    db.erase(Some(&txn), &Key::from_slice(b"k")).unwrap();
    let result = db.find(Some(&txn), &mut Key::from_slice(b"k"), None, FindFlags::exact());
    assert!(matches!(result, Err(DbError::KeyNotFound)));

    env.txn_abort(txn).unwrap();
}

#[test]
fn uncommitted_insert_is_invisible_and_conflicts() {
    let env = txn_env();
    let db = fresh_db(&env);

    let a = env.txn_begin().unwrap();
    db.insert(
        Some(&a),
        &mut Key::from_slice(b"k"),
        &Record::from_slice(b"v"),
        InsertFlags::new(),
    )
    .unwrap();

    let b = env.txn_begin().unwrap();
    let result = db.find(Some(&b), &mut Key::from_slice(b"k"), None, FindFlags::exact());
    assert!(matches!(result, Err(DbError::TxnConflict)));

    env.txn_abort(a).unwrap();
    env.txn_abort(b).unwrap();
}

#[test]
fn conflict_detection_is_symmetric() {
    let env = txn_env();
    let db = fresh_db(&env);
    seed(&db, &[(b"k", b"v")]);

    let a = env.txn_begin().unwrap();
    db.erase(Some(&a), &Key::from_slice(b"k")).unwrap();

    let b = env.txn_begin().unwrap();
    let insert = db.insert(
        Some(&b),
        &mut Key::from_slice(b"k"),
        &Record::from_slice(b"w"),
        InsertFlags::new(),
    );
    assert!(matches!(insert, Err(DbError::TxnConflict)));
    let erase = db.erase(Some(&b), &Key::from_slice(b"k"));
    assert!(matches!(erase, Err(DbError::TxnConflict)));

    env.txn_abort(a).unwrap();
    env.txn_abort(b).unwrap();
}

#[test]
fn erase_then_insert_in_one_transaction() {
    let env = txn_env();
    let db = fresh_db(&env);
    seed(&db, &[(b"x", b"10")]);

    let txn = env.txn_begin().unwrap();
    db.erase(Some(&txn), &Key::from_slice(b"x")).unwrap();
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"x"),
        &Record::from_slice(b"20"),
        InsertFlags::new(),
    )
    .unwrap();

    let mut record = Record::new();
    db.find(
        Some(&txn),
        &mut Key::from_slice(b"x"),
        Some(&mut record),
        FindFlags::exact(),
    )
    .unwrap();
    assert_eq!(record.as_slice(), b"20");

    env.txn_commit(txn).unwrap();

    // after the flush the btree holds (x, 20) and nothing else
    assert_eq!(get(&db, b"x"), Some(b"20".to_vec()));
    assert_eq!(db.count(None, false).unwrap(), 1);
    let stats = db.btree_stats();
    assert_eq!(stats.keys, 1);
    assert_eq!(stats.records, 1);
}

#[test]
fn erase_of_uncommitted_insert_frees_the_key() {
    let env = txn_env();
    let db = fresh_db(&env);

    let txn = env.txn_begin().unwrap();
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"k"),
        &Record::from_slice(b"v"),
        InsertFlags::new(),
    )
    .unwrap();
    db.erase(Some(&txn), &Key::from_slice(b"k")).unwrap();

    // erased in the same transaction: a plain insert is free again
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"k"),
        &Record::from_slice(b"w"),
        InsertFlags::new(),
    )
    .unwrap();
    env.txn_commit(txn).unwrap();
    assert_eq!(get(&db, b"k"), Some(b"w".to_vec()));
}

#[test]
fn aborted_transaction_leaves_no_trace() {
    let env = txn_env();
    let db = fresh_db(&env);
    seed(&db, &[(b"keep", b"1")]);

    let txn = env.txn_begin().unwrap();
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"drop"),
        &Record::from_slice(b"2"),
        InsertFlags::new(),
    )
    .unwrap();
    db.erase(Some(&txn), &Key::from_slice(b"keep")).unwrap();
    env.txn_abort(txn).unwrap();

    assert_eq!(get(&db, b"keep"), Some(b"1".to_vec()));
    assert_eq!(get(&db, b"drop"), None);
    assert_eq!(db.count(None, true).unwrap(), 1);
}

#[test]
fn close_fails_while_transaction_is_open() {
    let env = txn_env();
    let db = fresh_db(&env);

    let txn = env.txn_begin().unwrap();
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"k"),
        &Record::from_slice(b"v"),
        InsertFlags::new(),
    )
    .unwrap();

    assert!(matches!(db.close(), Err(DbError::TxnStillOpen)));

    env.txn_abort(txn).unwrap();
    db.close().unwrap();
}

#[test]
fn flush_stops_at_older_active_transaction() {
    let env = txn_env();
    let db = fresh_db(&env);

    let older = env.txn_begin().unwrap();
    db.insert(
        Some(&older),
        &mut Key::from_slice(b"a"),
        &Record::from_slice(b"1"),
        InsertFlags::new(),
    )
    .unwrap();

    // the younger transaction commits first; its ops must wait in the
    // overlay until the older one finishes
    let younger = env.txn_begin().unwrap();
    db.insert(
        Some(&younger),
        &mut Key::from_slice(b"b"),
        &Record::from_slice(b"2"),
        InsertFlags::new(),
    )
    .unwrap();
    env.txn_commit(younger).unwrap();
    assert_eq!(db.btree_stats().keys, 0);

    env.txn_commit(older).unwrap();
    assert_eq!(db.btree_stats().keys, 2);
    assert_eq!(get(&db, b"a"), Some(b"1".to_vec()));
    assert_eq!(get(&db, b"b"), Some(b"2".to_vec()));
}

#[test]
fn journal_records_transactional_mutations() {
    let env = recovery_env();
    let db = fresh_db(&env);

    let txn = env.txn_begin().unwrap();
    db.insert(
        Some(&txn),
        &mut Key::from_slice(b"j"),
        &Record::from_slice(b"1"),
        InsertFlags::new(),
    )
    .unwrap();
    db.erase(Some(&txn), &Key::from_slice(b"j")).unwrap();
    env.txn_commit(txn).unwrap();

    let entries = env.journal().unwrap().entries().unwrap();
    assert_eq!(entries.len(), 2);
    match &entries[0] {
        JournalEntry::Insert { key, record, flags, .. } => {
            assert_eq!(key, b"j");
            assert_eq!(record, b"1");
            // plain inserts are journalled with overwrite, so a replay is
            // idempotent
            assert!(flags.overwrite);
        }
        other => panic!("expected an insert entry, got {other:?}"),
    }
    match &entries[1] {
        JournalEntry::Erase { key, dupe, .. } => {
            assert_eq!(key, b"j");
            assert_eq!(*dupe, 0);
        }
        other => panic!("expected an erase entry, got {other:?}"),
    }
    assert!(entries[0].lsn() < entries[1].lsn());
}

#[test]
fn journal_survives_in_a_file() {
    use burrow_core::{EnvConfig, Environment, Journal};
    use burrow_storage::FileBackend;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal");

    {
        let backend = FileBackend::open(&path).unwrap();
        let env = Environment::with_journal(
            EnvConfig::default().enable_recovery(true).sync_journal(true),
            Box::new(backend),
        );
        let db = fresh_db(&env);
        let txn = env.txn_begin().unwrap();
        db.insert(
            Some(&txn),
            &mut Key::from_slice(b"durable"),
            &Record::from_slice(b"yes"),
            InsertFlags::new(),
        )
        .unwrap();
        env.txn_commit(txn).unwrap();
    }

    let journal = Journal::new(Box::new(FileBackend::open(&path).unwrap()), false);
    let entries = journal.entries().unwrap();
    assert_eq!(entries.len(), 1);
    match &entries[0] {
        JournalEntry::Insert { key, .. } => assert_eq!(key, b"durable"),
        other => panic!("expected an insert entry, got {other:?}"),
    }
}
