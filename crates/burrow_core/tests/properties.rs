//! Property tests for the §-invariants that must hold for any workload.

use burrow_core::{DbError, FindFlags, InsertFlags, Key, Record, ScanVisitor};
use burrow_testkit::{
    fresh_db, get, pairs_strategy, txn_env, workload_strategy, WorkloadOp,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::BTreeMap;

struct KeyCollector(Vec<Vec<u8>>);

impl ScanVisitor for KeyCollector {
    fn visit(&mut self, key: &[u8], _count: u64) {
        self.0.push(key.to_vec());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// insert(k, v) followed by a committed find(k) returns v byte-exact.
    #[test]
    fn round_trip(pairs in pairs_strategy(24)) {
        let env = txn_env();
        let db = fresh_db(&env);
        for (key, record) in &pairs {
            db.insert(None, &mut Key::from_slice(key), &Record::from_slice(record), InsertFlags::new())
                .unwrap();
        }
        for (key, record) in &pairs {
            prop_assert_eq!(get(&db, key), Some(record.clone()));
        }
    }

    /// A transaction's own writes shadow both the B-tree and earlier
    /// overlay state.
    #[test]
    fn overlay_precedence(pairs in pairs_strategy(16)) {
        let env = txn_env();
        let db = fresh_db(&env);
        for (key, record) in &pairs {
            db.insert(None, &mut Key::from_slice(key), &Record::from_slice(record), InsertFlags::new())
                .unwrap();
        }

        let txn = env.txn_begin().unwrap();
        for (key, _) in &pairs {
            db.insert(
                Some(&txn),
                &mut Key::from_slice(key),
                &Record::from_slice(b"shadow"),
                InsertFlags::new().overwrite(),
            )
            .unwrap();

            let mut record = Record::new();
            db.find(Some(&txn), &mut Key::from_slice(key), Some(&mut record), FindFlags::exact())
                .unwrap();
            prop_assert_eq!(record.as_slice(), b"shadow");

            db.erase(Some(&txn), &Key::from_slice(key)).unwrap();
            let result = db.find(Some(&txn), &mut Key::from_slice(key), None, FindFlags::exact());
            prop_assert!(matches!(result, Err(DbError::KeyNotFound)));
        }
        env.txn_abort(txn).unwrap();

        // the abort leaves the committed state untouched
        for (key, record) in &pairs {
            prop_assert_eq!(get(&db, key), Some(record.clone()));
        }
    }

    /// A single-transaction workload ends up equal to a model map, both
    /// before and after the commit flush.
    #[test]
    fn workload_matches_model(ops in workload_strategy(48)) {
        let env = txn_env();
        let db = fresh_db(&env);
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        let txn = env.txn_begin().unwrap();
        for op in &ops {
            match op {
                WorkloadOp::Insert(key, record) => {
                    db.insert(
                        Some(&txn),
                        &mut Key::from_slice(key),
                        &Record::from_slice(record),
                        InsertFlags::new().overwrite(),
                    )
                    .unwrap();
                    model.insert(key.clone(), record.clone());
                }
                WorkloadOp::Erase(key) => {
                    match db.erase(Some(&txn), &Key::from_slice(key)) {
                        Ok(()) => {
                            prop_assert!(model.remove(key).is_some());
                        }
                        Err(DbError::KeyNotFound) => {
                            prop_assert!(!model.contains_key(key));
                        }
                        Err(err) => return Err(TestCaseError::fail(err.to_string())),
                    }
                }
            }
        }

        // uncommitted view
        for byte in 0u8..8 {
            let key = vec![byte];
            let mut record = Record::new();
            let found = db.find(Some(&txn), &mut Key::from_slice(&key), Some(&mut record), FindFlags::exact());
            match model.get(&key) {
                Some(expected) => {
                    prop_assert!(found.is_ok());
                    prop_assert_eq!(record.as_slice(), expected.as_slice());
                }
                None => prop_assert!(matches!(found, Err(DbError::KeyNotFound))),
            }
        }
        prop_assert_eq!(db.count(Some(&txn), true).unwrap(), model.len() as u64);
        db.check_integrity().unwrap();

        // committed-and-flushed view
        env.txn_commit(txn).unwrap();
        for byte in 0u8..8 {
            let key = vec![byte];
            prop_assert_eq!(get(&db, &key), model.get(&key).cloned());
        }
        let stats = db.btree_stats();
        prop_assert_eq!(stats.keys, model.len() as u64);
        db.check_integrity().unwrap();
    }

    /// scan visits every live key exactly once in ascending order, and the
    /// distinct count agrees with it.
    #[test]
    fn scan_is_complete_and_ordered(
        committed in pairs_strategy(16),
        pending in pairs_strategy(8),
    ) {
        let env = txn_env();
        let db = fresh_db(&env);
        for (key, record) in &committed {
            db.insert(None, &mut Key::from_slice(key), &Record::from_slice(record), InsertFlags::new())
                .unwrap();
        }

        let txn = env.txn_begin().unwrap();
        for (key, record) in &pending {
            db.insert(
                Some(&txn),
                &mut Key::from_slice(key),
                &Record::from_slice(record),
                InsertFlags::new().overwrite(),
            )
            .unwrap();
        }

        let mut expected: Vec<Vec<u8>> = committed
            .iter()
            .chain(pending.iter())
            .map(|(key, _)| key.clone())
            .collect();
        expected.sort();
        expected.dedup();

        let mut collector = KeyCollector(Vec::new());
        db.scan(Some(&txn), &mut collector, true).unwrap();
        prop_assert_eq!(&collector.0, &expected);
        prop_assert_eq!(db.count(Some(&txn), true).unwrap(), expected.len() as u64);

        env.txn_abort(txn).unwrap();
    }

    /// For find(k, LtMatch) the result r satisfies r < k with no live key
    /// between r and k; GtMatch is symmetric.
    #[test]
    fn approximate_match_is_the_nearest_neighbour(
        pairs in pairs_strategy(16),
        probe in burrow_testkit::key_strategy(),
    ) {
        let env = txn_env();
        let db = fresh_db(&env);
        let model: BTreeMap<Vec<u8>, Vec<u8>> = pairs.iter().cloned().collect();
        for (key, record) in &pairs {
            db.insert(None, &mut Key::from_slice(key), &Record::from_slice(record), InsertFlags::new())
                .unwrap();
        }

        let expected_lt = model.range(..probe.clone()).next_back().map(|(k, _)| k.clone());
        let mut key = Key::from_slice(&probe);
        match db.find(None, &mut key, None, FindFlags::lt()) {
            Ok(()) => {
                prop_assert_eq!(Some(key.as_slice().to_vec()), expected_lt);
                prop_assert!(key.is_approximate());
            }
            Err(DbError::KeyNotFound) => prop_assert!(expected_lt.is_none()),
            Err(err) => return Err(TestCaseError::fail(err.to_string())),
        }

        let mut upper = probe.clone();
        upper.push(0);
        let expected_gt = model.range(upper..).next().map(|(k, _)| k.clone());
        let mut key = Key::from_slice(&probe);
        match db.find(None, &mut key, None, FindFlags::gt()) {
            Ok(()) => {
                prop_assert_eq!(Some(key.as_slice().to_vec()), expected_gt);
                prop_assert!(key.is_approximate());
            }
            Err(DbError::KeyNotFound) => prop_assert!(expected_gt.is_none()),
            Err(err) => return Err(TestCaseError::fail(err.to_string())),
        }
    }
}
