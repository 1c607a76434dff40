//! Proptest generators and deterministic data builders.

use proptest::collection::vec;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A short binary key: non-empty, small enough to keep shrink output
/// readable.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 1..16)
}

/// A record payload, possibly empty.
pub fn record_strategy() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..32)
}

/// A set of distinct key/record pairs.
pub fn pairs_strategy(max: usize) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    proptest::collection::btree_map(key_strategy(), record_strategy(), 1..max)
        .prop_map(|map| map.into_iter().collect())
}

/// One step of a random single-transaction workload.
#[derive(Debug, Clone)]
pub enum WorkloadOp {
    /// Insert (with overwrite, so the step always succeeds).
    Insert(Vec<u8>, Vec<u8>),
    /// Erase; may fail with key-not-found, which callers treat as a no-op.
    Erase(Vec<u8>),
}

/// `count` distinct keys in a deterministically shuffled insertion order.
///
/// Useful for asserting that scan and cursor order do not depend on the
/// order keys were inserted in.
#[must_use]
pub fn shuffled_keys(count: u32, seed: u64) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = (0..count).map(|i| i.to_be_bytes().to_vec()).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(seed));
    keys
}

/// A random workload over a small key universe, so steps frequently collide
/// on the same keys.
pub fn workload_strategy(len: usize) -> impl Strategy<Value = Vec<WorkloadOp>> {
    let small_key = (0u8..8).prop_map(|b| vec![b]);
    let op = prop_oneof![
        (small_key.clone(), record_strategy()).prop_map(|(k, r)| WorkloadOp::Insert(k, r)),
        small_key.prop_map(WorkloadOp::Erase),
    ];
    vec(op, 1..len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn keys_are_non_empty(key in key_strategy()) {
            prop_assert!(!key.is_empty());
            prop_assert!(key.len() < 16);
        }

        #[test]
        fn pairs_have_distinct_keys(pairs in pairs_strategy(16)) {
            let mut keys: Vec<_> = pairs.iter().map(|(k, _)| k.clone()).collect();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), pairs.len());
        }
    }
}
