//! The ordered overlay index.

use crate::txn::node::TxnNode;
use crate::types::FindFlags;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered map of key to [`TxnNode`].
///
/// Sibling order is the map's key order; range scans and approximate matches
/// walk it interleaved with the B-tree.
#[derive(Debug, Default)]
pub(crate) struct TxnIndex {
    nodes: BTreeMap<Vec<u8>, TxnNode>,
}

impl TxnIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&TxnNode> {
        self.nodes.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &[u8]) -> Option<&mut TxnNode> {
        self.nodes.get_mut(key)
    }

    /// Returns the node for `key`, creating it when absent. The second value
    /// reports whether the node was created by this call.
    pub(crate) fn get_or_create(&mut self, key: &[u8]) -> (&mut TxnNode, bool) {
        let created = !self.nodes.contains_key(key);
        let node = self
            .nodes
            .entry(key.to_vec())
            .or_insert_with(|| TxnNode::new(key));
        (node, created)
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<TxnNode> {
        self.nodes.remove(key)
    }

    /// Nearest-match lookup: the exact node, or per `flags` the closest
    /// smaller/greater sibling. Returns the resolved node key.
    pub(crate) fn get_approx(&self, key: &[u8], flags: FindFlags) -> Option<&[u8]> {
        if self.nodes.contains_key(key) {
            return Some(self.nodes.get_key_value(key).expect("just checked").0);
        }
        if flags.gt {
            return self.next_key(key);
        }
        if flags.lt {
            return self.prev_key(key);
        }
        None
    }

    /// First key in sibling order.
    pub(crate) fn first_key(&self) -> Option<&[u8]> {
        self.nodes.keys().next().map(Vec::as_slice)
    }

    /// Last key in sibling order.
    pub(crate) fn last_key(&self) -> Option<&[u8]> {
        self.nodes.keys().next_back().map(Vec::as_slice)
    }

    /// Closest key strictly greater than `key`.
    pub(crate) fn next_key(&self, key: &[u8]) -> Option<&[u8]> {
        self.nodes
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.as_slice())
    }

    /// Closest key strictly less than `key`.
    pub(crate) fn prev_key(&self, key: &[u8]) -> Option<&[u8]> {
        self.nodes
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(k, _)| k.as_slice())
    }

    /// All node keys in sibling order.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.nodes.keys().map(Vec::as_slice)
    }

    /// All nodes in sibling order.
    pub(crate) fn nodes(&self) -> impl Iterator<Item = &TxnNode> {
        self.nodes.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}
