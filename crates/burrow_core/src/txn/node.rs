//! Per-key operation lists.

use crate::txn::operation::TxnOperation;
use crate::types::Lsn;

/// The chronological operation list of one key.
///
/// Operations are stored oldest to newest; LSNs strictly increase along the
/// list. A node stays alive as long as it has operations or a cursor still
/// references its key.
#[derive(Debug)]
pub(crate) struct TxnNode {
    key: Vec<u8>,
    ops: Vec<TxnOperation>,
}

impl TxnNode {
    pub(crate) fn new(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            ops: Vec::new(),
        }
    }

    pub(crate) fn key(&self) -> &[u8] {
        &self.key
    }

    /// Appends `op`; its LSN must exceed every existing one.
    pub(crate) fn append(&mut self, op: TxnOperation) {
        debug_assert!(self.ops.last().map_or(true, |last| last.lsn < op.lsn));
        self.ops.push(op);
    }

    /// Operations newest to oldest, the conflict-walk order.
    pub(crate) fn ops_newest_first(&self) -> impl Iterator<Item = &TxnOperation> {
        self.ops.iter().rev()
    }

    /// Operations oldest to newest, the duplicate-cache build order.
    pub(crate) fn ops_oldest_first(&self) -> impl Iterator<Item = &TxnOperation> {
        self.ops.iter()
    }

    pub(crate) fn op_by_lsn(&self, lsn: Lsn) -> Option<&TxnOperation> {
        self.ops.iter().find(|op| op.lsn == lsn)
    }

    pub(crate) fn op_by_lsn_mut(&mut self, lsn: Lsn) -> Option<&mut TxnOperation> {
        self.ops.iter_mut().find(|op| op.lsn == lsn)
    }

    /// Removes the op with `lsn`; returns whether it was present.
    pub(crate) fn remove_op(&mut self, lsn: Lsn) -> bool {
        let before = self.ops.len();
        self.ops.retain(|op| op.lsn != lsn);
        self.ops.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::operation::OpKind;
    use crate::types::{InsertFlags, TxnId};

    fn op(lsn: u64) -> TxnOperation {
        TxnOperation::new(
            TxnId::new(1),
            OpKind::Insert,
            InsertFlags::new(),
            Lsn::new(lsn),
        )
    }

    #[test]
    fn append_keeps_lsn_order() {
        let mut node = TxnNode::new(b"k");
        node.append(op(1));
        node.append(op(2));
        node.append(op(5));

        let lsns: Vec<u64> = node.ops_newest_first().map(|o| o.lsn.as_u64()).collect();
        assert_eq!(lsns, vec![5, 2, 1]);
    }

    #[test]
    fn remove_by_lsn() {
        let mut node = TxnNode::new(b"k");
        node.append(op(1));
        node.append(op(2));

        assert!(node.remove_op(Lsn::new(1)));
        assert!(!node.remove_op(Lsn::new(1)));
        assert!(!node.is_empty());
        assert!(node.remove_op(Lsn::new(2)));
        assert!(node.is_empty());
    }

    #[test]
    fn lookup_by_lsn() {
        let mut node = TxnNode::new(b"k");
        node.append(op(3));
        assert!(node.op_by_lsn(Lsn::new(3)).is_some());
        assert!(node.op_by_lsn(Lsn::new(4)).is_none());
    }
}
