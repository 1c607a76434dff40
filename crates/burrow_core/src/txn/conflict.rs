//! Conflict resolution for overlay mutations.
//!
//! Both checks walk a key's operation list in reverse chronological order:
//! aborted transactions are skipped, flushed and nop operations are skipped,
//! a committed (or own) operation decides the outcome, and an operation of a
//! third still-active transaction is a write-write conflict. Only when the
//! overlay has no opinion is the B-tree consulted.

use crate::btree::BtreeIndex;
use crate::error::{DbError, DbResult};
use crate::txn::node::TxnNode;
use crate::txn::operation::OpKind;
use crate::txn::{TxnManager, TxnState};
use crate::types::{InsertFlags, TxnId};

/// Decides whether `txn` may insert into the key owned by `node`.
pub(crate) fn check_insert_conflicts(
    txn_manager: &TxnManager,
    btree: &BtreeIndex,
    node: &TxnNode,
    txn: TxnId,
    flags: InsertFlags,
    is_record_number: bool,
) -> DbResult<()> {
    for op in node.ops_newest_first() {
        let state = txn_manager.state_of(op.txn);
        if state == TxnState::Aborted {
            continue;
        }
        if state == TxnState::Committed || op.txn == txn {
            if op.flushed || op.kind == OpKind::Nop {
                continue;
            }
            match op.kind {
                // the key was erased, the insert is free
                OpKind::Erase => return Ok(()),
                OpKind::Insert | OpKind::InsertOverwrite | OpKind::InsertDuplicate => {
                    return if flags.overwrite || flags.duplicate {
                        Ok(())
                    } else {
                        Err(DbError::DuplicateKey)
                    };
                }
                OpKind::Nop => unreachable!("nop handled above"),
            }
        }
        // a third, still-active transaction owns the newest visible op
        return Err(DbError::TxnConflict);
    }

    // The overlay has no opinion. Everything flushed behaves like a plain
    // B-tree lookup, which can be skipped when duplicates cannot matter.
    if flags.overwrite || flags.duplicate || is_record_number {
        return Ok(());
    }
    if btree.contains(node.key()) {
        Err(DbError::DuplicateKey)
    } else {
        Ok(())
    }
}

/// Decides whether `txn` may erase the key owned by `node`.
pub(crate) fn check_erase_conflicts(
    txn_manager: &TxnManager,
    btree: &BtreeIndex,
    node: &TxnNode,
    txn: TxnId,
) -> DbResult<()> {
    for op in node.ops_newest_first() {
        let state = txn_manager.state_of(op.txn);
        if state == TxnState::Aborted {
            continue;
        }
        if state == TxnState::Committed || op.txn == txn {
            if op.flushed || op.kind == OpKind::Nop {
                continue;
            }
            match op.kind {
                // erased already, there is nothing left to erase
                OpKind::Erase => return Err(DbError::KeyNotFound),
                OpKind::Insert | OpKind::InsertOverwrite | OpKind::InsertDuplicate => {
                    return Ok(());
                }
                OpKind::Nop => unreachable!("nop handled above"),
            }
        }
        return Err(DbError::TxnConflict);
    }

    if btree.contains(node.key()) {
        Ok(())
    } else {
        Err(DbError::KeyNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::BtreeIndex;
    use crate::page::PageManager;
    use crate::txn::operation::TxnOperation;
    use crate::types::{KeyType, Lsn};
    use std::sync::Arc;

    fn btree() -> BtreeIndex {
        BtreeIndex::new(
            Arc::new(PageManager::new()),
            1,
            KeyType::Binary,
            64,
            false,
        )
    }

    fn node_with(ops: Vec<TxnOperation>) -> TxnNode {
        let mut node = TxnNode::new(b"k");
        for op in ops {
            node.append(op);
        }
        node
    }

    fn op(txn: u64, kind: OpKind, lsn: u64) -> TxnOperation {
        TxnOperation::new(TxnId::new(txn), kind, InsertFlags::new(), Lsn::new(lsn))
    }

    #[test]
    fn own_erase_frees_insert() {
        let tm = TxnManager::new();
        let txn = tm.begin(false);
        let node = node_with(vec![op(txn.id().as_u64(), OpKind::Erase, 1)]);

        let result = check_insert_conflicts(
            &tm,
            &btree(),
            &node,
            txn.id(),
            InsertFlags::new(),
            false,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn own_insert_rejects_plain_insert() {
        let tm = TxnManager::new();
        let txn = tm.begin(false);
        let node = node_with(vec![op(txn.id().as_u64(), OpKind::Insert, 1)]);

        let result = check_insert_conflicts(
            &tm,
            &btree(),
            &node,
            txn.id(),
            InsertFlags::new(),
            false,
        );
        assert!(matches!(result, Err(DbError::DuplicateKey)));

        let result = check_insert_conflicts(
            &tm,
            &btree(),
            &node,
            txn.id(),
            InsertFlags::new().overwrite(),
            false,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_active_op_conflicts() {
        let tm = TxnManager::new();
        let other = tm.begin(false);
        let me = tm.begin(false);
        let node = node_with(vec![op(other.id().as_u64(), OpKind::Insert, 1)]);

        let insert = check_insert_conflicts(
            &tm,
            &btree(),
            &node,
            me.id(),
            InsertFlags::new(),
            false,
        );
        assert!(matches!(insert, Err(DbError::TxnConflict)));

        let erase = check_erase_conflicts(&tm, &btree(), &node, me.id());
        assert!(matches!(erase, Err(DbError::TxnConflict)));
    }

    #[test]
    fn aborted_ops_are_skipped() {
        let tm = TxnManager::new();
        let dead = tm.begin(false);
        let me = tm.begin(false);
        tm.abort(dead.id()).unwrap();
        let node = node_with(vec![op(dead.id().as_u64(), OpKind::Insert, 1)]);

        // the aborted insert is invisible; the empty btree decides
        let result = check_insert_conflicts(
            &tm,
            &btree(),
            &node,
            me.id(),
            InsertFlags::new(),
            false,
        );
        assert!(result.is_ok());

        let erase = check_erase_conflicts(&tm, &btree(), &node, me.id());
        assert!(matches!(erase, Err(DbError::KeyNotFound)));
    }

    #[test]
    fn committed_erase_fails_erase() {
        let tm = TxnManager::new();
        let committed = tm.begin(false);
        let me = tm.begin(false);
        let node = node_with(vec![op(committed.id().as_u64(), OpKind::Erase, 1)]);
        tm.commit(committed.id()).unwrap();

        let result = check_erase_conflicts(&tm, &btree(), &node, me.id());
        assert!(matches!(result, Err(DbError::KeyNotFound)));
    }

    #[test]
    fn flushed_ops_fall_through_to_btree() {
        let tm = TxnManager::new();
        let committed = tm.begin(false);
        let me = tm.begin(false);
        let mut flushed_op = op(committed.id().as_u64(), OpKind::Insert, 1);
        flushed_op.flushed = true;
        let node = node_with(vec![flushed_op]);
        tm.commit(committed.id()).unwrap();

        let mut tree = btree();
        tree.insert(b"k", b"v", InsertFlags::new(), 0).unwrap();

        let result = check_insert_conflicts(
            &tm,
            &tree,
            &node,
            me.id(),
            InsertFlags::new(),
            false,
        );
        assert!(matches!(result, Err(DbError::DuplicateKey)));
    }

    #[test]
    fn record_number_skips_btree_lookup() {
        let tm = TxnManager::new();
        let me = tm.begin(false);
        let node = node_with(vec![]);

        let mut tree = btree();
        tree.insert(b"k", b"v", InsertFlags::new(), 0).unwrap();

        // duplicates are impossible in a record-number database
        let result = check_insert_conflicts(&tm, &tree, &node, me.id(), InsertFlags::new(), true);
        assert!(result.is_ok());
    }
}
