//! Transactions and the transaction manager.

pub(crate) mod conflict;
pub(crate) mod index;
pub(crate) mod node;
pub(crate) mod operation;

use crate::error::{DbError, DbResult};
use crate::types::{Lsn, TxnId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Operations may still be appended.
    Active,
    /// Committed; its operations await (or are being) flushed.
    Committed,
    /// Aborted; walkers skip its operations.
    Aborted,
}

/// Handle to a transaction.
///
/// Obtained from [`crate::Environment::txn_begin`]; committed or aborted by
/// value through the environment, which prevents use after finish.
#[derive(Debug)]
pub struct Txn {
    id: TxnId,
    temporary: bool,
}

impl Txn {
    pub(crate) fn new(id: TxnId, temporary: bool) -> Self {
        Self { id, temporary }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns `true` for implicit temporaries begun by the core itself.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

/// An overlay operation queued for flushing into the B-tree.
#[derive(Debug, Clone)]
pub(crate) struct FlushOp {
    pub db: u16,
    pub key: Vec<u8>,
    pub lsn: Lsn,
}

#[derive(Debug)]
struct TxnRecord {
    id: TxnId,
    state: TxnState,
    ops: Vec<FlushOp>,
}

/// Issues transaction ids and tracks transaction lifecycles.
///
/// The table is ordered by begin time; committed transactions are drained
/// oldest-first, stopping at the first still-active one, so that flush order
/// never reorders across a live transaction.
pub(crate) struct TxnManager {
    next_id: AtomicU64,
    table: Mutex<VecDeque<TxnRecord>>,
}

impl TxnManager {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn begin(&self, temporary: bool) -> Txn {
        let id = TxnId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.table.lock().push_back(TxnRecord {
            id,
            state: TxnState::Active,
            ops: Vec::new(),
        });
        trace!(%id, temporary, "transaction begun");
        Txn::new(id, temporary)
    }

    /// Looks up a transaction's state. A transaction no longer in the table
    /// has been flushed (or fully cleaned up after abort) and reads as
    /// committed.
    pub(crate) fn state_of(&self, id: TxnId) -> TxnState {
        self.table
            .lock()
            .iter()
            .find(|rec| rec.id == id)
            .map_or(TxnState::Committed, |rec| rec.state)
    }

    pub(crate) fn is_active(&self, id: TxnId) -> bool {
        self.state_of(id) == TxnState::Active
    }

    /// Queues an overlay operation for the eventual flush of `id`.
    pub(crate) fn record_op(&self, id: TxnId, op: FlushOp) -> DbResult<()> {
        let mut table = self.table.lock();
        let rec = table
            .iter_mut()
            .find(|rec| rec.id == id)
            .filter(|rec| rec.state == TxnState::Active)
            .ok_or_else(|| DbError::invalid_parameter("transaction is not active"))?;
        rec.ops.push(op);
        Ok(())
    }

    /// Marks `id` committed.
    pub(crate) fn commit(&self, id: TxnId) -> DbResult<()> {
        let mut table = self.table.lock();
        let rec = table
            .iter_mut()
            .find(|rec| rec.id == id)
            .filter(|rec| rec.state == TxnState::Active)
            .ok_or_else(|| DbError::invalid_parameter("transaction is not active"))?;
        rec.state = TxnState::Committed;
        trace!(%id, ops = rec.ops.len(), "transaction committed");
        Ok(())
    }

    /// Marks `id` aborted and hands back its queued operations so the caller
    /// can drop them from the overlay. The record stays in the table (so
    /// walkers observe the aborted state) until [`Self::forget`].
    pub(crate) fn abort(&self, id: TxnId) -> DbResult<Vec<FlushOp>> {
        let mut table = self.table.lock();
        let rec = table
            .iter_mut()
            .find(|rec| rec.id == id)
            .filter(|rec| rec.state == TxnState::Active)
            .ok_or_else(|| DbError::invalid_parameter("transaction is not active"))?;
        rec.state = TxnState::Aborted;
        trace!(%id, ops = rec.ops.len(), "transaction aborted");
        Ok(std::mem::take(&mut rec.ops))
    }

    /// Drops the table entry of a finished transaction.
    pub(crate) fn forget(&self, id: TxnId) {
        self.table.lock().retain(|rec| rec.id != id);
    }

    /// Pops the oldest transaction when it is committed.
    ///
    /// Returns `None` when the table is empty or the oldest transaction is
    /// still active. The caller flushes the returned operations without any
    /// table lock held.
    pub(crate) fn take_flushable(&self) -> Option<(TxnId, Vec<FlushOp>)> {
        let mut table = self.table.lock();
        loop {
            match table.front().map(|rec| rec.state) {
                Some(TxnState::Committed) => {
                    let rec = table.pop_front().expect("front exists");
                    return Some((rec.id, rec.ops));
                }
                // an aborted front has been cleaned up already
                Some(TxnState::Aborted) => {
                    table.pop_front();
                }
                Some(TxnState::Active) | None => return None,
            }
        }
    }

}

impl std::fmt::Debug for TxnManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnManager")
            .field("pending", &self.table.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_issues_increasing_ids() {
        let tm = TxnManager::new();
        let a = tm.begin(false);
        let b = tm.begin(false);
        assert!(a.id() < b.id());
        assert!(tm.is_active(a.id()));
    }

    #[test]
    fn commit_changes_state() {
        let tm = TxnManager::new();
        let txn = tm.begin(false);
        tm.commit(txn.id()).unwrap();
        assert_eq!(tm.state_of(txn.id()), TxnState::Committed);
        assert!(tm.commit(txn.id()).is_err());
    }

    #[test]
    fn abort_returns_ops() {
        let tm = TxnManager::new();
        let txn = tm.begin(false);
        tm.record_op(
            txn.id(),
            FlushOp {
                db: 1,
                key: b"k".to_vec(),
                lsn: Lsn::new(1),
            },
        )
        .unwrap();

        let ops = tm.abort(txn.id()).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(tm.state_of(txn.id()), TxnState::Aborted);

        tm.forget(txn.id());
        // forgotten transactions read as committed (they no longer matter)
        assert_eq!(tm.state_of(txn.id()), TxnState::Committed);
    }

    #[test]
    fn flush_order_stops_at_active() {
        let tm = TxnManager::new();
        let a = tm.begin(false);
        let b = tm.begin(false);

        // b commits first, but a is older and still active
        tm.commit(b.id()).unwrap();
        assert!(tm.take_flushable().is_none());

        tm.commit(a.id()).unwrap();
        let (first, _) = tm.take_flushable().unwrap();
        assert_eq!(first, a.id());
        let (second, _) = tm.take_flushable().unwrap();
        assert_eq!(second, b.id());
        assert!(tm.take_flushable().is_none());
    }

    #[test]
    fn record_op_requires_active() {
        let tm = TxnManager::new();
        let txn = tm.begin(false);
        tm.commit(txn.id()).unwrap();
        let result = tm.record_op(
            txn.id(),
            FlushOp {
                db: 1,
                key: b"k".to_vec(),
                lsn: Lsn::new(1),
            },
        );
        assert!(result.is_err());
    }
}
