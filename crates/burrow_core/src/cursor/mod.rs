//! Cursors.
//!
//! A cursor's position is expressed on one of two sides: a B-tree slot or an
//! overlay operation. Both side handles may exist at once, but exactly one
//! coupling is authoritative (or none, when the cursor is nil). The
//! duplicate cache materialises the current key's duplicates across both
//! stores; the 1-based duplicate index points into it.

pub(crate) mod dupecache;

use crate::db::DatabaseInner;
use crate::error::DbResult;
use crate::record::{Key, Record};
use crate::txn::operation::OpRef;
use crate::types::{FindFlags, InsertFlags, MoveFlags, TxnId};
use dupecache::DupeCache;
use std::sync::Arc;

/// Which position a cursor treats as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Coupling {
    /// Not positioned.
    #[default]
    Nil,
    /// Positioned on a B-tree slot.
    Btree,
    /// Positioned on an overlay operation.
    TxnOp,
}

/// Which side(s) of a cursor to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Btree,
    Txn,
    Both,
}

/// The last operation a cursor completed, steering the next move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum LastOp {
    #[default]
    None,
    Next,
    Previous,
    /// A find, insert or erase positioned (or nil'd) the cursor.
    LookupOrInsert,
}

/// Registry state of one cursor.
#[derive(Debug, Default)]
pub(crate) struct CursorState {
    /// Transaction the cursor was created in, if any.
    pub txn: Option<TxnId>,
    /// Authoritative coupling.
    pub coupling: Coupling,
    /// B-tree side position.
    pub btree: crate::btree::cursor::BtreeCursor,
    /// Overlay side position.
    pub txn_op: Option<OpRef>,
    /// Materialised duplicates of the current key.
    pub dupecache: DupeCache,
    /// 1-based index into the duplicate cache, 0 = not on a duplicate.
    pub dupe_index: u32,
    /// What the cursor last did.
    pub last_op: LastOp,
    /// Whether the cursor has never been moved or positioned.
    pub first_use: bool,
}

impl CursorState {
    pub(crate) fn new(txn: Option<TxnId>) -> Self {
        Self {
            txn,
            first_use: true,
            ..Self::default()
        }
    }

    /// A cursor is nil when it has no authoritative position. A coupled
    /// side whose handle was cleared counts as nil too.
    pub(crate) fn is_nil(&self) -> bool {
        self.current_key().is_none()
    }

    pub(crate) fn is_coupled_to_btree(&self) -> bool {
        self.coupling == Coupling::Btree
    }

    pub(crate) fn is_coupled_to_txnop(&self) -> bool {
        self.coupling == Coupling::TxnOp
    }

    /// Makes the B-tree side authoritative.
    pub(crate) fn couple_to_btree(&mut self) {
        self.coupling = Coupling::Btree;
        self.first_use = false;
    }

    /// Couples the overlay side to `op` and makes it authoritative.
    pub(crate) fn couple_to_txnop(&mut self, op: OpRef) {
        self.txn_op = Some(op);
        self.coupling = Coupling::TxnOp;
        self.first_use = false;
    }

    /// Clears one or both sides; the coupling follows the cleared side.
    pub(crate) fn set_to_nil(&mut self, side: Side) {
        match side {
            Side::Btree => {
                self.btree.set_nil();
                if self.coupling == Coupling::Btree {
                    self.coupling = Coupling::Nil;
                }
            }
            Side::Txn => {
                self.txn_op = None;
                if self.coupling == Coupling::TxnOp {
                    self.coupling = Coupling::Nil;
                }
            }
            Side::Both => {
                self.btree.set_nil();
                self.txn_op = None;
                self.coupling = Coupling::Nil;
                self.dupe_index = 0;
            }
        }
    }

    /// Invalidates the duplicate cache without changing the coupling.
    pub(crate) fn clear_dupecache(&mut self) {
        self.dupecache.clear();
    }

    /// The key of the authoritative position.
    pub(crate) fn current_key(&self) -> Option<&[u8]> {
        match self.coupling {
            Coupling::Nil => None,
            Coupling::Btree => self.btree.current_key(),
            Coupling::TxnOp => self.txn_op.as_ref().map(|op| op.key.as_slice()),
        }
    }

    /// Snapshot for cloning; the clone starts with the same position.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            txn: self.txn,
            coupling: self.coupling,
            btree: self.btree.clone(),
            txn_op: self.txn_op.clone(),
            dupecache: self.dupecache.clone(),
            dupe_index: self.dupe_index,
            last_op: self.last_op,
            first_use: self.first_use,
        }
    }
}

/// A database cursor.
///
/// Created through [`crate::Database::cursor_create`]. Mutating operations on
/// the database keep every open cursor consistent: inserting a duplicate
/// shifts peer duplicate indexes, erasing a key nils cursors positioned on
/// it. The cursor deregisters itself when dropped.
pub struct Cursor {
    pub(crate) db: Arc<DatabaseInner>,
    pub(crate) id: u64,
}

impl Cursor {
    /// Inserts a key/record pair through this cursor and positions it on the
    /// new entry.
    pub fn insert(&mut self, key: &mut Key, record: &Record, flags: InsertFlags) -> DbResult<()> {
        self.db.cursor_insert(self.id, key, record, flags)
    }

    /// Finds `key` and positions the cursor on it.
    pub fn find(
        &mut self,
        key: &mut Key,
        record: Option<&mut Record>,
        flags: FindFlags,
    ) -> DbResult<()> {
        self.db.cursor_find(self.id, key, record, flags)
    }

    /// Erases the key (or duplicate) the cursor is positioned on.
    ///
    /// On success the cursor becomes nil.
    pub fn erase(&mut self) -> DbResult<()> {
        self.db.cursor_erase(self.id)
    }

    /// Moves the cursor and reads the landed position.
    pub fn move_to(
        &mut self,
        key: Option<&mut Key>,
        record: Option<&mut Record>,
        flags: MoveFlags,
    ) -> DbResult<()> {
        self.db.cursor_move(self.id, key, record, flags)
    }

    /// Reads the record under the current position without moving.
    pub fn record(&self, record: &mut Record) -> DbResult<()> {
        self.db.cursor_record(self.id, record)
    }

    /// Replaces the record under the current position.
    pub fn overwrite(&mut self, record: &Record) -> DbResult<()> {
        self.db.cursor_overwrite(self.id, record)
    }

    /// Number of duplicates of the current key.
    pub fn record_count(&self) -> DbResult<u32> {
        self.db.cursor_record_count(self.id)
    }

    /// 1-based duplicate index of the current position, 0 when the key has
    /// no duplicates.
    pub fn duplicate_position(&self) -> DbResult<u32> {
        self.db.cursor_duplicate_position(self.id)
    }

    /// Size of the record under the current position.
    pub fn record_size(&self) -> DbResult<u64> {
        self.db.cursor_record_size(self.id)
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.db.cursor_close(self.id);
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lsn;

    #[test]
    fn coupling_transitions() {
        let mut state = CursorState::new(None);
        assert!(state.is_nil());
        assert!(state.first_use);

        state.btree.couple_to(b"k", 0);
        state.couple_to_btree();
        assert!(state.is_coupled_to_btree());
        assert!(!state.first_use);
        assert_eq!(state.current_key(), Some(b"k".as_slice()));

        state.couple_to_txnop(OpRef::new(b"k", Lsn::new(3)));
        assert!(state.is_coupled_to_txnop());
        // the btree side still exists, it is just not authoritative
        assert!(state.btree.points_to(b"k"));
    }

    #[test]
    fn set_to_nil_sides() {
        let mut state = CursorState::new(None);
        state.btree.couple_to(b"k", 0);
        state.couple_to_btree();
        state.txn_op = Some(OpRef::new(b"k", Lsn::new(1)));

        state.set_to_nil(Side::Txn);
        assert!(state.is_coupled_to_btree());
        assert!(state.txn_op.is_none());

        state.set_to_nil(Side::Btree);
        assert!(state.is_nil());
    }

    #[test]
    fn nil_both_resets_dupe_index() {
        let mut state = CursorState::new(None);
        state.dupe_index = 4;
        state.set_to_nil(Side::Both);
        assert_eq!(state.dupe_index, 0);
    }
}
