//! The database core.
//!
//! A database mediates two indexes over one key space: the durable B-tree
//! and the in-memory transaction overlay. Reads walk the overlay newest to
//! oldest before consulting the B-tree; writes append overlay operations and
//! are flushed into the B-tree after commit; every mutation walks the cursor
//! registry so open cursors stay consistent.

use crate::btree::cursor::BtreeCursor;
use crate::btree::{BtreeIndex, BtreeStats};
use crate::config::DatabaseConfig;
use crate::cursor::dupecache::{DupeCache, DupeCacheLine};
use crate::cursor::{Cursor, CursorState, LastOp, Side};
use crate::env::Environment;
use crate::error::{DbError, DbResult};
use crate::page::PageManager;
use crate::record::{Key, Record};
use crate::txn::conflict::{check_erase_conflicts, check_insert_conflicts};
use crate::txn::index::TxnIndex;
use crate::txn::operation::{OpKind, OpRef, TxnOperation};
use crate::txn::{FlushOp, Txn, TxnManager, TxnState};
use crate::types::{
    DupePosition, FindFlags, InsertFlags, KeyType, Lsn, MoveDirection, MoveFlags, TxnId,
    KEY_SIZE_UNLIMITED, RECORD_SIZE_UNLIMITED,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Records below this size are always stored inline in the leaf; larger
/// fixed-size records stay inline only while enough pairs fit in a page.
const INLINE_RECORD_THRESHOLD: usize = 32;

/// Visitor invoked by [`Database::scan`] for every live key in ascending
/// order.
pub trait ScanVisitor {
    /// Called once per key. `record_count` is 1 for a distinct scan and the
    /// key's duplicate count otherwise.
    fn visit(&mut self, key: &[u8], record_count: u64);
}

/// Recognised database parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterName {
    /// Configured key size.
    KeySize,
    /// Configured key type tag.
    KeyType,
    /// Configured record size.
    RecordSize,
    /// Database flag bits.
    Flags,
    /// Numeric database name.
    DatabaseName,
    /// Estimated key capacity of one B-tree page.
    MaxKeysPerPage,
    /// Record compression (always 0, compression is not supported).
    RecordCompression,
    /// Key compression (always 0, compression is not supported).
    KeyCompression,
}

/// One slot of a [`Database::get_parameters`] request.
#[derive(Debug, Clone, Copy)]
pub struct Parameter {
    /// Which parameter to fill.
    pub name: ParameterName,
    /// Filled with the parameter's value.
    pub value: u64,
}

impl Parameter {
    /// Creates an unfilled parameter slot.
    #[must_use]
    pub fn new(name: ParameterName) -> Self {
        Self { name, value: 0 }
    }
}

/// How a walker classifies one overlay operation.
enum OpView {
    /// Aborted, flushed or nop: invisible.
    Skip,
    /// Committed, or owned by the asking transaction.
    Visible,
    /// Owned by a third, still-active transaction.
    Conflict,
}

fn op_view(tm: &TxnManager, op: &TxnOperation, txn: TxnId) -> OpView {
    match tm.state_of(op.txn) {
        TxnState::Aborted => OpView::Skip,
        TxnState::Committed => {
            if op.flushed || op.kind == OpKind::Nop {
                OpView::Skip
            } else {
                OpView::Visible
            }
        }
        TxnState::Active => {
            if op.txn == txn {
                if op.flushed || op.kind == OpKind::Nop {
                    OpView::Skip
                } else {
                    OpView::Visible
                }
            } else {
                OpView::Conflict
            }
        }
    }
}

/// Outcome of the overlay walk in `find_txn`.
enum WalkOutcome {
    /// A third active transaction owns the newest visible operation.
    Conflict,
    /// Exact-match insert hit.
    ExactInsert { opref: OpRef, record: Vec<u8> },
    /// Approximate candidate; the B-tree may hold a better match.
    ApproxInsert { opref: OpRef, record: Vec<u8> },
    /// The exact key was erased.
    ExactErased { opref: OpRef, referenced_dupe: u32 },
    /// The overlay has no opinion.
    NoCandidate,
}

/// Mutable state of one database, guarded by a single coarse lock.
pub(crate) struct DbState {
    pub(crate) btree: BtreeIndex,
    pub(crate) txn_index: TxnIndex,
    pub(crate) cursors: HashMap<u64, CursorState>,
    next_cursor: u64,
    recno: u64,
    open: bool,
}

/// Shared core of a database handle.
pub(crate) struct DatabaseInner {
    env: Arc<Environment>,
    config: DatabaseConfig,
    state: Mutex<DbState>,
}

/// A database within an environment.
///
/// Handles are cheap to clone; all of them refer to the same underlying
/// database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Self {
        Self { inner }
    }

    /// Returns the numeric database name.
    #[must_use]
    pub fn name(&self) -> u16 {
        self.inner.name()
    }

    /// Inserts a key/record pair.
    ///
    /// The key is mutable because record-number databases assign it: an empty
    /// key receives the next record number, big-endian encoded.
    pub fn insert(
        &self,
        txn: Option<&Txn>,
        key: &mut Key,
        record: &Record,
        flags: InsertFlags,
    ) -> DbResult<()> {
        self.inner
            .insert_front(None, txn.map(Txn::id), key, record, flags)
    }

    /// Looks up `key`, writing the record into `record` when supplied.
    ///
    /// Approximate-match flags rewrite the key with the matched key and set
    /// its approximate tag.
    pub fn find(
        &self,
        txn: Option<&Txn>,
        key: &mut Key,
        record: Option<&mut Record>,
        flags: FindFlags,
    ) -> DbResult<()> {
        self.inner.find_front(txn, key, record, flags)
    }

    /// Erases `key` and all of its duplicates.
    pub fn erase(&self, txn: Option<&Txn>, key: &Key) -> DbResult<()> {
        self.inner
            .erase_front(None, txn.map(Txn::id), Some(key.as_slice()))
    }

    /// Creates a cursor, optionally bound to `txn`.
    pub fn cursor_create(&self, txn: Option<&Txn>) -> DbResult<Cursor> {
        let id = self.inner.register_cursor(txn.map(Txn::id))?;
        Ok(Cursor {
            db: Arc::clone(&self.inner),
            id,
        })
    }

    /// Clones a cursor, position included.
    pub fn cursor_clone(&self, cursor: &Cursor) -> DbResult<Cursor> {
        let id = self.inner.clone_cursor(cursor.id)?;
        Ok(Cursor {
            db: Arc::clone(&self.inner),
            id,
        })
    }

    /// Number of keys, or of records (duplicates included) when `distinct`
    /// is false.
    pub fn count(&self, txn: Option<&Txn>, distinct: bool) -> DbResult<u64> {
        self.inner.count(txn.map(Txn::id), distinct)
    }

    /// Visits every live key in ascending order.
    pub fn scan(
        &self,
        txn: Option<&Txn>,
        visitor: &mut dyn ScanVisitor,
        distinct: bool,
    ) -> DbResult<()> {
        self.inner.scan(txn.map(Txn::id), visitor, distinct)
    }

    /// Verifies B-tree and overlay index invariants.
    pub fn check_integrity(&self) -> DbResult<()> {
        self.inner.check_integrity()
    }

    /// Fills each recognised parameter slot.
    pub fn get_parameters(&self, params: &mut [Parameter]) -> DbResult<()> {
        self.inner.get_parameters(params)
    }

    /// Closes the database.
    ///
    /// Fails with [`DbError::TxnStillOpen`] while a live transaction has
    /// operations on this database.
    pub fn close(&self) -> DbResult<()> {
        self.inner.close()
    }

    /// Size statistics of the underlying B-tree.
    pub fn btree_stats(&self) -> BtreeStats {
        self.inner.state.lock().btree.stats()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name())
            .finish_non_exhaustive()
    }
}

impl DatabaseInner {
    pub(crate) fn create(
        env: Arc<Environment>,
        mut config: DatabaseConfig,
    ) -> DbResult<Arc<Self>> {
        if let Some(size) = config.key_type.fixed_size() {
            config.key_size = size;
        }

        let page_size = env.config().page_size;
        if config.key_size != KEY_SIZE_UNLIMITED && page_size / (config.key_size + 8) < 10 {
            warn!(
                key_size = config.key_size,
                page_size, "key size too large; increase page size or decrease key size"
            );
            return Err(DbError::invalid_key_size(
                (page_size / 10).saturating_sub(8),
                config.key_size,
            ));
        }

        // small fixed-size records live inline in the leaf
        let est_key = if config.key_size == KEY_SIZE_UNLIMITED {
            32
        } else {
            config.key_size
        };
        if config.record_size != RECORD_SIZE_UNLIMITED
            && (config.record_size <= 8
                || (config.record_size <= INLINE_RECORD_THRESHOLD
                    && page_size / (est_key + config.record_size) > 500))
        {
            config.records_inline = true;
        }

        let est_record = if config.records_inline {
            config.record_size
        } else {
            8
        };
        let leaf_capacity = (page_size / (est_key + est_record + 8)).max(2);

        let btree = BtreeIndex::new(
            Arc::clone(env.pages()),
            config.name,
            config.key_type,
            leaf_capacity,
            config.enable_duplicates,
        );

        debug!(name = config.name, ?config.key_type, leaf_capacity, "database created");

        Ok(Arc::new(Self {
            env,
            config,
            state: Mutex::new(DbState {
                btree,
                txn_index: TxnIndex::new(),
                cursors: HashMap::new(),
                next_cursor: 1,
                recno: 0,
                open: true,
            }),
        }))
    }

    pub(crate) fn name(&self) -> u16 {
        self.config.name
    }

    fn pages(&self) -> &Arc<PageManager> {
        self.env.pages()
    }

    fn recno_width(&self) -> usize {
        match self.config.key_type {
            KeyType::RecordNumber32 => 4,
            _ => 8,
        }
    }

    /// Re-initialises the database on open: the record-number counter is
    /// seeded from the largest live key.
    pub(crate) fn reopen(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        state.open = true;
        if !self.config.key_type.is_record_number() {
            return Ok(());
        }

        let state = &mut *state;
        let last_btree = state.btree.last_key().map(<[u8]>::to_vec);
        let last_txn = state.txn_index.last_key().map(<[u8]>::to_vec);
        let last = match (last_btree, last_txn) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        state.recno = match last {
            None => 0,
            Some(key) => decode_recno(&key, self.recno_width())?,
        };
        debug!(name = self.config.name, recno = state.recno, "record-number counter initialised");
        Ok(())
    }

    fn ensure_open(&self, state: &DbState) -> DbResult<()> {
        if state.open {
            Ok(())
        } else {
            Err(DbError::DatabaseClosed)
        }
    }

    /// Resolves the transaction for an operation, beginning a temporary when
    /// transactions are enabled and the caller supplied none.
    fn resolve_txn(&self, txn: Option<TxnId>) -> DbResult<(Option<TxnId>, Option<Txn>)> {
        if let Some(id) = txn {
            if !self.env.txn_manager().is_active(id) {
                return Err(DbError::invalid_parameter("transaction is not active"));
            }
            return Ok((Some(id), None));
        }
        if self.env.config().enable_transactions {
            let temp = self.env.txn_begin_temporary();
            return Ok((Some(temp.id()), Some(temp)));
        }
        Ok((None, None))
    }

    /// Finishes an operation: a temporary transaction commits on success and
    /// aborts on failure (clearing the change-set either way); in
    /// recovery-only mode the change-set is flushed instead.
    fn finalize<T>(&self, result: DbResult<T>, local_txn: Option<Txn>) -> DbResult<T> {
        match (result, local_txn) {
            (Err(err), Some(temp)) => {
                self.env.changeset_clear();
                let _ = self.env.txn_abort(temp);
                Err(err)
            }
            (Ok(value), Some(temp)) => {
                self.env.changeset_clear();
                self.env.txn_commit(temp)?;
                Ok(value)
            }
            (result, None) => {
                if result.is_ok()
                    && self.env.config().enable_recovery
                    && !self.env.config().enable_transactions
                {
                    self.env.changeset_flush();
                }
                result
            }
        }
    }

    fn validate_key_size(&self, len: usize) -> DbResult<()> {
        if self.config.key_size != KEY_SIZE_UNLIMITED && len != self.config.key_size {
            warn!(
                expected = self.config.key_size,
                actual = len,
                "invalid key size"
            );
            return Err(DbError::invalid_key_size(self.config.key_size, len));
        }
        Ok(())
    }

    fn validate_record_size(&self, len: usize) -> DbResult<()> {
        if self.config.record_size != RECORD_SIZE_UNLIMITED && len != self.config.record_size {
            warn!(
                expected = self.config.record_size,
                actual = len,
                "invalid record size"
            );
            return Err(DbError::invalid_record_size(self.config.record_size, len));
        }
        Ok(())
    }

    // ----- insert ---------------------------------------------------------

    pub(crate) fn insert_front(
        &self,
        cursor: Option<u64>,
        txn: Option<TxnId>,
        key: &mut Key,
        record: &Record,
        mut flags: InsertFlags,
    ) -> DbResult<()> {
        if flags.duplicate && !self.config.enable_duplicates {
            return Err(DbError::invalid_parameter(
                "database was not created with duplicate keys enabled",
            ));
        }

        let recno_db = self.config.key_type.is_record_number();
        if recno_db {
            if !key.is_empty() && key.len() != self.recno_width() {
                return Err(DbError::invalid_key_size(self.recno_width(), key.len()));
            }
            if flags.overwrite && key.is_empty() {
                return Err(DbError::invalid_parameter(
                    "overwriting a record-number key requires the key",
                ));
            }
        } else {
            self.validate_key_size(key.len())?;
        }
        self.validate_record_size(record.len())?;

        self.pages().purge_cache();

        let (txn_id, local_txn) = self.resolve_txn(txn)?;

        let result = (|| {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            self.ensure_open(state)?;

            // record-number keys are assigned from the monotonic counter and
            // always appended at the end
            if recno_db && !flags.overwrite {
                let recno = state.recno + 1;
                state.recno = recno;
                key.assign(&encode_recno(recno, self.recno_width()));
                flags.hint_append = true;
            }

            match txn_id {
                Some(txn) => {
                    self.insert_txn(state, txn, key.as_slice(), record.as_slice(), flags, cursor)?;
                    if let Some(cid) = cursor {
                        self.recouple_cursor_after_insert(state, cid, key.as_slice(), txn)?;
                    }
                }
                None => {
                    let ref_dupe = cursor
                        .and_then(|cid| state.cursors.get(&cid))
                        .map_or(0, |c| c.dupe_index);
                    let (dup, addr) =
                        state
                            .btree
                            .insert(key.as_slice(), record.as_slice(), flags, ref_dupe)?;
                    self.env.changeset_mark(addr);
                    if let Some(cid) = cursor {
                        if let Some(c) = state.cursors.get_mut(&cid) {
                            c.btree.couple_to(key.as_slice(), dup);
                            c.couple_to_btree();
                            c.clear_dupecache();
                            c.last_op = LastOp::LookupOrInsert;
                        }
                    }
                }
            }
            Ok(())
        })();

        self.finalize(result, local_txn)
    }

    /// Inserts into the overlay: resolve or create the key's node, run the
    /// conflict check, append the operation, couple and shift cursors,
    /// journal.
    fn insert_txn(
        &self,
        state: &mut DbState,
        txn: TxnId,
        key: &[u8],
        record: &[u8],
        flags: InsertFlags,
        cursor: Option<u64>,
    ) -> DbResult<()> {
        let tm = self.env.txn_manager();
        let created = state.txn_index.get_or_create(key).1;
        let node = state.txn_index.get(key).expect("node just resolved");

        let check = check_insert_conflicts(
            tm,
            &state.btree,
            node,
            txn,
            flags,
            self.config.key_type.is_record_number(),
        );
        if let Err(err) = check {
            if created {
                state.txn_index.remove(key);
            }
            return Err(err);
        }

        let kind = if flags.duplicate {
            OpKind::InsertDuplicate
        } else if flags.overwrite {
            OpKind::InsertOverwrite
        } else {
            OpKind::Insert
        };
        let lsn = self.env.next_lsn();
        let mut op = TxnOperation::new(txn, kind, flags, lsn).with_record(record.to_vec());

        // a cursor positioned on a duplicate anchors insert-before/-after
        let cursor_dupe = cursor
            .and_then(|cid| state.cursors.get(&cid))
            .map_or(0, |c| c.dupe_index);
        if cursor_dupe > 0 {
            op.referenced_dupe = cursor_dupe;
        }

        trace!(?kind, %lsn, "overlay insert");
        state
            .txn_index
            .get_mut(key)
            .expect("node exists")
            .append(op);
        tm.record_op(
            txn,
            FlushOp {
                db: self.config.name,
                key: key.to_vec(),
                lsn,
            },
        )?;

        if let Some(cid) = cursor {
            if let Some(c) = state.cursors.get_mut(&cid) {
                c.couple_to_txnop(OpRef::new(key, lsn));
            }
            // peers on the same key shift by the landing position of the
            // new duplicate
            if kind == OpKind::InsertDuplicate {
                let new_at = match flags.dup_position {
                    Some(DupePosition::First) => 1,
                    Some(DupePosition::Before) if cursor_dupe >= 1 => cursor_dupe,
                    Some(DupePosition::After) if cursor_dupe >= 1 => cursor_dupe + 1,
                    _ => u32::MAX, // appended last: nothing shifts
                };
                self.increment_dupe_index(state, key, cursor, new_at);
            }
        }
        self.clear_dupecaches_on_key(state, key, cursor);

        if let Some(journal) = self.env.journal_for_write() {
            let effective = if flags.duplicate {
                flags
            } else {
                flags.overwrite()
            };
            journal.append_insert(self.config.name, txn, key, record, effective, lsn)?;
        }
        Ok(())
    }

    /// After an overlay insert through a cursor: the overlay side is
    /// authoritative, the B-tree side is stale, and the duplicate index is
    /// the new op's position in the rebuilt cache.
    fn recouple_cursor_after_insert(
        &self,
        state: &mut DbState,
        cid: u64,
        key: &[u8],
        txn: TxnId,
    ) -> DbResult<()> {
        let Some(op_lsn) = state
            .cursors
            .get(&cid)
            .and_then(|c| c.txn_op.as_ref())
            .map(|r| r.lsn)
        else {
            return Ok(());
        };
        let cache = self.build_dupecache(state, key, txn)?;
        if let Some(c) = state.cursors.get_mut(&cid) {
            c.set_to_nil(Side::Btree);
            c.dupe_index = if cache.len() > 1 {
                cache.position_of_op(op_lsn).unwrap_or(0)
            } else {
                0
            };
            c.dupecache = cache;
            c.last_op = LastOp::LookupOrInsert;
        }
        Ok(())
    }

    // ----- find -----------------------------------------------------------

    pub(crate) fn find_front(
        &self,
        txn: Option<&Txn>,
        key: &mut Key,
        mut record: Option<&mut Record>,
        flags: FindFlags,
    ) -> DbResult<()> {
        // a duplicate-key lookup has to build the duplicate list, which only
        // the cursor path does
        if txn.is_some() && self.config.enable_duplicates {
            let cid = self.register_cursor(txn.map(Txn::id))?;
            let result = self.cursor_find(cid, key, record.as_deref_mut(), flags);
            self.cursor_close(cid);
            self.env.changeset_clear();
            return result;
        }
        self.find_impl(None, txn.map(Txn::id), key, record, flags)
    }

    pub(crate) fn find_impl(
        &self,
        cursor: Option<u64>,
        txn: Option<TxnId>,
        key: &mut Key,
        record: Option<&mut Record>,
        flags: FindFlags,
    ) -> DbResult<()> {
        self.validate_key_size(key.len())?;

        let (txn_id, local_txn) = self.resolve_txn(txn)?;

        let result = (|| {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            self.ensure_open(state)?;
            match txn_id {
                Some(txn) => self.find_txn(state, cursor, txn, key, record, flags),
                None => match cursor {
                    None => state.btree.find(key, record, flags, None),
                    Some(cid) => {
                        let mut side = BtreeCursor::new();
                        let found = state.btree.find(key, record, flags, Some(&mut side));
                        if found.is_ok() {
                            if let Some(c) = state.cursors.get_mut(&cid) {
                                c.btree = side;
                                c.couple_to_btree();
                            }
                        }
                        found
                    }
                },
            }
        })();

        self.finalize(result, local_txn)
    }

    /// The transactional read path: walk the overlay, fall back to or
    /// tiebreak against the B-tree.
    fn find_txn(
        &self,
        state: &mut DbState,
        cursor: Option<u64>,
        txn: TxnId,
        key: &mut Key,
        mut record: Option<&mut Record>,
        flags: FindFlags,
    ) -> DbResult<()> {
        key.set_approximate(false);

        let mut exact_is_erased = false;
        let outcome = self.walk_overlay(state, txn, key, flags, &mut exact_is_erased);

        match outcome {
            WalkOutcome::Conflict => Err(DbError::TxnConflict),
            WalkOutcome::ExactInsert { opref, record: data } => {
                if let Some(cid) = cursor {
                    self.couple_cursor_to_op(state, cid, opref);
                }
                if let Some(out) = record {
                    out.assign(&data);
                }
                Ok(())
            }
            WalkOutcome::ExactErased {
                opref,
                referenced_dupe,
            } => {
                let remaining = match referenced_dupe {
                    0 => false,
                    1 => {
                        // the first duplicate went away; survivors decide
                        if let Some(cid) = cursor {
                            self.cursor_sync_equal(state, cid, &opref.key);
                        }
                        !self.build_dupecache(state, &opref.key, txn)?.is_empty()
                    }
                    _ => true,
                };
                if remaining {
                    if let Some(cid) = cursor {
                        self.couple_cursor_to_op(state, cid, opref);
                    }
                    Ok(())
                } else {
                    Err(DbError::KeyNotFound)
                }
            }
            WalkOutcome::ApproxInsert { opref, record: data } => self.btree_tiebreak(
                state,
                cursor,
                txn,
                key,
                record,
                flags,
                exact_is_erased,
                opref,
                data,
            ),
            WalkOutcome::NoCandidate => {
                // no overlay match at all: the B-tree decides on its own
                let mut bflags = flags;
                if exact_is_erased {
                    bflags.exact = false;
                    if !bflags.is_approximate() {
                        return Err(DbError::KeyNotFound);
                    }
                }
                let mut side = BtreeCursor::new();
                let found = state.btree.find(
                    key,
                    record.as_deref_mut(),
                    bflags,
                    cursor.map(|_| &mut side),
                );
                if found.is_ok() {
                    if let Some(cid) = cursor {
                        if let Some(c) = state.cursors.get_mut(&cid) {
                            c.btree = side;
                            c.set_to_nil(Side::Txn);
                            c.couple_to_btree();
                        }
                    }
                }
                found
            }
        }
    }

    /// Walks the overlay for `key`, stepping to siblings on erased keys when
    /// an approximate match was requested.
    fn walk_overlay(
        &self,
        state: &DbState,
        txn: TxnId,
        key: &mut Key,
        flags: FindFlags,
        exact_is_erased: &mut bool,
    ) -> WalkOutcome {
        let tm = self.env.txn_manager();

        let mut node_key = state
            .txn_index
            .get_approx(key.as_slice(), flags)
            .map(<[u8]>::to_vec);
        if let Some(nk) = &node_key {
            if nk.as_slice() != key.as_slice() {
                key.set_approximate(true);
            }
        }

        let mut first_loop = true;
        'retry: while let Some(nk) = node_key {
            let node = state.txn_index.get(&nk).expect("sibling keys resolve");
            for op in node.ops_newest_first() {
                match op_view(tm, op, txn) {
                    OpView::Skip => continue,
                    OpView::Conflict => return WalkOutcome::Conflict,
                    OpView::Visible => match op.kind {
                        OpKind::Erase => {
                            if first_loop && !key.is_approximate() {
                                *exact_is_erased = true;
                            }
                            first_loop = false;
                            if flags.lt {
                                node_key = state.txn_index.prev_key(&nk).map(<[u8]>::to_vec);
                                if node_key.is_some() {
                                    key.set_approximate(true);
                                }
                                continue 'retry;
                            }
                            if flags.gt {
                                node_key = state.txn_index.next_key(&nk).map(<[u8]>::to_vec);
                                if node_key.is_some() {
                                    key.set_approximate(true);
                                }
                                continue 'retry;
                            }
                            return WalkOutcome::ExactErased {
                                opref: OpRef::new(&nk, op.lsn),
                                referenced_dupe: op.referenced_dupe,
                            };
                        }
                        OpKind::Insert | OpKind::InsertOverwrite | OpKind::InsertDuplicate => {
                            let opref = OpRef::new(&nk, op.lsn);
                            let data = op.record.clone().unwrap_or_default();
                            if key.is_approximate() {
                                return WalkOutcome::ApproxInsert {
                                    opref,
                                    record: data,
                                };
                            }
                            return WalkOutcome::ExactInsert {
                                opref,
                                record: data,
                            };
                        }
                        OpKind::Nop => unreachable!("nop ops are skipped"),
                    },
                }
            }
            break;
        }
        WalkOutcome::NoCandidate
    }

    /// An overlay candidate was approximate: check whether the B-tree holds a
    /// better match, re-verifying a winning B-tree key against the overlay.
    #[allow(clippy::too_many_arguments)]
    fn btree_tiebreak(
        &self,
        state: &mut DbState,
        cursor: Option<u64>,
        txn: TxnId,
        key: &mut Key,
        mut record: Option<&mut Record>,
        flags: FindFlags,
        exact_is_erased: bool,
        opref: OpRef,
        op_record: Vec<u8>,
    ) -> DbResult<()> {
        let txnkey = opref.key.clone();
        key.set_approximate(false);

        // the exact-match key was erased, so don't fetch it again
        let mut bflags = flags;
        if exact_is_erased {
            bflags.exact = false;
        }

        if let Some(cid) = cursor {
            if let Some(c) = state.cursors.get_mut(&cid) {
                c.set_to_nil(Side::Btree);
            }
        }

        let mut side = BtreeCursor::new();
        let found = state
            .btree
            .find(key, record.as_deref_mut(), bflags, Some(&mut side));

        let use_overlay = |this: &Self, state: &mut DbState, key: &mut Key, record: Option<&mut Record>| {
            key.assign(&txnkey);
            key.set_approximate(true);
            if let Some(cid) = cursor {
                this.couple_cursor_to_op(state, cid, opref.clone());
            }
            if let Some(out) = record {
                out.assign(&op_record);
            }
            Ok(())
        };

        match found {
            Err(DbError::KeyNotFound) => use_overlay(self, state, key, record),
            Err(err) => Err(err),
            Ok(()) => {
                if !key.is_approximate() && bflags.exact {
                    // the btree key is a direct match
                    if let Some(cid) = cursor {
                        if let Some(c) = state.cursors.get_mut(&cid) {
                            c.btree = side;
                            c.set_to_nil(Side::Txn);
                            c.couple_to_btree();
                        }
                    }
                    return Ok(());
                }

                let cmp = BtreeIndex::compare_keys(key.as_slice(), &txnkey);
                let use_btree = (flags.gt && cmp.is_lt()) || (flags.lt && cmp.is_gt());
                if use_btree {
                    // the winner may have been erased or overwritten in the
                    // overlay: look it up again, exact
                    let mut vflags = flags;
                    vflags.exact = true;
                    let verified = self.find_txn(state, cursor, txn, key, record, vflags);
                    if verified.is_ok() {
                        key.set_approximate(true);
                    }
                    verified
                } else {
                    use_overlay(self, state, key, record)
                }
            }
        }
    }

    // ----- erase ----------------------------------------------------------

    pub(crate) fn erase_front(
        &self,
        cursor: Option<u64>,
        txn: Option<TxnId>,
        key: Option<&[u8]>,
    ) -> DbResult<()> {
        if let Some(key) = key {
            if self.config.key_type.is_record_number() {
                if key.len() != self.recno_width() {
                    return Err(DbError::invalid_parameter(
                        "record-number keys must be exactly the key width",
                    ));
                }
            } else {
                self.validate_key_size(key.len())?;
            }
        }

        let (txn_id, local_txn) = self.resolve_txn(txn)?;

        let result = (|| {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            self.ensure_open(state)?;

            match txn_id {
                Some(txn) => {
                    let target = match cursor {
                        Some(cid) => {
                            let c = state
                                .cursors
                                .get_mut(&cid)
                                .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;
                            let current = c
                                .current_key()
                                .map(<[u8]>::to_vec)
                                .ok_or(DbError::CursorIsNil)?;
                            if c.is_coupled_to_btree() {
                                c.set_to_nil(Side::Txn);
                            }
                            current
                        }
                        None => key.ok_or(DbError::CursorIsNil)?.to_vec(),
                    };
                    self.erase_txn(state, txn, &target, cursor)?;
                    if let Some(cid) = cursor {
                        if let Some(c) = state.cursors.get_mut(&cid) {
                            c.set_to_nil(Side::Both);
                            c.clear_dupecache();
                            c.last_op = LastOp::LookupOrInsert;
                        }
                    }
                    Ok(())
                }
                None => {
                    let target = match cursor {
                        Some(cid) => {
                            let c = state
                                .cursors
                                .get(&cid)
                                .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;
                            c.current_key()
                                .map(<[u8]>::to_vec)
                                .ok_or(DbError::CursorIsNil)?
                        }
                        None => key.ok_or(DbError::CursorIsNil)?.to_vec(),
                    };
                    let addr = state.btree.erase(&target, 0)?;
                    self.env.changeset_mark(addr);
                    if let Some(cid) = cursor {
                        if let Some(c) = state.cursors.get_mut(&cid) {
                            c.set_to_nil(Side::Both);
                            c.clear_dupecache();
                        }
                    }
                    Ok(())
                }
            }
        })();

        self.finalize(result, local_txn)
    }

    /// Appends an erase operation and uncouples every cursor from the key.
    fn erase_txn(
        &self,
        state: &mut DbState,
        txn: TxnId,
        key: &[u8],
        cursor: Option<u64>,
    ) -> DbResult<()> {
        let tm = self.env.txn_manager();
        let cursor_dupe = cursor
            .and_then(|cid| state.cursors.get(&cid))
            .map_or(0, |c| c.dupe_index);

        let created = state.txn_index.get_or_create(key).1;

        // a cursor positioned on a specific duplicate defers the conflict
        // check to the duplicate-erase logic
        if cursor_dupe == 0 {
            let node = state.txn_index.get(key).expect("node just resolved");
            let check = check_erase_conflicts(tm, &state.btree, node, txn);
            if let Err(err) = check {
                if created {
                    state.txn_index.remove(key);
                }
                return Err(err);
            }
        }

        let lsn = self.env.next_lsn();
        let mut op = TxnOperation::new(txn, OpKind::Erase, InsertFlags::new(), lsn);
        if cursor_dupe > 0 {
            op.referenced_dupe = cursor_dupe;
        }
        trace!(%lsn, dupe = cursor_dupe, "overlay erase");
        state
            .txn_index
            .get_mut(key)
            .expect("node exists")
            .append(op);
        tm.record_op(
            txn,
            FlushOp {
                db: self.config.name,
                key: key.to_vec(),
                lsn,
            },
        )?;

        self.nil_all_cursors_in_node(state, cursor, key, cursor_dupe);
        self.nil_all_cursors_in_btree(state, cursor, key, cursor_dupe);
        self.clear_dupecaches_on_key(state, key, cursor);

        if let Some(journal) = self.env.journal_for_write() {
            journal.append_erase(self.config.name, txn, key, cursor_dupe, lsn)?;
        }
        Ok(())
    }

    // ----- cursor registry ------------------------------------------------

    pub(crate) fn register_cursor(&self, txn: Option<TxnId>) -> DbResult<u64> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        let id = state.next_cursor;
        state.next_cursor += 1;
        state.cursors.insert(id, CursorState::new(txn));
        Ok(id)
    }

    pub(crate) fn clone_cursor(&self, id: u64) -> DbResult<u64> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        let copy = state
            .cursors
            .get(&id)
            .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?
            .duplicate();
        let new_id = state.next_cursor;
        state.next_cursor += 1;
        state.cursors.insert(new_id, copy);
        Ok(new_id)
    }

    pub(crate) fn cursor_close(&self, id: u64) {
        self.state.lock().cursors.remove(&id);
    }

    fn cursor_txn(&self, id: u64) -> DbResult<Option<TxnId>> {
        let state = self.state.lock();
        state
            .cursors
            .get(&id)
            .map(|c| c.txn)
            .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))
    }

    // ----- cursor operations ---------------------------------------------

    pub(crate) fn cursor_insert(
        &self,
        id: u64,
        key: &mut Key,
        record: &Record,
        flags: InsertFlags,
    ) -> DbResult<()> {
        let txn = self.cursor_txn(id)?;
        self.insert_front(Some(id), txn, key, record, flags)
    }

    pub(crate) fn cursor_find(
        &self,
        id: u64,
        key: &mut Key,
        mut record: Option<&mut Record>,
        flags: FindFlags,
    ) -> DbResult<()> {
        {
            let mut state = self.state.lock();
            if let Some(c) = state.cursors.get_mut(&id) {
                c.clear_dupecache();
                c.set_to_nil(Side::Both);
            }
        }

        let txn = self.cursor_txn(id)?;
        self.find_impl(Some(id), txn, key, record.as_deref_mut(), flags)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.env.config().enable_transactions {
            let current = key.as_slice().to_vec();
            self.cursor_sync_equal(state, id, &current);
        }

        // a key with duplicates couples to the first one
        let visibility = state
            .cursors
            .get(&id)
            .and_then(|c| c.txn)
            .unwrap_or(TxnId::new(0));
        let cache = self.build_dupecache(state, key.as_slice(), visibility)?;
        if cache.len() > 1 {
            let first = cache.first().expect("cache not empty");
            if let Some(out) = record {
                let data =
                    self.line_record(state, key.as_slice(), first)?;
                out.assign(&data);
            }
            if let Some(c) = state.cursors.get_mut(&id) {
                match first {
                    DupeCacheLine::Btree(dup) => {
                        c.btree.couple_to(key.as_slice(), dup);
                        c.couple_to_btree();
                    }
                    DupeCacheLine::TxnOp(lsn) => {
                        c.couple_to_txnop(OpRef::new(key.as_slice(), lsn));
                    }
                }
                c.dupecache = cache;
                c.dupe_index = 1;
            }
        }
        if let Some(c) = state.cursors.get_mut(&id) {
            c.last_op = LastOp::LookupOrInsert;
        }
        drop(guard);

        self.env.changeset_clear();
        Ok(())
    }

    pub(crate) fn cursor_erase(&self, id: u64) -> DbResult<()> {
        let txn = self.cursor_txn(id)?;
        self.erase_front(Some(id), txn, None)
    }

    pub(crate) fn cursor_overwrite(&self, id: u64, record: &Record) -> DbResult<()> {
        self.validate_record_size(record.len())?;
        self.pages().purge_cache();

        let txn = self.cursor_txn(id)?;
        let (txn_id, local_txn) = self.resolve_txn(txn)?;

        let result = (|| {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            self.ensure_open(state)?;
            let c = state
                .cursors
                .get(&id)
                .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;
            let key = c
                .current_key()
                .map(<[u8]>::to_vec)
                .ok_or(DbError::CursorIsNil)?;

            match txn_id {
                Some(txn) => {
                    self.insert_txn(
                        state,
                        txn,
                        &key,
                        record.as_slice(),
                        InsertFlags::new().overwrite(),
                        Some(id),
                    )?;
                    self.recouple_cursor_after_insert(state, id, &key, txn)
                }
                None => {
                    let dup = state
                        .cursors
                        .get(&id)
                        .map_or(0, |c| c.btree.dup() as u32 + 1);
                    let (_, addr) = state.btree.insert(
                        &key,
                        record.as_slice(),
                        InsertFlags::new().overwrite(),
                        dup,
                    )?;
                    self.env.changeset_mark(addr);
                    Ok(())
                }
            }
        })();

        self.finalize(result, local_txn)
    }

    pub(crate) fn cursor_record_count(&self, id: u64) -> DbResult<u32> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.ensure_open(state)?;
        let c = state
            .cursors
            .get(&id)
            .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;
        let key = c
            .current_key()
            .map(<[u8]>::to_vec)
            .ok_or(DbError::CursorIsNil)?;

        if !self.env.config().enable_transactions {
            return Ok(state.btree.dup_count(&key));
        }
        let visibility = c.txn.unwrap_or(TxnId::new(0));
        let cache = self.build_dupecache(state, &key, visibility)?;
        let count = cache.len() as u32;
        if let Some(c) = state.cursors.get_mut(&id) {
            c.dupecache = cache;
        }
        Ok(count)
    }

    pub(crate) fn cursor_duplicate_position(&self, id: u64) -> DbResult<u32> {
        let state = self.state.lock();
        let c = state
            .cursors
            .get(&id)
            .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;
        if c.is_nil() {
            return Err(DbError::CursorIsNil);
        }
        Ok(c.dupe_index)
    }

    pub(crate) fn cursor_record_size(&self, id: u64) -> DbResult<u64> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let data = self.current_record_bytes(state, id)?;
        Ok(data.len() as u64)
    }

    pub(crate) fn cursor_record(&self, id: u64, out: &mut Record) -> DbResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let data = self.current_record_bytes(state, id)?;
        out.assign(&data);
        Ok(())
    }

    /// Bytes of the record the cursor currently points at.
    fn current_record_bytes(&self, state: &mut DbState, id: u64) -> DbResult<Vec<u8>> {
        let c = state
            .cursors
            .get(&id)
            .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;
        let key = c
            .current_key()
            .map(<[u8]>::to_vec)
            .ok_or(DbError::CursorIsNil)?;

        if c.dupe_index > 0 {
            let dupe_index = c.dupe_index;
            let visibility = c.txn.unwrap_or(TxnId::new(0));
            let needs_rebuild = c.dupecache.is_empty();
            let cache = if needs_rebuild {
                self.build_dupecache(state, &key, visibility)?
            } else {
                c.dupecache.clone()
            };
            if needs_rebuild {
                if let Some(c) = state.cursors.get_mut(&id) {
                    c.dupecache = cache.clone();
                }
            }
            let line = cache.get(dupe_index).ok_or(DbError::KeyNotFound)?;
            return self.line_record(state, &key, line);
        }

        let c = state.cursors.get(&id).expect("cursor exists");
        if c.is_coupled_to_txnop() {
            let opref = c.txn_op.as_ref().expect("txn coupling has an op");
            let node = state
                .txn_index
                .get(&opref.key)
                .ok_or(DbError::CursorIsNil)?;
            let op = node.op_by_lsn(opref.lsn).ok_or(DbError::CursorIsNil)?;
            Ok(op.record.clone().unwrap_or_default())
        } else {
            let dup = c.btree.dup();
            state
                .btree
                .record_at(&key, dup)
                .map(<[u8]>::to_vec)
                .ok_or(DbError::KeyNotFound)
        }
    }

    fn line_record(
        &self,
        state: &DbState,
        key: &[u8],
        line: DupeCacheLine,
    ) -> DbResult<Vec<u8>> {
        match line {
            DupeCacheLine::Btree(dup) => state
                .btree
                .record_at(key, dup)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| DbError::corruption("duplicate cache points past btree records")),
            DupeCacheLine::TxnOp(lsn) => {
                let node = state
                    .txn_index
                    .get(key)
                    .ok_or_else(|| DbError::corruption("duplicate cache references a dead node"))?;
                let op = node
                    .op_by_lsn(lsn)
                    .ok_or_else(|| DbError::corruption("duplicate cache references a dead op"))?;
                Ok(op.record.clone().unwrap_or_default())
            }
        }
    }

    // ----- cursor moves ---------------------------------------------------

    pub(crate) fn cursor_move(
        &self,
        id: u64,
        mut key_out: Option<&mut Key>,
        mut record_out: Option<&mut Record>,
        flags: MoveFlags,
    ) -> DbResult<()> {
        self.pages().purge_cache();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.ensure_open(state)?;

        let c = state
            .cursors
            .get(&id)
            .ok_or_else(|| DbError::invalid_parameter("unknown cursor"))?;

        // a never-used cursor treats NEXT as FIRST; an exhausted one treats
        // NEXT as LAST, so a scan can reverse at either end
        let mut direction = flags.direction;
        if c.is_nil() {
            direction = match direction {
                MoveDirection::Next => {
                    if c.first_use {
                        MoveDirection::First
                    } else {
                        MoveDirection::Last
                    }
                }
                MoveDirection::Previous => {
                    if c.first_use {
                        MoveDirection::Last
                    } else {
                        MoveDirection::First
                    }
                }
                other => other,
            };
        }
        let effective = MoveFlags {
            direction,
            ..flags
        };

        if !self.env.config().enable_transactions {
            let c = state.cursors.get_mut(&id).expect("cursor exists");
            let mut side = std::mem::take(&mut c.btree);
            let result = state.btree.cursor_move(
                &mut side,
                key_out.as_deref_mut(),
                record_out.as_deref_mut(),
                effective,
            );
            let c = state.cursors.get_mut(&id).expect("cursor exists");
            c.btree = side;
            if result.is_ok() {
                c.couple_to_btree();
            } else {
                c.first_use = false;
                c.set_to_nil(Side::Both);
            }
            return result;
        }

        let result = self.merged_move(state, id, effective, key_out, record_out);

        let c = state.cursors.get_mut(&id).expect("cursor exists");
        c.last_op = match (result.is_ok(), flags.direction) {
            (true, MoveDirection::Next) => LastOp::Next,
            (true, MoveDirection::Previous) => LastOp::Previous,
            (true, _) => LastOp::None,
            (false, _) => LastOp::None,
        };

        // the sentinel never crosses the API boundary
        match result {
            Err(DbError::KeyErasedInTxn) => Err(DbError::KeyNotFound),
            other => other,
        }
    }

    /// The merged walker: interleaves the overlay's sibling order with the
    /// B-tree, skipping erased keys and honouring overlay precedence on
    /// equal keys.
    fn merged_move(
        &self,
        state: &mut DbState,
        id: u64,
        flags: MoveFlags,
        mut key_out: Option<&mut Key>,
        mut record_out: Option<&mut Record>,
    ) -> DbResult<()> {
        let c = state.cursors.get(&id).expect("cursor exists");
        let visibility = c.txn.unwrap_or(TxnId::new(0));
        let forward = matches!(flags.direction, MoveDirection::First | MoveDirection::Next);

        // duplicate-level steps stay on the current key
        if matches!(flags.direction, MoveDirection::Next | MoveDirection::Previous)
            && !flags.skip_duplicates
        {
            if let Some(current) = c.current_key().map(<[u8]>::to_vec) {
                // a mutation since the last move leaves a stale cache behind
                let cache = if !c.dupecache.is_empty()
                    && matches!(c.last_op, LastOp::Next | LastOp::Previous)
                {
                    c.dupecache.clone()
                } else {
                    self.build_dupecache(state, &current, visibility)?
                };
                let c = state.cursors.get(&id).expect("cursor exists");
                // a cursor landed before duplicates existed sits at line 1
                let position = if c.dupe_index > 0 {
                    c.dupe_index
                } else {
                    cursor_cache_position(c, &cache)
                };
                let target = if forward {
                    (cache.len() > 1).then(|| position + 1)
                } else {
                    (position > 1).then(|| position - 1)
                };
                if let Some(target) = target {
                    if cache.get(target).is_some() {
                        return self.land_on(
                            state,
                            id,
                            &current,
                            cache,
                            target,
                            key_out.as_deref_mut(),
                            record_out.as_deref_mut(),
                        );
                    }
                }
                if flags.only_duplicates {
                    return Err(DbError::KeyNotFound);
                }
            }
        } else if flags.only_duplicates
            && matches!(flags.direction, MoveDirection::Next | MoveDirection::Previous)
        {
            return Err(DbError::KeyNotFound);
        }

        let mut candidate: Option<Vec<u8>> = match flags.direction {
            MoveDirection::First => self.merged_first(state),
            MoveDirection::Last => self.merged_last(state),
            MoveDirection::Next => {
                let current = state
                    .cursors
                    .get(&id)
                    .and_then(|c| c.current_key())
                    .map(<[u8]>::to_vec)
                    .ok_or(DbError::CursorIsNil)?;
                self.merged_next(state, &current)
            }
            MoveDirection::Previous => {
                let current = state
                    .cursors
                    .get(&id)
                    .and_then(|c| c.current_key())
                    .map(<[u8]>::to_vec)
                    .ok_or(DbError::CursorIsNil)?;
                self.merged_prev(state, &current)
            }
        };

        let mut saw_erased = false;
        while let Some(key) = candidate {
            let cache = self.build_dupecache(state, &key, visibility)?;
            if cache.is_empty() {
                if state.txn_index.get(&key).is_some() {
                    saw_erased = true;
                }
                candidate = if forward {
                    self.merged_next(state, &key)
                } else {
                    self.merged_prev(state, &key)
                };
                continue;
            }
            let at = if forward || flags.skip_duplicates {
                1
            } else {
                cache.len() as u32
            };
            return self.land_on(
                state,
                id,
                &key,
                cache,
                at,
                key_out.as_deref_mut(),
                record_out.as_deref_mut(),
            );
        }

        if let Some(c) = state.cursors.get_mut(&id) {
            c.first_use = false;
            c.set_to_nil(Side::Both);
            c.clear_dupecache();
        }
        if saw_erased {
            Err(DbError::KeyErasedInTxn)
        } else {
            Err(DbError::KeyNotFound)
        }
    }

    /// Couples the cursor to duplicate `at` (1-based) of `key` and writes the
    /// outputs.
    fn land_on(
        &self,
        state: &mut DbState,
        id: u64,
        key: &[u8],
        cache: DupeCache,
        at: u32,
        key_out: Option<&mut Key>,
        record_out: Option<&mut Record>,
    ) -> DbResult<()> {
        let line = cache.get(at).expect("landing line exists");
        let data = self.line_record(state, key, line)?;

        let in_btree = state.btree.contains(key);
        let cache_len = cache.len();
        let c = state.cursors.get_mut(&id).expect("cursor exists");
        match line {
            DupeCacheLine::Btree(dup) => {
                c.btree.couple_to(key, dup);
                c.set_to_nil(Side::Txn);
                c.couple_to_btree();
            }
            DupeCacheLine::TxnOp(lsn) => {
                if in_btree {
                    c.btree.couple_to(key, 0);
                } else {
                    c.btree.set_nil();
                }
                c.couple_to_txnop(OpRef::new(key, lsn));
            }
        }
        c.dupecache = cache;
        c.dupe_index = if cache_len > 1 { at } else { 0 };

        if let Some(out) = key_out {
            out.assign(key);
            out.set_approximate(false);
        }
        if let Some(out) = record_out {
            out.assign(&data);
        }
        Ok(())
    }

    fn merged_first(&self, state: &DbState) -> Option<Vec<u8>> {
        merge_min(
            state.btree.first_key().map(<[u8]>::to_vec),
            state.txn_index.first_key().map(<[u8]>::to_vec),
        )
    }

    fn merged_last(&self, state: &DbState) -> Option<Vec<u8>> {
        merge_max(
            state.btree.last_key().map(<[u8]>::to_vec),
            state.txn_index.last_key().map(<[u8]>::to_vec),
        )
    }

    fn merged_next(&self, state: &DbState, key: &[u8]) -> Option<Vec<u8>> {
        merge_min(
            state.btree.next_key(key).map(<[u8]>::to_vec),
            state.txn_index.next_key(key).map(<[u8]>::to_vec),
        )
    }

    fn merged_prev(&self, state: &DbState, key: &[u8]) -> Option<Vec<u8>> {
        merge_max(
            state.btree.prev_key(key).map(<[u8]>::to_vec),
            state.txn_index.prev_key(key).map(<[u8]>::to_vec),
        )
    }

    // ----- duplicate cache ------------------------------------------------

    /// Materialises the live duplicates of `key`: the B-tree's records plus
    /// the overlay's visible operations applied oldest to newest.
    ///
    /// Fails with [`DbError::TxnConflict`] when a third active transaction
    /// owns a non-flushed operation on the key.
    fn build_dupecache(
        &self,
        state: &DbState,
        key: &[u8],
        txn: TxnId,
    ) -> DbResult<DupeCache> {
        let tm = self.env.txn_manager();
        let mut cache = DupeCache::new();
        for dup in 0..state.btree.dup_count(key) {
            cache.push(DupeCacheLine::Btree(dup as usize));
        }

        let Some(node) = state.txn_index.get(key) else {
            return Ok(cache);
        };
        for op in node.ops_oldest_first() {
            match op_view(tm, op, txn) {
                OpView::Skip => continue,
                OpView::Conflict => return Err(DbError::TxnConflict),
                OpView::Visible => match op.kind {
                    OpKind::Insert => {
                        cache.clear();
                        cache.push(DupeCacheLine::TxnOp(op.lsn));
                    }
                    OpKind::InsertOverwrite => {
                        let at = if op.referenced_dupe > 0 {
                            op.referenced_dupe as usize - 1
                        } else {
                            0
                        };
                        cache.replace_at(at, DupeCacheLine::TxnOp(op.lsn));
                    }
                    OpKind::InsertDuplicate => {
                        let at = match op.flags.dup_position {
                            Some(DupePosition::First) => 0,
                            Some(DupePosition::Before) if op.referenced_dupe >= 1 => {
                                op.referenced_dupe as usize - 1
                            }
                            Some(DupePosition::After) if op.referenced_dupe >= 1 => {
                                op.referenced_dupe as usize
                            }
                            _ => cache.len(),
                        };
                        cache.insert_at(at, DupeCacheLine::TxnOp(op.lsn));
                    }
                    OpKind::Erase => {
                        if op.referenced_dupe == 0 {
                            cache.clear();
                        } else {
                            cache.remove_at(op.referenced_dupe as usize - 1);
                        }
                    }
                    OpKind::Nop => unreachable!("nop ops are skipped"),
                },
            }
        }
        Ok(cache)
    }

    // ----- cursor bookkeeping across mutations ---------------------------

    fn couple_cursor_to_op(&self, state: &mut DbState, id: u64, opref: OpRef) {
        if let Some(c) = state.cursors.get_mut(&id) {
            c.couple_to_txnop(opref);
        }
    }

    /// Positions the cursor's B-tree side on `key` when the B-tree holds it,
    /// and nils that side otherwise.
    fn cursor_sync_equal(&self, state: &mut DbState, id: u64, key: &[u8]) {
        let in_btree = state.btree.contains(key);
        if let Some(c) = state.cursors.get_mut(&id) {
            if in_btree {
                c.btree.couple_to(key, 0);
            } else {
                c.set_to_nil(Side::Btree);
            }
        }
    }

    /// Increments the duplicate index of every other cursor on `key` whose
    /// index is at or past the new duplicate's landing position.
    fn increment_dupe_index(
        &self,
        state: &mut DbState,
        key: &[u8],
        skip: Option<u64>,
        new_at: u32,
    ) {
        for (cid, c) in state.cursors.iter_mut() {
            if Some(*cid) == skip || c.current_key() != Some(key) {
                continue;
            }
            if c.dupe_index >= new_at {
                c.dupe_index += 1;
            }
        }
    }

    /// Uncouples the overlay side of every cursor parked on `key`'s node,
    /// applying the duplicate-shift rule when the erase targets a single
    /// duplicate.
    fn nil_all_cursors_in_node(
        &self,
        state: &mut DbState,
        current: Option<u64>,
        key: &[u8],
        current_dupe: u32,
    ) {
        let ids: Vec<u64> = state.cursors.keys().copied().collect();
        for cid in ids {
            if Some(cid) == current {
                continue;
            }
            let c = state.cursors.get_mut(&cid).expect("cursor exists");
            let on_node = c
                .txn_op
                .as_ref()
                .map_or(false, |opref| opref.key.as_slice() == key);
            if !on_node {
                continue;
            }
            if current_dupe > 0 {
                if current_dupe < c.dupe_index {
                    c.dupe_index -= 1;
                    continue;
                }
                if current_dupe > c.dupe_index {
                    continue;
                }
            }
            c.couple_to_btree();
            c.set_to_nil(Side::Txn);
            c.clear_dupecache();
            c.dupe_index = 0;
            // an erase positions peers like an insert or find would
            c.last_op = LastOp::LookupOrInsert;
        }
    }

    /// Nils every B-tree-coupled cursor standing on `key`, with the same
    /// duplicate-shift rule.
    fn nil_all_cursors_in_btree(
        &self,
        state: &mut DbState,
        current: Option<u64>,
        key: &[u8],
        current_dupe: u32,
    ) {
        let ids: Vec<u64> = state.cursors.keys().copied().collect();
        for cid in ids {
            if Some(cid) == current {
                continue;
            }
            let c = state.cursors.get_mut(&cid).expect("cursor exists");
            if c.is_coupled_to_txnop() || !c.btree.points_to(key) {
                continue;
            }
            if current_dupe > 0 {
                if current_dupe < c.dupe_index {
                    c.dupe_index -= 1;
                    continue;
                }
                if current_dupe > c.dupe_index {
                    continue;
                }
            }
            c.set_to_nil(Side::Both);
            c.clear_dupecache();
        }
    }

    fn clear_dupecaches_on_key(&self, state: &mut DbState, key: &[u8], skip: Option<u64>) {
        for (cid, c) in state.cursors.iter_mut() {
            if Some(*cid) == skip {
                continue;
            }
            if c.current_key() == Some(key) {
                c.clear_dupecache();
            }
        }
    }

    // ----- flush and abort ------------------------------------------------

    /// Applies one committed overlay operation to the B-tree and transitions
    /// coupled cursors to their new B-tree position.
    pub(crate) fn flush_txn_operation(&self, flush: &FlushOp) -> DbResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(node) = state.txn_index.get(&flush.key) else {
            return Ok(());
        };
        let Some(op) = node.op_by_lsn(flush.lsn) else {
            return Ok(());
        };
        let kind = op.kind;
        let flags = op.flags;
        let referenced_dupe = op.referenced_dupe;
        let record = op.record.clone();

        let opref = OpRef::new(&flush.key, flush.lsn);
        let coupled: Vec<u64> = state
            .cursors
            .iter()
            .filter(|(_, c)| c.txn_op.as_ref() == Some(&opref))
            .map(|(cid, _)| *cid)
            .collect();

        match kind {
            OpKind::Insert | OpKind::InsertOverwrite | OpKind::InsertDuplicate => {
                let mut effective = flags;
                if kind == OpKind::InsertDuplicate {
                    effective.duplicate = true;
                } else {
                    effective.overwrite = true;
                }
                let data = record.unwrap_or_default();
                let (dup, addr) =
                    state
                        .btree
                        .insert(&flush.key, &data, effective, referenced_dupe)?;
                self.env.changeset_mark(addr);

                // the first coupled cursor lands on the inserted item; the
                // others copy its position
                if let Some((first, rest)) = coupled.split_first() {
                    let landed = {
                        let c = state.cursors.get_mut(first).expect("cursor exists");
                        c.btree.couple_to(&flush.key, dup);
                        c.couple_to_btree();
                        c.set_to_nil(Side::Txn);
                        c.btree.clone()
                    };
                    for cid in rest {
                        let c = state.cursors.get_mut(cid).expect("cursor exists");
                        c.btree.clone_from_cursor(&landed);
                        c.couple_to_btree();
                        c.set_to_nil(Side::Txn);
                    }
                }
            }
            OpKind::Erase => {
                match state.btree.erase(&flush.key, referenced_dupe) {
                    Ok(addr) => self.env.changeset_mark(addr),
                    // the row only ever lived in the overlay
                    Err(DbError::KeyNotFound) => {}
                    Err(err) => return Err(err),
                }
                for cid in &coupled {
                    let c = state.cursors.get_mut(cid).expect("cursor exists");
                    c.couple_to_btree();
                    c.set_to_nil(Side::Txn);
                }
            }
            OpKind::Nop => {}
        }

        // mark flushed so mid-walk readers skip it, then retire the op
        if let Some(node) = state.txn_index.get_mut(&flush.key) {
            if let Some(op) = node.op_by_lsn_mut(flush.lsn) {
                op.flushed = true;
            }
            node.remove_op(flush.lsn);
            if node.is_empty() {
                state.txn_index.remove(&flush.key);
            }
        }
        self.clear_dupecaches_on_key(state, &flush.key, None);
        trace!(lsn = %flush.lsn, "overlay operation flushed");
        Ok(())
    }

    /// Drops one operation of an aborted transaction from the overlay.
    pub(crate) fn discard_aborted_op(&self, key: &[u8], lsn: Lsn) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let opref = OpRef::new(key, lsn);
        let ids: Vec<u64> = state.cursors.keys().copied().collect();
        for cid in ids {
            let c = state.cursors.get_mut(&cid).expect("cursor exists");
            if c.txn_op.as_ref() == Some(&opref) {
                c.couple_to_btree();
                c.set_to_nil(Side::Txn);
                c.clear_dupecache();
                c.dupe_index = 0;
                c.last_op = LastOp::LookupOrInsert;
            }
        }

        if let Some(node) = state.txn_index.get_mut(key) {
            node.remove_op(lsn);
            if node.is_empty() {
                state.txn_index.remove(key);
            }
        }
        self.clear_dupecaches_on_key(state, key, None);
    }

    // ----- whole-database operations -------------------------------------

    pub(crate) fn count(&self, txn: Option<TxnId>, distinct: bool) -> DbResult<u64> {
        self.pages().purge_cache();

        let guard = self.state.lock();
        let state = &*guard;
        self.ensure_open(state)?;

        let mut total = state.btree.count(distinct) as i64;
        if self.env.config().enable_transactions {
            let visibility = txn.unwrap_or(TxnId::new(0));
            let keys: Vec<Vec<u8>> = state.txn_index.keys().map(<[u8]>::to_vec).collect();
            for key in keys {
                let merged = self.build_dupecache(state, &key, visibility)?.len() as i64;
                let in_btree = state.btree.dup_count(&key) as i64;
                if distinct {
                    total += i64::from(merged > 0) - i64::from(in_btree > 0);
                } else {
                    total += merged - in_btree;
                }
            }
        }
        Ok(total.max(0) as u64)
    }

    pub(crate) fn scan(
        &self,
        txn: Option<TxnId>,
        visitor: &mut dyn ScanVisitor,
        distinct: bool,
    ) -> DbResult<()> {
        self.pages().purge_cache();

        // pure B-tree: let each leaf scan itself
        if !self.env.config().enable_transactions {
            let guard = self.state.lock();
            self.ensure_open(&guard)?;
            guard.btree.scan_all(visitor, distinct);
            return Ok(());
        }

        let cid = self.register_cursor(txn)?;
        let result = self.scan_with_cursor(cid, visitor, distinct);
        self.cursor_close(cid);
        result
    }

    fn scan_with_cursor(
        &self,
        cid: u64,
        visitor: &mut dyn ScanVisitor,
        distinct: bool,
    ) -> DbResult<()> {
        let mut key = Key::new();

        match self.cursor_move(cid, Some(&mut key), None, MoveFlags::first()) {
            Ok(()) => {}
            Err(DbError::KeyNotFound) => return Ok(()),
            Err(err) => return Err(err),
        }

        loop {
            let (is_btree, overlay_in_leaf) = {
                let guard = self.state.lock();
                let state = &*guard;
                let c = state.cursors.get(&cid).expect("cursor exists");
                if !c.is_coupled_to_btree() {
                    (false, false)
                } else {
                    let current = c.current_key().expect("coupled cursor has a key");
                    // the current key's own node counts: its duplicates may
                    // live partly in the overlay
                    let overlap = state.txn_index.get(current).is_some()
                        || match state.btree.locate(current) {
                            Some((leaf_idx, _)) => {
                                let leaf = state.btree.leaf(leaf_idx);
                                let last = leaf.last_key().expect("leaf not empty").to_vec();
                                state
                                    .txn_index
                                    .next_key(current)
                                    .map_or(false, |k| k <= last.as_slice())
                            }
                            None => false,
                        };
                    (true, overlap)
                }
            };

            if is_btree && !overlay_in_leaf {
                // no overlay key interleaves with the rest of this leaf: let
                // the leaf scan itself, then advance past its last key
                let hopped = {
                    let mut guard = self.state.lock();
                    let state = &mut *guard;
                    let current = state
                        .cursors
                        .get(&cid)
                        .and_then(|c| c.current_key())
                        .expect("coupled cursor has a key")
                        .to_vec();
                    let (leaf_idx, slot) =
                        state.btree.locate(&current).expect("cursor key is stored");
                    let leaf = state.btree.leaf(leaf_idx);
                    leaf.scan(visitor, slot, distinct);
                    let leaf_last = leaf.last_key().expect("leaf not empty").to_vec();

                    // hop directly to the next leaf when no overlay key lies
                    // at or before its first slot; otherwise fall back to a
                    // positioned merged step
                    let mut side = BtreeCursor::new();
                    let mut hopped = false;
                    if state.btree.move_to_next_leaf(&mut side, leaf_idx).is_some() {
                        let landed = side.current_key().expect("leaf has a key").to_vec();
                        let gap_clear = state
                            .txn_index
                            .next_key(&leaf_last)
                            .map_or(true, |k| k > landed.as_slice());
                        if gap_clear {
                            hopped = true;
                        }
                    }

                    if let Some(c) = state.cursors.get_mut(&cid) {
                        if hopped {
                            c.btree = side;
                        } else {
                            c.btree.couple_to(&leaf_last, 0);
                        }
                        c.couple_to_btree();
                        c.set_to_nil(Side::Txn);
                        c.clear_dupecache();
                        c.dupe_index = 0;
                    }
                    hopped
                };
                if hopped {
                    // the cursor already stands on the next unvisited key
                    continue;
                }
            } else {
                // overlay keys interleave here: visit through the cursor
                let count = if distinct {
                    1
                } else {
                    u64::from(self.cursor_record_count(cid)?)
                };
                let current = {
                    let guard = self.state.lock();
                    guard
                        .cursors
                        .get(&cid)
                        .and_then(|c| c.current_key().map(<[u8]>::to_vec))
                        .expect("positioned cursor")
                };
                visitor.visit(&current, count);
            }

            match self.cursor_move(cid, Some(&mut key), None, MoveFlags::next().skip_duplicates())
            {
                Ok(()) => {}
                Err(DbError::KeyNotFound) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn check_integrity(&self) -> DbResult<()> {
        self.pages().purge_cache();

        let guard = self.state.lock();
        let state = &*guard;
        self.ensure_open(state)?;
        state.btree.check_integrity()?;

        // overlay: LSNs must strictly increase within each node
        for node in state.txn_index.nodes() {
            if node.is_empty() {
                return Err(DbError::corruption("empty overlay node"));
            }
            let mut previous: Option<Lsn> = None;
            for op in node.ops_oldest_first() {
                if let Some(prev) = previous {
                    if op.lsn <= prev {
                        return Err(DbError::corruption(
                            "overlay operation LSNs are not increasing",
                        ));
                    }
                }
                previous = Some(op.lsn);
            }
        }
        Ok(())
    }

    pub(crate) fn get_parameters(&self, params: &mut [Parameter]) -> DbResult<()> {
        for param in params.iter_mut() {
            param.value = match param.name {
                ParameterName::KeySize => self.config.key_size as u64,
                ParameterName::KeyType => self.config.key_type.as_u64(),
                ParameterName::RecordSize => self.config.record_size as u64,
                ParameterName::Flags => {
                    let mut bits = 0u64;
                    if self.config.enable_duplicates {
                        bits |= 0x1;
                    }
                    if self.config.records_inline {
                        bits |= 0x2;
                    }
                    if self.env.config().enable_transactions {
                        bits |= 0x4;
                    }
                    if self.env.config().enable_recovery {
                        bits |= 0x8;
                    }
                    bits
                }
                ParameterName::DatabaseName => u64::from(self.config.name),
                ParameterName::MaxKeysPerPage => {
                    let guard = self.state.lock();
                    let root = guard.btree.root_addr();
                    self.pages().fetch(self.config.name, root)?;
                    guard.btree.estimate_capacity() as u64
                }
                ParameterName::RecordCompression | ParameterName::KeyCompression => 0,
            };
        }
        Ok(())
    }

    pub(crate) fn close(&self) -> DbResult<()> {
        {
            let guard = self.state.lock();
            self.ensure_open(&guard)?;
            let tm = self.env.txn_manager();
            for node in guard.txn_index.nodes() {
                for op in node.ops_newest_first() {
                    if tm.state_of(op.txn) == TxnState::Active {
                        warn!(
                            name = self.config.name,
                            "cannot close a database that is modified by an active transaction"
                        );
                        return Err(DbError::TxnStillOpen);
                    }
                }
            }
        }

        self.env.flush_committed_txns()?;

        let mut guard = self.state.lock();
        guard.open = false;
        guard.cursors.clear();
        let overlay_nodes = guard.txn_index.len();
        drop(guard);

        self.pages().close_database(self.config.name);
        debug!(
            name = self.config.name,
            overlay_nodes, "database closed"
        );
        Ok(())
    }
}

/// 1-based cache position of the line a cursor currently stands on.
fn cursor_cache_position(c: &CursorState, cache: &DupeCache) -> u32 {
    if c.is_coupled_to_txnop() {
        c.txn_op
            .as_ref()
            .and_then(|opref| cache.position_of_op(opref.lsn))
            .unwrap_or(1)
    } else {
        let dup = c.btree.dup();
        (1..=cache.len() as u32)
            .find(|&i| cache.get(i) == Some(DupeCacheLine::Btree(dup)))
            .unwrap_or(1)
    }
}

fn merge_min(a: Option<Vec<u8>>, b: Option<Vec<u8>>) -> Option<Vec<u8>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn merge_max(a: Option<Vec<u8>>, b: Option<Vec<u8>>) -> Option<Vec<u8>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn encode_recno(recno: u64, width: usize) -> Vec<u8> {
    if width == 4 {
        (recno as u32).to_be_bytes().to_vec()
    } else {
        recno.to_be_bytes().to_vec()
    }
}

fn decode_recno(key: &[u8], width: usize) -> DbResult<u64> {
    if key.len() != width {
        return Err(DbError::invalid_parameter(
            "record-number keys must be exactly the key width",
        ));
    }
    let mut raw = [0u8; 8];
    raw[8 - width..].copy_from_slice(key);
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;

    fn env() -> Arc<Environment> {
        Environment::new(EnvConfig::default())
    }

    fn db(env: &Arc<Environment>) -> Database {
        env.create_database(DatabaseConfig::new(1)).unwrap()
    }

    #[test]
    fn insert_then_find_round_trips() {
        let env = env();
        let db = db(&env);
        let mut key = Key::from_slice(b"alpha");
        db.insert(None, &mut key, &Record::from_slice(b"1"), InsertFlags::new())
            .unwrap();

        let mut record = Record::new();
        db.find(None, &mut Key::from_slice(b"alpha"), Some(&mut record), FindFlags::exact())
            .unwrap();
        assert_eq!(record.as_slice(), b"1");
    }

    #[test]
    fn plain_insert_of_existing_key_is_rejected() {
        let env = env();
        let db = db(&env);
        let mut key = Key::from_slice(b"k");
        db.insert(None, &mut key, &Record::from_slice(b"1"), InsertFlags::new())
            .unwrap();

        let result = db.insert(None, &mut key, &Record::from_slice(b"2"), InsertFlags::new());
        assert!(matches!(result, Err(DbError::DuplicateKey)));

        db.insert(None, &mut key, &Record::from_slice(b"2"), InsertFlags::new().overwrite())
            .unwrap();
        let mut record = Record::new();
        db.find(None, &mut key, Some(&mut record), FindFlags::exact())
            .unwrap();
        assert_eq!(record.as_slice(), b"2");
    }

    #[test]
    fn erase_removes_key() {
        let env = env();
        let db = db(&env);
        let mut key = Key::from_slice(b"gone");
        db.insert(None, &mut key, &Record::from_slice(b"x"), InsertFlags::new())
            .unwrap();
        db.erase(None, &key).unwrap();

        let result = db.find(None, &mut key, None, FindFlags::exact());
        assert!(matches!(result, Err(DbError::KeyNotFound)));
        assert!(matches!(db.erase(None, &key), Err(DbError::KeyNotFound)));
    }

    #[test]
    fn fixed_key_size_is_enforced() {
        let env = env();
        let db = env
            .create_database(DatabaseConfig::new(2).key_size(4))
            .unwrap();
        let mut key = Key::from_slice(b"toolong");
        let result = db.insert(None, &mut key, &Record::from_slice(b"r"), InsertFlags::new());
        assert!(matches!(result, Err(DbError::InvalidKeySize { expected: 4, .. })));
    }

    #[test]
    fn fixed_record_size_is_enforced() {
        let env = env();
        let db = env
            .create_database(DatabaseConfig::new(2).record_size(2))
            .unwrap();
        let mut key = Key::from_slice(b"k");
        let result = db.insert(None, &mut key, &Record::from_slice(b"xxx"), InsertFlags::new());
        assert!(matches!(
            result,
            Err(DbError::InvalidRecordSize { expected: 2, .. })
        ));
    }

    #[test]
    fn oversized_keys_fail_creation() {
        let env = Environment::new(EnvConfig::default().page_size(256));
        let result = env.create_database(DatabaseConfig::new(3).key_size(64));
        assert!(matches!(result, Err(DbError::InvalidKeySize { .. })));
    }

    #[test]
    fn duplicate_flag_requires_duplicates_enabled() {
        let env = env();
        let db = db(&env);
        let mut key = Key::from_slice(b"k");
        let result = db.insert(
            None,
            &mut key,
            &Record::from_slice(b"r"),
            InsertFlags::new().duplicate(),
        );
        assert!(matches!(result, Err(DbError::InvalidParameter { .. })));
    }

    #[test]
    fn record_number_keys_are_assigned() {
        let env = env();
        let db = env
            .create_database(DatabaseConfig::new(4).key_type(KeyType::RecordNumber64))
            .unwrap();

        let mut key = Key::new();
        db.insert(None, &mut key, &Record::from_slice(b"a"), InsertFlags::new())
            .unwrap();
        assert_eq!(key.as_slice(), 1u64.to_be_bytes());

        let mut key = Key::new();
        db.insert(None, &mut key, &Record::from_slice(b"b"), InsertFlags::new())
            .unwrap();
        assert_eq!(key.as_slice(), 2u64.to_be_bytes());
    }

    #[test]
    fn record_number_key_width_is_validated() {
        let env = env();
        let db = env
            .create_database(DatabaseConfig::new(4).key_type(KeyType::RecordNumber32))
            .unwrap();

        let mut key = Key::from_slice(b"abc");
        let result = db.insert(None, &mut key, &Record::from_slice(b"r"), InsertFlags::new());
        assert!(matches!(result, Err(DbError::InvalidKeySize { expected: 4, .. })));

        let result = db.erase(None, &Key::from_slice(b"xy"));
        assert!(matches!(result, Err(DbError::InvalidParameter { .. })));
    }

    #[test]
    fn parameters_report_configuration() {
        let env = env();
        let db = env
            .create_database(
                DatabaseConfig::new(9)
                    .key_type(KeyType::UInt64)
                    .record_size(8)
                    .enable_duplicates(true),
            )
            .unwrap();

        let mut params = [
            Parameter::new(ParameterName::KeySize),
            Parameter::new(ParameterName::KeyType),
            Parameter::new(ParameterName::RecordSize),
            Parameter::new(ParameterName::DatabaseName),
            Parameter::new(ParameterName::MaxKeysPerPage),
            Parameter::new(ParameterName::RecordCompression),
        ];
        db.get_parameters(&mut params).unwrap();

        assert_eq!(params[0].value, 8);
        assert_eq!(params[1].value, KeyType::UInt64.as_u64());
        assert_eq!(params[2].value, 8);
        assert_eq!(params[3].value, 9);
        assert!(params[4].value >= 2);
        assert_eq!(params[5].value, 0);
    }

    #[test]
    fn count_spans_overlay_and_btree() {
        let env = env();
        let db = db(&env);
        for k in [b"a", b"b", b"c"] {
            db.insert(None, &mut Key::from_slice(k), &Record::from_slice(b"r"), InsertFlags::new())
                .unwrap();
        }
        assert_eq!(db.count(None, true).unwrap(), 3);

        // an uncommitted insert still counts for its own transaction
        let txn = env.txn_begin().unwrap();
        db.insert(Some(&txn), &mut Key::from_slice(b"d"), &Record::from_slice(b"r"), InsertFlags::new())
            .unwrap();
        assert_eq!(db.count(Some(&txn), true).unwrap(), 4);
        env.txn_abort(txn).unwrap();

        assert_eq!(db.count(None, true).unwrap(), 3);
    }

    #[test]
    fn check_integrity_passes_on_live_database() {
        let env = env();
        let db = db(&env);
        for i in 0..64u32 {
            let mut key = Key::from_slice(&i.to_be_bytes());
            db.insert(None, &mut key, &Record::from_slice(b"r"), InsertFlags::new())
                .unwrap();
        }
        let txn = env.txn_begin().unwrap();
        db.insert(Some(&txn), &mut Key::from_slice(b"zz"), &Record::from_slice(b"r"), InsertFlags::new())
            .unwrap();
        db.check_integrity().unwrap();
        env.txn_abort(txn).unwrap();
    }

    #[test]
    fn operations_fail_after_close() {
        let env = env();
        let db = db(&env);
        db.close().unwrap();
        let mut key = Key::from_slice(b"k");
        let result = db.insert(None, &mut key, &Record::from_slice(b"r"), InsertFlags::new());
        assert!(matches!(result, Err(DbError::DatabaseClosed)));
    }
}
