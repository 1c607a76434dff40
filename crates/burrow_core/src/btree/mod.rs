//! The durable ordered index.
//!
//! Burrow's B-tree keeps sorted leaf pages of key slots, each slot holding
//! the key's duplicate records in insertion order. Cursor positions are held
//! in uncoupled form (key + duplicate ordinal) so they survive leaf splits.
//! All ordering is lexicographic on the key bytes; fixed-width numeric keys
//! are big-endian encoded, which makes byte order equal numeric order.

pub(crate) mod cursor;
pub(crate) mod node;

use crate::db::ScanVisitor;
use crate::error::{DbError, DbResult};
use crate::page::PageManager;
use crate::record::{Key, Record};
use crate::types::{
    DupePosition, FindFlags, InsertFlags, KeyType, MoveDirection, MoveFlags, PageAddr,
};
use cursor::BtreeCursor;
use node::{Leaf, LeafEntry};
use std::cmp::Ordering;
use std::sync::Arc;

/// Size statistics of a B-tree index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtreeStats {
    /// Number of leaf pages.
    pub leaves: usize,
    /// Number of distinct keys.
    pub keys: u64,
    /// Number of records, duplicates included.
    pub records: u64,
}

/// The ordered map behind a database.
pub(crate) struct BtreeIndex {
    pages: Arc<PageManager>,
    db: u16,
    #[allow(dead_code)]
    key_type: KeyType,
    leaf_capacity: usize,
    duplicates: bool,
    /// Sorted leaves; the root leaf always exists, possibly empty.
    leaves: Vec<Leaf>,
}

impl BtreeIndex {
    pub(crate) fn new(
        pages: Arc<PageManager>,
        db: u16,
        key_type: KeyType,
        leaf_capacity: usize,
        duplicates: bool,
    ) -> Self {
        let root = Leaf::new(pages.allocate(db));
        Self {
            pages,
            db,
            key_type,
            leaf_capacity: leaf_capacity.max(2),
            duplicates,
            leaves: vec![root],
        }
    }

    /// Compares two keys in index order.
    pub(crate) fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    /// Index of the leaf `key` belongs to.
    fn leaf_for(&self, key: &[u8]) -> usize {
        // first leaf whose last key is >= key; later leaves cannot hold it
        let idx = self
            .leaves
            .partition_point(|leaf| leaf.last_key().map_or(false, |last| last < key));
        idx.min(self.leaves.len() - 1)
    }

    fn entry(&self, key: &[u8]) -> Option<&LeafEntry> {
        let leaf = &self.leaves[self.leaf_for(key)];
        leaf.slot_of(key).ok().map(|slot| &leaf.entries[slot])
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.entry(key).is_some()
    }

    /// Duplicate count of `key`, 0 when absent.
    pub(crate) fn dup_count(&self, key: &[u8]) -> u32 {
        self.entry(key).map_or(0, |e| e.records.len() as u32)
    }

    /// The record at 0-based duplicate ordinal `dup`.
    pub(crate) fn record_at(&self, key: &[u8], dup: usize) -> Option<&[u8]> {
        self.entry(key)
            .and_then(|e| e.records.get(dup))
            .map(Vec::as_slice)
    }

    /// Inserts `record` under `key`.
    ///
    /// `ref_dupe` is the 1-based duplicate the caller's cursor was positioned
    /// on, anchoring [`DupePosition::Before`]/[`DupePosition::After`].
    /// Returns the 0-based ordinal the record landed at and the leaf touched.
    pub(crate) fn insert(
        &mut self,
        key: &[u8],
        record: &[u8],
        flags: InsertFlags,
        ref_dupe: u32,
    ) -> DbResult<(usize, PageAddr)> {
        let leaf_idx = self.leaf_for(key);
        let leaf = &mut self.leaves[leaf_idx];
        match leaf.slot_of(key) {
            Ok(slot) => {
                let entry = &mut leaf.entries[slot];
                if flags.duplicate && self.duplicates {
                    let at = match flags.dup_position {
                        Some(DupePosition::First) => 0,
                        Some(DupePosition::Before) if ref_dupe >= 1 => ref_dupe as usize - 1,
                        Some(DupePosition::After) if ref_dupe >= 1 => ref_dupe as usize,
                        _ => entry.records.len(),
                    };
                    let at = at.min(entry.records.len());
                    entry.records.insert(at, record.to_vec());
                    Ok((at, leaf.addr))
                } else if flags.overwrite {
                    let at = if ref_dupe >= 1 {
                        ref_dupe as usize - 1
                    } else {
                        0
                    };
                    let slot_record = entry
                        .records
                        .get_mut(at)
                        .ok_or(DbError::KeyNotFound)?;
                    slot_record.clear();
                    slot_record.extend_from_slice(record);
                    Ok((at, leaf.addr))
                } else {
                    Err(DbError::DuplicateKey)
                }
            }
            Err(slot) => {
                leaf.entries.insert(slot, LeafEntry::new(key, record));
                let addr = leaf.addr;
                self.split_if_needed(leaf_idx);
                Ok((0, addr))
            }
        }
    }

    fn split_if_needed(&mut self, leaf_idx: usize) {
        if self.leaves[leaf_idx].entries.len() <= self.leaf_capacity {
            return;
        }
        let right_addr = self.pages.allocate(self.db);
        let leaf = &mut self.leaves[leaf_idx];
        let mid = leaf.entries.len() / 2;
        let right_entries = leaf.entries.split_off(mid);
        let mut right = Leaf::new(right_addr);
        right.entries = right_entries;
        self.leaves.insert(leaf_idx + 1, right);
    }

    /// Erases `key`, or a single duplicate when `dupe` is a 1-based index.
    ///
    /// Returns the leaf touched.
    pub(crate) fn erase(&mut self, key: &[u8], dupe: u32) -> DbResult<PageAddr> {
        let leaf_idx = self.leaf_for(key);
        let leaf = &mut self.leaves[leaf_idx];
        let slot = leaf.slot_of(key).map_err(|_| DbError::KeyNotFound)?;
        let addr = leaf.addr;

        if dupe == 0 {
            leaf.entries.remove(slot);
        } else {
            let entry = &mut leaf.entries[slot];
            let at = dupe as usize - 1;
            if at >= entry.records.len() {
                return Err(DbError::KeyNotFound);
            }
            entry.records.remove(at);
            if entry.records.is_empty() {
                leaf.entries.remove(slot);
            }
        }

        let now_empty = leaf.entries.is_empty();
        if now_empty && self.leaves.len() > 1 {
            self.pages.free(self.db, addr);
            self.leaves.remove(leaf_idx);
        }
        Ok(addr)
    }

    /// Looks up `key`, honouring exact and approximate match flags.
    ///
    /// On an approximate hit the key buffer is rewritten with the matched key
    /// and its approximate tag is set. The cursor, when supplied, is coupled
    /// to the matched key's first duplicate.
    pub(crate) fn find(
        &self,
        key: &mut Key,
        record: Option<&mut Record>,
        flags: FindFlags,
        cursor: Option<&mut BtreeCursor>,
    ) -> DbResult<()> {
        if flags.exact {
            if let Some(entry) = self.entry(key.as_slice()) {
                key.set_approximate(false);
                if let Some(out) = record {
                    out.assign(&entry.records[0]);
                }
                if let Some(c) = cursor {
                    c.couple_to(key.as_slice(), 0);
                }
                return Ok(());
            }
        }

        let matched = if flags.lt {
            self.prev_key(key.as_slice())
        } else if flags.gt {
            self.next_key(key.as_slice())
        } else {
            None
        };
        let Some(matched) = matched.map(<[u8]>::to_vec) else {
            return Err(DbError::KeyNotFound);
        };

        let entry = self.entry(&matched).expect("matched key exists");
        if let Some(out) = record {
            out.assign(&entry.records[0]);
        }
        key.assign(&matched);
        key.set_approximate(true);
        if let Some(c) = cursor {
            c.couple_to(&matched, 0);
        }
        Ok(())
    }

    pub(crate) fn first_key(&self) -> Option<&[u8]> {
        self.leaves.iter().find_map(Leaf::first_key)
    }

    pub(crate) fn last_key(&self) -> Option<&[u8]> {
        self.leaves.iter().rev().find_map(Leaf::last_key)
    }

    /// Closest key strictly greater than `key`.
    pub(crate) fn next_key(&self, key: &[u8]) -> Option<&[u8]> {
        let leaf_idx = self.leaf_for(key);
        for leaf in &self.leaves[leaf_idx..] {
            let slot = match leaf.slot_of(key) {
                Ok(slot) => slot + 1,
                Err(slot) => slot,
            };
            if let Some(entry) = leaf.entries.get(slot) {
                return Some(&entry.key);
            }
        }
        None
    }

    /// Closest key strictly less than `key`.
    pub(crate) fn prev_key(&self, key: &[u8]) -> Option<&[u8]> {
        let leaf_idx = self.leaf_for(key);
        for leaf in self.leaves[..=leaf_idx].iter().rev() {
            let slot = match leaf.slot_of(key) {
                Ok(slot) | Err(slot) => slot,
            };
            if slot > 0 {
                if let Some(entry) = leaf.entries.get(slot - 1) {
                    return Some(&entry.key);
                }
            }
        }
        None
    }

    /// Full cursor move over the B-tree alone, used when transactions are
    /// disabled. Writes the landed key and record into the output buffers.
    pub(crate) fn cursor_move(
        &self,
        cursor: &mut BtreeCursor,
        key_out: Option<&mut Key>,
        record_out: Option<&mut Record>,
        flags: MoveFlags,
    ) -> DbResult<()> {
        let landed: Option<(Vec<u8>, usize)> = match flags.direction {
            MoveDirection::First => self.first_key().map(|k| (k.to_vec(), 0)),
            MoveDirection::Last => self.last_key().map(|k| {
                let dup = if flags.skip_duplicates {
                    0
                } else {
                    self.dup_count(k).saturating_sub(1) as usize
                };
                (k.to_vec(), dup)
            }),
            MoveDirection::Next => {
                let pos = cursor.pos().ok_or(DbError::CursorIsNil)?.clone();
                let within = !flags.skip_duplicates
                    && (pos.dup + 1) < self.dup_count(&pos.key) as usize;
                if within {
                    Some((pos.key, pos.dup + 1))
                } else if flags.only_duplicates {
                    None
                } else {
                    self.next_key(&pos.key).map(|k| (k.to_vec(), 0))
                }
            }
            MoveDirection::Previous => {
                let pos = cursor.pos().ok_or(DbError::CursorIsNil)?.clone();
                let within = !flags.skip_duplicates && pos.dup > 0;
                if within {
                    Some((pos.key, pos.dup - 1))
                } else if flags.only_duplicates {
                    None
                } else {
                    self.prev_key(&pos.key).map(|k| {
                        let dup = if flags.skip_duplicates {
                            0
                        } else {
                            self.dup_count(k).saturating_sub(1) as usize
                        };
                        (k.to_vec(), dup)
                    })
                }
            }
        };

        let Some((key, dup)) = landed else {
            cursor.set_nil();
            return Err(DbError::KeyNotFound);
        };

        if let Some(out) = key_out {
            out.assign(&key);
            out.set_approximate(false);
        }
        if let Some(out) = record_out {
            let data = self
                .record_at(&key, dup)
                .ok_or(DbError::KeyNotFound)?;
            out.assign(data);
        }
        cursor.couple_to(&key, dup);
        Ok(())
    }

    /// Number of keys, or of records when `distinct` is false.
    pub(crate) fn count(&self, distinct: bool) -> u64 {
        self.leaves
            .iter()
            .flat_map(|leaf| leaf.entries.iter())
            .map(|entry| {
                if distinct {
                    1
                } else {
                    entry.records.len() as u64
                }
            })
            .sum()
    }

    pub(crate) fn stats(&self) -> BtreeStats {
        BtreeStats {
            leaves: self.leaves.len(),
            keys: self.count(true),
            records: self.count(false),
        }
    }

    /// Address of the root leaf.
    pub(crate) fn root_addr(&self) -> PageAddr {
        self.leaves[0].addr
    }

    /// Estimated key capacity of one leaf.
    pub(crate) fn estimate_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Index of the leaf holding the cursor's key, with its slot.
    pub(crate) fn locate(&self, key: &[u8]) -> Option<(usize, usize)> {
        let leaf_idx = self.leaf_for(key);
        self.leaves[leaf_idx]
            .slot_of(key)
            .ok()
            .map(|slot| (leaf_idx, slot))
    }

    pub(crate) fn leaf(&self, leaf_idx: usize) -> &Leaf {
        &self.leaves[leaf_idx]
    }

    /// Couples the cursor to the first key of the leaf after `leaf_idx`.
    ///
    /// Returns the new leaf index, or `None` at the end of the tree.
    pub(crate) fn move_to_next_leaf(
        &self,
        cursor: &mut BtreeCursor,
        leaf_idx: usize,
    ) -> Option<usize> {
        let next = leaf_idx + 1;
        let leaf = self.leaves.get(next)?;
        let first = leaf.first_key()?;
        cursor.couple_to(first, 0);
        Some(next)
    }

    /// Verifies leaf ordering and slot consistency.
    pub(crate) fn check_integrity(&self) -> DbResult<()> {
        let mut previous: Option<&[u8]> = None;
        for (leaf_idx, leaf) in self.leaves.iter().enumerate() {
            if leaf.entries.is_empty() && self.leaves.len() > 1 {
                return Err(DbError::corruption(format!(
                    "empty non-root leaf {}",
                    leaf.addr
                )));
            }
            if leaf.entries.len() > self.leaf_capacity {
                return Err(DbError::corruption(format!(
                    "leaf {} exceeds capacity",
                    leaf.addr
                )));
            }
            for entry in &leaf.entries {
                if entry.records.is_empty() {
                    return Err(DbError::corruption(format!(
                        "key without records in leaf {leaf_idx}"
                    )));
                }
                if let Some(prev) = previous {
                    if Self::compare_keys(prev, &entry.key) != Ordering::Less {
                        return Err(DbError::corruption(format!(
                            "keys out of order in leaf {leaf_idx}"
                        )));
                    }
                }
                previous = Some(&entry.key);
            }
        }
        Ok(())
    }

    /// Visits every key with `scan` semantics, leaf by leaf.
    pub(crate) fn scan_all(&self, visitor: &mut dyn ScanVisitor, distinct: bool) {
        for leaf in &self.leaves {
            leaf.scan(visitor, 0, distinct);
        }
    }
}

impl std::fmt::Debug for BtreeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("BtreeIndex")
            .field("db", &self.db)
            .field("leaves", &stats.leaves)
            .field("keys", &stats.keys)
            .finish_non_exhaustive()
    }
}
