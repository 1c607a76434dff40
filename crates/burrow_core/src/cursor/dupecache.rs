//! The materialised duplicate cache.

use crate::types::Lsn;

/// One entry of the duplicate cache: where the duplicate's record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DupeCacheLine {
    /// A B-tree duplicate, by 0-based ordinal.
    Btree(usize),
    /// An overlay operation, by LSN (the key is the cursor's current key).
    TxnOp(Lsn),
}

/// The ordered duplicate list of the cursor's current key.
///
/// Built on demand by merging the key's B-tree duplicates with its overlay
/// operations oldest to newest; invalidated by any mutation that touches the
/// key.
#[derive(Debug, Clone, Default)]
pub(crate) struct DupeCache {
    lines: Vec<DupeCacheLine>,
}

impl DupeCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line at a 1-based duplicate index.
    pub(crate) fn get(&self, index: u32) -> Option<DupeCacheLine> {
        if index == 0 {
            return None;
        }
        self.lines.get(index as usize - 1).copied()
    }

    pub(crate) fn first(&self) -> Option<DupeCacheLine> {
        self.lines.first().copied()
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    pub(crate) fn push(&mut self, line: DupeCacheLine) {
        self.lines.push(line);
    }

    /// Inserts `line` at a 0-based position, clamped to the end.
    pub(crate) fn insert_at(&mut self, at: usize, line: DupeCacheLine) {
        let at = at.min(self.lines.len());
        self.lines.insert(at, line);
    }

    /// Removes the line at a 0-based position, if present.
    pub(crate) fn remove_at(&mut self, at: usize) {
        if at < self.lines.len() {
            self.lines.remove(at);
        }
    }

    /// Replaces the line at a 0-based position; appends when out of range.
    pub(crate) fn replace_at(&mut self, at: usize, line: DupeCacheLine) {
        if let Some(slot) = self.lines.get_mut(at) {
            *slot = line;
        } else {
            self.lines.push(line);
        }
    }

    /// 1-based position of the line referencing the overlay op `lsn`.
    pub(crate) fn position_of_op(&self, lsn: Lsn) -> Option<u32> {
        self.lines
            .iter()
            .position(|line| *line == DupeCacheLine::TxnOp(lsn))
            .map(|idx| idx as u32 + 1)
    }
}
