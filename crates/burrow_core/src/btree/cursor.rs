//! B-tree cursor.

/// Position within the B-tree, expressed as a key plus a duplicate ordinal.
///
/// The position is held in uncoupled form (a key copy rather than a page
/// slot), so it stays valid across leaf splits and merges; the index resolves
/// it to a slot on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BtreePos {
    pub key: Vec<u8>,
    /// 0-based duplicate ordinal.
    pub dup: usize,
}

/// A cursor over the B-tree side of a database.
#[derive(Debug, Clone, Default)]
pub(crate) struct BtreeCursor {
    pos: Option<BtreePos>,
}

impl BtreeCursor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_nil(&self) -> bool {
        self.pos.is_none()
    }

    pub(crate) fn set_nil(&mut self) {
        self.pos = None;
    }

    pub(crate) fn couple_to(&mut self, key: &[u8], dup: usize) {
        self.pos = Some(BtreePos {
            key: key.to_vec(),
            dup,
        });
    }

    pub(crate) fn pos(&self) -> Option<&BtreePos> {
        self.pos.as_ref()
    }

    pub(crate) fn current_key(&self) -> Option<&[u8]> {
        self.pos.as_ref().map(|p| p.key.as_slice())
    }

    pub(crate) fn dup(&self) -> usize {
        self.pos.as_ref().map_or(0, |p| p.dup)
    }

    pub(crate) fn points_to(&self, key: &[u8]) -> bool {
        self.current_key() == Some(key)
    }

    /// Copies another cursor's position, as when a flushed operation hands
    /// its B-tree slot to every coupled cursor.
    pub(crate) fn clone_from_cursor(&mut self, other: &BtreeCursor) {
        self.pos = other.pos.clone();
    }
}
