//! Core type definitions.

use std::fmt;

/// Key size of a database whose keys have no fixed width.
pub const KEY_SIZE_UNLIMITED: usize = usize::MAX;

/// Record size of a database whose records have no fixed width.
pub const RECORD_SIZE_UNLIMITED: usize = usize::MAX;

/// Log sequence number.
///
/// LSNs are issued by the environment's monotonic counter and totally order
/// all overlay operations. Within one key's operation list they strictly
/// increase from oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Creates an LSN from its raw value.
    #[must_use]
    pub const fn new(lsn: u64) -> Self {
        Self(lsn)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lsn:{}", self.0)
    }
}

/// Unique identifier for a transaction.
///
/// Transaction ids are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Creates a transaction id from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Address of a B-tree leaf page, issued by the page manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageAddr(pub u64);

impl fmt::Display for PageAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Key type of a database, fixed at creation.
///
/// Fixed-width types pin the key size. Numeric keys are encoded big-endian
/// in the key buffer, so the lexicographic byte order used throughout the
/// core equals numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Variable- or fixed-size byte-string keys.
    #[default]
    Binary,
    /// Unsigned 8-bit keys.
    UInt8,
    /// Unsigned 16-bit keys.
    UInt16,
    /// Unsigned 32-bit keys.
    UInt32,
    /// Unsigned 64-bit keys.
    UInt64,
    /// 32-bit float keys.
    Real32,
    /// 64-bit float keys.
    Real64,
    /// Auto-incrementing 32-bit record-number keys.
    RecordNumber32,
    /// Auto-incrementing 64-bit record-number keys.
    RecordNumber64,
}

impl KeyType {
    /// Returns the fixed key width in bytes, or `None` for binary keys.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Binary => None,
            Self::UInt8 => Some(1),
            Self::UInt16 => Some(2),
            Self::UInt32 | Self::Real32 | Self::RecordNumber32 => Some(4),
            Self::UInt64 | Self::Real64 | Self::RecordNumber64 => Some(8),
        }
    }

    /// Returns `true` for the auto-incrementing record-number types.
    #[must_use]
    pub const fn is_record_number(self) -> bool {
        matches!(self, Self::RecordNumber32 | Self::RecordNumber64)
    }

    /// Stable numeric tag reported through `get_parameters`.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        match self {
            Self::Binary => 0,
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 => 3,
            Self::UInt64 => 4,
            Self::Real32 => 5,
            Self::Real64 => 6,
            Self::RecordNumber32 => 7,
            Self::RecordNumber64 => 8,
        }
    }
}

/// Position of a newly inserted duplicate relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupePosition {
    /// Insert before the duplicate the cursor is positioned on.
    Before,
    /// Insert after the duplicate the cursor is positioned on.
    After,
    /// Insert as the first duplicate of the key.
    First,
    /// Insert as the last duplicate of the key (the default).
    Last,
}

/// Caller flags for insert operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertFlags {
    /// Overwrite the record when the key already exists.
    pub overwrite: bool,
    /// Add the record as a duplicate when the key already exists.
    pub duplicate: bool,
    /// Hint that the key sorts after every existing key.
    pub hint_append: bool,
    /// Placement of a new duplicate; `None` means [`DupePosition::Last`].
    pub dup_position: Option<DupePosition>,
}

impl InsertFlags {
    /// Creates empty insert flags.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            overwrite: false,
            duplicate: false,
            hint_append: false,
            dup_position: None,
        }
    }

    /// Enables overwrite.
    #[must_use]
    pub const fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Enables duplicate insertion.
    #[must_use]
    pub const fn duplicate(mut self) -> Self {
        self.duplicate = true;
        self
    }

    /// Sets the append hint.
    #[must_use]
    pub const fn hint_append(mut self) -> Self {
        self.hint_append = true;
        self
    }

    /// Sets the duplicate placement (implies duplicate insertion).
    #[must_use]
    pub const fn dup_position(mut self, position: DupePosition) -> Self {
        self.duplicate = true;
        self.dup_position = Some(position);
        self
    }
}

/// Caller flags for find operations.
///
/// `lt` and `gt` request approximate matches; combined with `exact` they
/// express "less/greater than or equal".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindFlags {
    /// Accept the exact key.
    pub exact: bool,
    /// Accept the nearest key strictly less than the requested key.
    pub lt: bool,
    /// Accept the nearest key strictly greater than the requested key.
    pub gt: bool,
}

impl FindFlags {
    /// Exact match only (the default for plain lookups).
    #[must_use]
    pub const fn exact() -> Self {
        Self {
            exact: true,
            lt: false,
            gt: false,
        }
    }

    /// Nearest key strictly less than the requested key.
    #[must_use]
    pub const fn lt() -> Self {
        Self {
            exact: false,
            lt: true,
            gt: false,
        }
    }

    /// Nearest key strictly greater than the requested key.
    #[must_use]
    pub const fn gt() -> Self {
        Self {
            exact: false,
            lt: false,
            gt: true,
        }
    }

    /// Exact key, or the nearest smaller one.
    #[must_use]
    pub const fn leq() -> Self {
        Self {
            exact: true,
            lt: true,
            gt: false,
        }
    }

    /// Exact key, or the nearest greater one.
    #[must_use]
    pub const fn geq() -> Self {
        Self {
            exact: true,
            lt: false,
            gt: true,
        }
    }

    /// Returns `true` when an approximate match is acceptable.
    #[must_use]
    pub const fn is_approximate(self) -> bool {
        self.lt || self.gt
    }
}

/// Direction of a cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Move to the first key.
    First,
    /// Move to the last key.
    Last,
    /// Move to the next position.
    Next,
    /// Move to the previous position.
    Previous,
}

/// Caller flags for cursor moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveFlags {
    /// Direction of the move.
    pub direction: MoveDirection,
    /// Visit each key once, skipping its remaining duplicates.
    pub skip_duplicates: bool,
    /// Stay within the current key's duplicate set.
    pub only_duplicates: bool,
}

impl MoveFlags {
    /// Move to the first key.
    #[must_use]
    pub const fn first() -> Self {
        Self::with_direction(MoveDirection::First)
    }

    /// Move to the last key.
    #[must_use]
    pub const fn last() -> Self {
        Self::with_direction(MoveDirection::Last)
    }

    /// Move to the next position.
    #[must_use]
    pub const fn next() -> Self {
        Self::with_direction(MoveDirection::Next)
    }

    /// Move to the previous position.
    #[must_use]
    pub const fn previous() -> Self {
        Self::with_direction(MoveDirection::Previous)
    }

    /// Visit each key once, skipping duplicates.
    #[must_use]
    pub const fn skip_duplicates(mut self) -> Self {
        self.skip_duplicates = true;
        self
    }

    /// Stay within the current key's duplicate set.
    #[must_use]
    pub const fn only_duplicates(mut self) -> Self {
        self.only_duplicates = true;
        self
    }

    const fn with_direction(direction: MoveDirection) -> Self {
        Self {
            direction,
            skip_duplicates: false,
            only_duplicates: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsn_ordering() {
        assert!(Lsn::new(1) < Lsn::new(2));
        assert_eq!(format!("{}", Lsn::new(7)), "lsn:7");
    }

    #[test]
    fn key_type_sizes() {
        assert_eq!(KeyType::Binary.fixed_size(), None);
        assert_eq!(KeyType::UInt16.fixed_size(), Some(2));
        assert_eq!(KeyType::Real64.fixed_size(), Some(8));
        assert_eq!(KeyType::RecordNumber32.fixed_size(), Some(4));
        assert!(KeyType::RecordNumber64.is_record_number());
        assert!(!KeyType::UInt64.is_record_number());
    }

    #[test]
    fn insert_flag_builders() {
        let flags = InsertFlags::new().overwrite().hint_append();
        assert!(flags.overwrite && flags.hint_append && !flags.duplicate);

        let flags = InsertFlags::new().dup_position(DupePosition::First);
        assert!(flags.duplicate);
        assert_eq!(flags.dup_position, Some(DupePosition::First));
    }

    #[test]
    fn find_flag_combinations() {
        assert!(!FindFlags::exact().is_approximate());
        assert!(FindFlags::leq().is_approximate());
        assert!(FindFlags::leq().exact);
        assert!(FindFlags::gt().gt && !FindFlags::gt().exact);
    }
}
