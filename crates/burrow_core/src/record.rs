//! Key and record buffers.

use std::fmt;

/// A key passed into and out of database operations.
///
/// The buffer is caller-owned and reused across calls: when an operation
/// rewrites the key (approximate matches, record-number auto-assignment) it
/// writes into the existing allocation. The `approximate` tag is set when the
/// returned key is a nearest match rather than the requested one.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Key {
    data: Vec<u8>,
    approximate: bool,
}

impl Key {
    /// Creates an empty key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key from bytes.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            approximate: false,
        }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the key size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the key holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replaces the key bytes, reusing the allocation.
    pub fn assign(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
    }

    /// Returns `true` when the key is a nearest match, not the requested key.
    #[must_use]
    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    /// Sets or clears the approximate-match tag.
    pub fn set_approximate(&mut self, approximate: bool) {
        self.approximate = approximate;
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("data", &self.data)
            .field("approximate", &self.approximate)
            .finish()
    }
}

impl From<&[u8]> for Key {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(data: &[u8; N]) -> Self {
        Self::from_slice(data)
    }
}

/// A record payload.
///
/// Like [`Key`], the buffer is caller-owned; reads write the result into the
/// existing allocation, which stays valid until the next call that reuses it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from bytes.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Returns the record bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the record size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the record holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replaces the record bytes, reusing the allocation.
    pub fn assign(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({} bytes)", self.data.len())
    }
}

impl From<&[u8]> for Record {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl<const N: usize> From<&[u8; N]> for Record {
    fn from(data: &[u8; N]) -> Self {
        Self::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_assign_reuses_buffer() {
        let mut key = Key::from_slice(b"alpha");
        key.assign(b"be");
        assert_eq!(key.as_slice(), b"be");
        assert_eq!(key.len(), 2);
    }

    #[test]
    fn approximate_tag() {
        let mut key = Key::from_slice(b"k");
        assert!(!key.is_approximate());
        key.set_approximate(true);
        assert!(key.is_approximate());
    }

    #[test]
    fn record_round_trip() {
        let mut record = Record::new();
        record.assign(b"payload");
        assert_eq!(record.as_slice(), b"payload");
        assert!(!record.is_empty());
    }
}
