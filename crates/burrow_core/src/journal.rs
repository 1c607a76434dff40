//! Journal records and the journal writer/reader.
//!
//! When recovery and transactions are both enabled, every overlay mutation
//! appends an entry here before the operation returns. Entries carry a
//! magic/version envelope, a length prefix and a CRC-32 so a reader can
//! detect torn or corrupt tails. Replaying entries is recovery-log territory
//! and out of scope; the reader exists for inspection and tests.

use crate::error::{DbError, DbResult};
use crate::types::{DupePosition, InsertFlags, Lsn, TxnId};
use burrow_storage::Backend;
use parking_lot::Mutex;
use tracing::debug;

/// Magic bytes identifying a journal entry.
pub const JOURNAL_MAGIC: [u8; 4] = *b"BJRN";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Envelope size: magic (4) + version (2) + kind (1) + length (4).
const ENVELOPE_SIZE: usize = 11;

/// Trailing CRC size.
const CRC_SIZE: usize = 4;

/// CRC-32 (IEEE) over `data`.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = u32::MAX;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ byte as u32) & 0xff) as usize];
    }
    !crc
}

/// A single journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// An insert appended to the overlay.
    Insert {
        /// Database the key belongs to.
        db: u16,
        /// Transaction that performed the insert.
        txn: TxnId,
        /// Key bytes.
        key: Vec<u8>,
        /// Record bytes.
        record: Vec<u8>,
        /// Effective caller flags.
        flags: InsertFlags,
        /// LSN of the overlay operation.
        lsn: Lsn,
    },
    /// An erase appended to the overlay.
    Erase {
        /// Database the key belongs to.
        db: u16,
        /// Transaction that performed the erase.
        txn: TxnId,
        /// Key bytes.
        key: Vec<u8>,
        /// 1-based duplicate index, 0 = all duplicates.
        dupe: u32,
        /// LSN of the overlay operation.
        lsn: Lsn,
    },
}

impl JournalEntry {
    const KIND_INSERT: u8 = 1;
    const KIND_ERASE: u8 = 2;

    fn kind(&self) -> u8 {
        match self {
            Self::Insert { .. } => Self::KIND_INSERT,
            Self::Erase { .. } => Self::KIND_ERASE,
        }
    }

    /// Returns the entry's LSN.
    #[must_use]
    pub fn lsn(&self) -> Lsn {
        match self {
            Self::Insert { lsn, .. } | Self::Erase { lsn, .. } => *lsn,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Insert {
                db,
                txn,
                key,
                record,
                flags,
                lsn,
            } => {
                buf.extend_from_slice(&db.to_le_bytes());
                buf.extend_from_slice(&txn.as_u64().to_le_bytes());
                buf.extend_from_slice(&lsn.as_u64().to_le_bytes());
                buf.push(encode_insert_flags(*flags));
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(record.len() as u32).to_le_bytes());
                buf.extend_from_slice(record);
            }
            Self::Erase {
                db,
                txn,
                key,
                dupe,
                lsn,
            } => {
                buf.extend_from_slice(&db.to_le_bytes());
                buf.extend_from_slice(&txn.as_u64().to_le_bytes());
                buf.extend_from_slice(&lsn.as_u64().to_le_bytes());
                buf.extend_from_slice(&dupe.to_le_bytes());
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
        }
        buf
    }

    fn decode_payload(kind: u8, payload: &[u8]) -> DbResult<Self> {
        let mut reader = PayloadReader::new(payload);
        let db = reader.u16()?;
        let txn = TxnId::new(reader.u64()?);
        let lsn = Lsn::new(reader.u64()?);
        match kind {
            Self::KIND_INSERT => {
                let flags = decode_insert_flags(reader.u8()?)?;
                let key = reader.bytes()?;
                let record = reader.bytes()?;
                Ok(Self::Insert {
                    db,
                    txn,
                    key,
                    record,
                    flags,
                    lsn,
                })
            }
            Self::KIND_ERASE => {
                let dupe = reader.u32()?;
                let key = reader.bytes()?;
                Ok(Self::Erase {
                    db,
                    txn,
                    key,
                    dupe,
                    lsn,
                })
            }
            other => Err(DbError::corruption(format!(
                "unknown journal entry kind {other}"
            ))),
        }
    }
}

fn encode_insert_flags(flags: InsertFlags) -> u8 {
    let mut bits = 0u8;
    if flags.overwrite {
        bits |= 0x01;
    }
    if flags.duplicate {
        bits |= 0x02;
    }
    if flags.hint_append {
        bits |= 0x04;
    }
    bits |= match flags.dup_position {
        None => 0,
        Some(DupePosition::Before) => 1 << 4,
        Some(DupePosition::After) => 2 << 4,
        Some(DupePosition::First) => 3 << 4,
        Some(DupePosition::Last) => 4 << 4,
    };
    bits
}

fn decode_insert_flags(bits: u8) -> DbResult<InsertFlags> {
    let dup_position = match bits >> 4 {
        0 => None,
        1 => Some(DupePosition::Before),
        2 => Some(DupePosition::After),
        3 => Some(DupePosition::First),
        4 => Some(DupePosition::Last),
        other => {
            return Err(DbError::corruption(format!(
                "invalid duplicate position tag {other}"
            )))
        }
    };
    Ok(InsertFlags {
        overwrite: bits & 0x01 != 0,
        duplicate: bits & 0x02 != 0,
        hint_append: bits & 0x04 != 0,
        dup_position,
    })
}

struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> DbResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.data.len());
        let Some(end) = end else {
            return Err(DbError::corruption("truncated journal payload"));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> DbResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DbResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> DbResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> DbResult<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> DbResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Append-only journal over a storage backend.
pub struct Journal {
    backend: Mutex<Box<dyn Backend>>,
    sync_on_append: bool,
}

impl Journal {
    /// Creates a journal over `backend`.
    pub fn new(backend: Box<dyn Backend>, sync_on_append: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_append,
        }
    }

    /// Appends an insert entry.
    pub fn append_insert(
        &self,
        db: u16,
        txn: TxnId,
        key: &[u8],
        record: &[u8],
        flags: InsertFlags,
        lsn: Lsn,
    ) -> DbResult<()> {
        self.append(&JournalEntry::Insert {
            db,
            txn,
            key: key.to_vec(),
            record: record.to_vec(),
            flags,
            lsn,
        })
    }

    /// Appends an erase entry. `dupe` 0 erases all duplicates.
    pub fn append_erase(
        &self,
        db: u16,
        txn: TxnId,
        key: &[u8],
        dupe: u32,
        lsn: Lsn,
    ) -> DbResult<()> {
        self.append(&JournalEntry::Erase {
            db,
            txn,
            key: key.to_vec(),
            dupe,
            lsn,
        })
    }

    fn append(&self, entry: &JournalEntry) -> DbResult<()> {
        let payload = entry.encode_payload();
        let mut buf = Vec::with_capacity(ENVELOPE_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&JOURNAL_MAGIC);
        buf.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        buf.push(entry.kind());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&crc32(&payload).to_le_bytes());

        let mut backend = self.backend.lock();
        backend.append(&buf)?;
        if self.sync_on_append {
            backend.sync()?;
        }
        Ok(())
    }

    /// Reads all entries from the start of the journal.
    pub fn entries(&self) -> DbResult<Vec<JournalEntry>> {
        let backend = self.backend.lock();
        let size = backend.len()?;
        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset < size {
            let envelope = backend.read_at(offset, ENVELOPE_SIZE)?;
            if envelope[0..4] != JOURNAL_MAGIC {
                return Err(DbError::corruption("bad journal magic"));
            }
            let version = u16::from_le_bytes([envelope[4], envelope[5]]);
            if version != JOURNAL_VERSION {
                return Err(DbError::corruption(format!(
                    "unsupported journal version {version}"
                )));
            }
            let kind = envelope[6];
            let len = u32::from_le_bytes([envelope[7], envelope[8], envelope[9], envelope[10]])
                as usize;

            let payload = backend.read_at(offset + ENVELOPE_SIZE as u64, len)?;
            let crc_bytes = backend.read_at(offset + (ENVELOPE_SIZE + len) as u64, CRC_SIZE)?;
            let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let computed = crc32(&payload);
            if stored != computed {
                return Err(DbError::corruption(format!(
                    "journal checksum mismatch: expected {stored:08x}, got {computed:08x}"
                )));
            }

            entries.push(JournalEntry::decode_payload(kind, &payload)?);
            offset += (ENVELOPE_SIZE + len + CRC_SIZE) as u64;
        }

        Ok(entries)
    }

    /// Discards all entries.
    pub fn clear(&self) -> DbResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        debug!("journal truncated");
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_storage::MemoryBackend;

    fn journal() -> Journal {
        Journal::new(Box::new(MemoryBackend::new()), false)
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn insert_entry_round_trip() {
        let j = journal();
        let flags = InsertFlags::new().overwrite().hint_append();
        j.append_insert(1, TxnId::new(9), b"key", b"value", flags, Lsn::new(42))
            .unwrap();

        let entries = j.entries().unwrap();
        assert_eq!(
            entries,
            vec![JournalEntry::Insert {
                db: 1,
                txn: TxnId::new(9),
                key: b"key".to_vec(),
                record: b"value".to_vec(),
                flags,
                lsn: Lsn::new(42),
            }]
        );
    }

    #[test]
    fn erase_entry_round_trip() {
        let j = journal();
        j.append_erase(3, TxnId::new(2), b"gone", 0, Lsn::new(7))
            .unwrap();

        let entries = j.entries().unwrap();
        assert_eq!(
            entries,
            vec![JournalEntry::Erase {
                db: 3,
                txn: TxnId::new(2),
                key: b"gone".to_vec(),
                dupe: 0,
                lsn: Lsn::new(7),
            }]
        );
    }

    #[test]
    fn entries_preserve_append_order() {
        let j = journal();
        j.append_insert(1, TxnId::new(1), b"a", b"1", InsertFlags::new(), Lsn::new(1))
            .unwrap();
        j.append_erase(1, TxnId::new(1), b"a", 0, Lsn::new(2)).unwrap();

        let entries = j.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].lsn(), Lsn::new(1));
        assert_eq!(entries[1].lsn(), Lsn::new(2));
    }

    #[test]
    fn clear_discards_entries() {
        let j = journal();
        j.append_erase(1, TxnId::new(1), b"x", 1, Lsn::new(1)).unwrap();
        j.clear().unwrap();
        assert!(j.entries().unwrap().is_empty());
    }

    #[test]
    fn corrupt_payload_is_detected() {
        let backend = Box::new(MemoryBackend::new());
        let j = Journal::new(backend, false);
        j.append_insert(1, TxnId::new(1), b"k", b"v", InsertFlags::new(), Lsn::new(1))
            .unwrap();

        // flip a payload byte
        let bytes = {
            let mut backend = j.backend.lock();
            let size = backend.len().unwrap();
            let mut all = backend.read_at(0, size as usize).unwrap();
            all[ENVELOPE_SIZE + 2] ^= 0xff;
            backend.truncate(0).unwrap();
            backend.append(&all).unwrap();
            drop(backend);
            all
        };
        assert!(!bytes.is_empty());
        assert!(matches!(j.entries(), Err(DbError::Corruption { .. })));
    }

    #[test]
    fn dup_position_flag_round_trip() {
        for pos in [
            DupePosition::Before,
            DupePosition::After,
            DupePosition::First,
            DupePosition::Last,
        ] {
            let flags = InsertFlags::new().dup_position(pos);
            let decoded = decode_insert_flags(encode_insert_flags(flags)).unwrap();
            assert_eq!(decoded, flags);
        }
    }
}
