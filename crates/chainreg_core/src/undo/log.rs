//! Durable undo log writer and reader.

use crate::error::{RegistryError, RegistryResult};
use crate::undo::record::{crc32, UndoRecord, UndoRecordType, UNDO_MAGIC, UNDO_VERSION};
use chainreg_storage::StorageBackend;
use parking_lot::Mutex;

/// Envelope size preceding the payload.
/// magic (4) + version (2) + type (1) + length (4) = 11 bytes
const HEADER_SIZE: usize = 11;

/// CRC trailer size.
const CRC_SIZE: usize = 4;

/// The durable undo log shared between the registry manager and the
/// transaction it issues.
///
/// Appends are flushed before returning so that the triggering store write
/// can only proceed once its before-image is durable. Entries are read back
/// in append order by [`UndoLog::entries`] and discarded by
/// [`UndoLog::clear`] after a terminal transaction outcome.
pub struct UndoLog {
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl UndoLog {
    /// Creates an undo log over the given backing store.
    ///
    /// Records already present in the backend (from a previous run) remain
    /// readable; this is what makes rollback of an interrupted block
    /// possible after a restart.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Appends one undo record and flushes it to durable storage.
    ///
    /// Returns the offset the record was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backing store fails. The caller
    /// must not issue the corresponding store write in that case.
    pub fn append(&self, record: &UndoRecord) -> RegistryResult<u64> {
        let payload = record.encode_payload()?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&UNDO_MAGIC);
        data.extend_from_slice(&UNDO_VERSION.to_le_bytes());
        data.push(record.record_type().as_byte());
        let len = u32::try_from(payload.len())
            .map_err(|_| RegistryError::invalid_operation("undo record payload too large"))?;
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        backend.flush()?;
        Ok(offset)
    }

    /// Reads back all records since the last clear, in append order.
    ///
    /// A truncated record at the tail is treated as a clean end of log;
    /// any other framing violation is [`RegistryError::UndoCorruption`].
    pub fn entries(&self) -> RegistryResult<Vec<UndoRecord>> {
        let backend = self.backend.lock();
        let size = backend.size()?;

        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset + (HEADER_SIZE as u64) <= size {
            let header = backend.read_at(offset, HEADER_SIZE)?;

            if header[0..4] != UNDO_MAGIC {
                return Err(RegistryError::undo_corruption(format!(
                    "bad magic at offset {offset}"
                )));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != UNDO_VERSION {
                return Err(RegistryError::undo_corruption(format!(
                    "unsupported version {version} at offset {offset}"
                )));
            }
            let record_type = UndoRecordType::from_byte(header[6]).ok_or_else(|| {
                RegistryError::undo_corruption(format!(
                    "unknown record type {} at offset {offset}",
                    header[6]
                ))
            })?;
            let payload_len =
                u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

            let total = (HEADER_SIZE + payload_len + CRC_SIZE) as u64;
            if offset + total > size {
                // Crash mid-append before the flush completed; the partial
                // record was never acknowledged, so stop here.
                break;
            }

            let framed = backend.read_at(offset, HEADER_SIZE + payload_len)?;
            let crc_bytes = backend.read_at(offset + (HEADER_SIZE + payload_len) as u64, CRC_SIZE)?;
            let stored_crc =
                u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let computed_crc = crc32(&framed);
            if stored_crc != computed_crc {
                return Err(RegistryError::undo_corruption(format!(
                    "checksum mismatch at offset {offset}: expected {stored_crc:08x}, got {computed_crc:08x}"
                )));
            }

            let record = UndoRecord::decode_payload(record_type, &framed[HEADER_SIZE..])?;
            records.push(record);
            offset += total;
        }

        Ok(records)
    }

    /// Returns true if no records are recorded.
    pub fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.backend.lock().size()? == 0)
    }

    /// Discards all records after a terminal transaction outcome.
    pub fn clear(&self) -> RegistryResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for UndoLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EcosystemId, RowKey};
    use chainreg_storage::{FileBackend, InMemoryBackend};

    fn sample_records() -> Vec<UndoRecord> {
        vec![
            UndoRecord::MetadataRow {
                key: RowKey::new(EcosystemId::new(1), "members", b"1".to_vec()),
                before: None,
            },
            UndoRecord::BlockKey {
                key: b"k1".to_vec(),
                before: Some(b"v1".to_vec()),
            },
            UndoRecord::MetadataRow {
                key: RowKey::new(EcosystemId::new(2), "pages", b"7".to_vec()),
                before: Some(b"home".to_vec()),
            },
        ]
    }

    #[test]
    fn empty_log_has_no_entries() {
        let log = UndoLog::new(Box::new(InMemoryBackend::new()));
        assert!(log.is_empty().unwrap());
        assert!(log.entries().unwrap().is_empty());
    }

    #[test]
    fn entries_preserve_append_order() {
        let log = UndoLog::new(Box::new(InMemoryBackend::new()));
        let records = sample_records();
        for record in &records {
            log.append(record).unwrap();
        }
        assert_eq!(log.entries().unwrap(), records);
    }

    #[test]
    fn clear_discards_entries() {
        let log = UndoLog::new(Box::new(InMemoryBackend::new()));
        for record in sample_records() {
            log.append(&record).unwrap();
        }
        log.clear().unwrap();
        assert!(log.is_empty().unwrap());
        assert!(log.entries().unwrap().is_empty());
    }

    #[test]
    fn truncated_tail_is_tolerated() {
        let records = sample_records();
        let log = UndoLog::new(Box::new(InMemoryBackend::new()));
        for record in &records {
            log.append(record).unwrap();
        }
        let bytes = {
            let backend = log.backend.lock();
            let size = backend.size().unwrap();
            backend.read_at(0, size as usize).unwrap()
        };

        // Chop a few bytes off the last record, as a crash mid-append would.
        let truncated = InMemoryBackend::with_bytes(bytes[..bytes.len() - 3].to_vec());
        let log = UndoLog::new(Box::new(truncated));

        let recovered = log.entries().unwrap();
        assert_eq!(recovered.as_slice(), &records[..2]);
    }

    #[test]
    fn flipped_bit_is_corruption() {
        let log = UndoLog::new(Box::new(InMemoryBackend::new()));
        for record in sample_records() {
            log.append(&record).unwrap();
        }
        let mut bytes = {
            let backend = log.backend.lock();
            let size = backend.size().unwrap();
            backend.read_at(0, size as usize).unwrap()
        };
        // Flip one bit inside the first record's payload.
        bytes[HEADER_SIZE + 2] ^= 0x01;

        let log = UndoLog::new(Box::new(InMemoryBackend::with_bytes(bytes)));
        assert!(matches!(
            log.entries(),
            Err(RegistryError::UndoCorruption { .. })
        ));
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("undo.log");
        let records = sample_records();

        {
            let log = UndoLog::new(Box::new(FileBackend::open(&path).unwrap()));
            for record in &records {
                log.append(record).unwrap();
            }
        }

        let log = UndoLog::new(Box::new(FileBackend::open(&path).unwrap()));
        assert_eq!(log.entries().unwrap(), records);
    }
}
