//! Undo record types and serialization.

use crate::error::{RegistryError, RegistryResult};
use crate::types::{EcosystemId, RowKey};

/// Magic bytes identifying an undo record.
pub const UNDO_MAGIC: [u8; 4] = *b"CRUL";

/// Current undo record format version.
pub const UNDO_VERSION: u16 = 1;

/// Backend tag of an undo record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UndoRecordType {
    /// Before-image of a metadata registry row.
    MetadataRow = 1,
    /// Before-image of a blockchain registry key.
    BlockKey = 2,
}

impl UndoRecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::MetadataRow),
            2 => Some(Self::BlockKey),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One undo entry: enough "before" state to reverse one logical write.
///
/// The enum is exhaustive over backends; rollback replay matches on it, so a
/// new backend variant cannot be added without defining its replay path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoRecord {
    /// Prior state of one metadata row. `before: None` is a tombstone: the
    /// row did not exist before the write.
    MetadataRow {
        /// The row that was written.
        key: RowKey,
        /// Previous row image, or `None` if the row was absent.
        before: Option<Vec<u8>>,
    },
    /// Prior state of one blockchain store key. `before: None` is a
    /// tombstone: the key was absent before the write.
    BlockKey {
        /// The key that was written.
        key: Vec<u8>,
        /// Previous value, or `None` if the key was absent.
        before: Option<Vec<u8>>,
    },
}

impl UndoRecord {
    /// Returns the backend tag of this record.
    #[must_use]
    pub fn record_type(&self) -> UndoRecordType {
        match self {
            Self::MetadataRow { .. } => UndoRecordType::MetadataRow,
            Self::BlockKey { .. } => UndoRecordType::BlockKey,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a table name or key exceeds the format's length
    /// fields.
    pub fn encode_payload(&self) -> RegistryResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::MetadataRow { key, before } => {
                buf.extend_from_slice(&key.ecosystem.as_i64().to_le_bytes());

                let table = key.table.as_bytes();
                let table_len = u16::try_from(table.len()).map_err(|_| {
                    RegistryError::invalid_operation("table name exceeds 64 KiB")
                })?;
                buf.extend_from_slice(&table_len.to_le_bytes());
                buf.extend_from_slice(table);

                write_bytes(&mut buf, &key.pk)?;
                write_before(&mut buf, before.as_deref())?;
            }

            Self::BlockKey { key, before } => {
                write_bytes(&mut buf, key)?;
                write_before(&mut buf, before.as_deref())?;
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UndoCorruption`] if the payload is malformed.
    pub fn decode_payload(record_type: UndoRecordType, payload: &[u8]) -> RegistryResult<Self> {
        let mut cursor = 0usize;

        let record = match record_type {
            UndoRecordType::MetadataRow => {
                let ecosystem = EcosystemId::new(read_i64(payload, &mut cursor)?);
                let table_len = read_u16(payload, &mut cursor)? as usize;
                let table_bytes = read_slice(payload, &mut cursor, table_len)?;
                let table = std::str::from_utf8(table_bytes)
                    .map_err(|_| RegistryError::undo_corruption("table name is not UTF-8"))?
                    .to_owned();
                let pk = read_bytes(payload, &mut cursor)?;
                let before = read_before(payload, &mut cursor)?;
                Self::MetadataRow {
                    key: RowKey {
                        ecosystem,
                        table,
                        pk,
                    },
                    before,
                }
            }

            UndoRecordType::BlockKey => {
                let key = read_bytes(payload, &mut cursor)?;
                let before = read_before(payload, &mut cursor)?;
                Self::BlockKey { key, before }
            }
        };

        if cursor != payload.len() {
            return Err(RegistryError::undo_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                cursor,
                payload.len()
            )));
        }

        Ok(record)
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> RegistryResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| RegistryError::invalid_operation("undo payload field exceeds 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

// before-image: 1 byte flag, then length-prefixed bytes when present.
// Flag 0 is a tombstone.
fn write_before(buf: &mut Vec<u8>, before: Option<&[u8]>) -> RegistryResult<()> {
    match before {
        Some(image) => {
            buf.push(1);
            write_bytes(buf, image)
        }
        None => {
            buf.push(0);
            Ok(())
        }
    }
}

fn read_slice<'a>(payload: &'a [u8], cursor: &mut usize, len: usize) -> RegistryResult<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| RegistryError::undo_corruption("field length overflow"))?;
    if end > payload.len() {
        return Err(RegistryError::undo_corruption("unexpected end of payload"));
    }
    let slice = &payload[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_i64(payload: &[u8], cursor: &mut usize) -> RegistryResult<i64> {
    let bytes: [u8; 8] = read_slice(payload, cursor, 8)?
        .try_into()
        .map_err(|_| RegistryError::undo_corruption("invalid i64"))?;
    Ok(i64::from_le_bytes(bytes))
}

fn read_u16(payload: &[u8], cursor: &mut usize) -> RegistryResult<u16> {
    let bytes: [u8; 2] = read_slice(payload, cursor, 2)?
        .try_into()
        .map_err(|_| RegistryError::undo_corruption("invalid u16"))?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32(payload: &[u8], cursor: &mut usize) -> RegistryResult<u32> {
    let bytes: [u8; 4] = read_slice(payload, cursor, 4)?
        .try_into()
        .map_err(|_| RegistryError::undo_corruption("invalid u32"))?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_bytes(payload: &[u8], cursor: &mut usize) -> RegistryResult<Vec<u8>> {
    let len = read_u32(payload, cursor)? as usize;
    Ok(read_slice(payload, cursor, len)?.to_vec())
}

fn read_before(payload: &[u8], cursor: &mut usize) -> RegistryResult<Option<Vec<u8>>> {
    let flag = read_slice(payload, cursor, 1)?[0];
    match flag {
        0 => Ok(None),
        1 => Ok(Some(read_bytes(payload, cursor)?)),
        other => Err(RegistryError::undo_corruption(format!(
            "invalid before-image flag: {other}"
        ))),
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members_key() -> RowKey {
        RowKey::new(EcosystemId::new(1), "members", b"42".to_vec())
    }

    #[test]
    fn record_type_roundtrip() {
        for t in [UndoRecordType::MetadataRow, UndoRecordType::BlockKey] {
            assert_eq!(UndoRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(UndoRecordType::from_byte(0), None);
        assert_eq!(UndoRecordType::from_byte(99), None);
    }

    #[test]
    fn metadata_row_roundtrip() {
        let record = UndoRecord::MetadataRow {
            key: members_key(),
            before: Some(b"alice".to_vec()),
        };
        let payload = record.encode_payload().unwrap();
        let decoded = UndoRecord::decode_payload(UndoRecordType::MetadataRow, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn metadata_row_tombstone_roundtrip() {
        let record = UndoRecord::MetadataRow {
            key: members_key(),
            before: None,
        };
        let payload = record.encode_payload().unwrap();
        let decoded = UndoRecord::decode_payload(UndoRecordType::MetadataRow, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn block_key_roundtrip() {
        let record = UndoRecord::BlockKey {
            key: b"k1".to_vec(),
            before: Some(b"v1".to_vec()),
        };
        let payload = record.encode_payload().unwrap();
        let decoded = UndoRecord::decode_payload(UndoRecordType::BlockKey, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let record = UndoRecord::BlockKey {
            key: b"k1".to_vec(),
            before: None,
        };
        let mut payload = record.encode_payload().unwrap();
        payload.push(0xFF);
        let result = UndoRecord::decode_payload(UndoRecordType::BlockKey, &payload);
        assert!(matches!(result, Err(RegistryError::UndoCorruption { .. })));
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let record = UndoRecord::MetadataRow {
            key: members_key(),
            before: Some(b"alice".to_vec()),
        };
        let payload = record.encode_payload().unwrap();
        let result =
            UndoRecord::decode_payload(UndoRecordType::MetadataRow, &payload[..payload.len() - 3]);
        assert!(matches!(result, Err(RegistryError::UndoCorruption { .. })));
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }
}
