//! Undo log: the durable record of before-images used to reverse a
//! transaction's writes.
//!
//! Every mutation applied through a multi-store transaction first appends a
//! before-image here. The append is flushed before the triggering store
//! write is issued (undo-before-write discipline); otherwise rollback would
//! be unsound.
//!
//! ## Record format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Read policy
//!
//! - A truncated record at the tail (crash mid-append before flush) is
//!   treated as a clean end of log.
//! - A CRC mismatch, bad magic, unknown type or unsupported version is
//!   fatal: the log must not be replayed.

mod log;
mod record;

pub use log::UndoLog;
pub use record::{crc32, UndoRecord, UndoRecordType, UNDO_MAGIC, UNDO_VERSION};
