//! Metadata registry: the relational store holding ecosystem-scoped tables
//! (members, keys, parameters, pages).
//!
//! The actual relational driver is a collaborator; this module defines the
//! trait it must satisfy and the transaction adapter that binds its native
//! transaction to the shared undo log.

mod memory;
mod transaction;

pub use memory::MemoryMetadataStore;
pub use transaction::MetadataTransaction;

use crate::error::StoreError;
use crate::types::RowKey;

/// A relational metadata store driver.
///
/// Offers a native begin and committed-state row reads. Metadata consumers
/// (per-table accessors such as member counts) use [`MetadataStore::row`];
/// block-time writes must go through the transaction handles issued by the
/// registry manager instead.
pub trait MetadataStore: Send + Sync {
    /// Opens a native transaction. The returned handle is single-use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or rejects the begin.
    fn begin(&self) -> Result<Box<dyn MetadataStoreTx>, StoreError>;

    /// Reads one committed row by table and primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn row(&self, key: &RowKey) -> Result<Option<Vec<u8>>, StoreError>;
}

/// A native metadata store transaction.
///
/// Handles are single-use: after `commit` (or drop, which discards staged
/// writes) the handle is gone. Reads through the handle see this
/// transaction's own staged writes first.
pub trait MetadataStoreTx: Send {
    /// Reads a row as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn get(&self, key: &RowKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stages an insert-or-update of a row.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn upsert(&mut self, key: &RowKey, row: Vec<u8>) -> Result<(), StoreError>;

    /// Stages a row deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn delete(&mut self, key: &RowKey) -> Result<(), StoreError>;

    /// Finalizes the transaction, applying all staged writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the commit (constraint
    /// violation, connection loss). The handle is consumed either way.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
