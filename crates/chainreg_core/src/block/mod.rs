//! Blockchain registry: the embedded key-value store holding raw
//! block/ledger data.
//!
//! Same contract as the metadata registry, adapted to key/value semantics.

mod memory;
mod transaction;

pub use memory::MemoryBlockStore;
pub use transaction::BlockTransaction;

use crate::error::StoreError;

/// An embedded key-value store driver.
pub trait BlockStore: Send + Sync {
    /// Opens a native transaction. The returned handle is single-use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or rejects the begin.
    fn begin(&self) -> Result<Box<dyn BlockStoreTx>, StoreError>;

    /// Reads one committed value by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn value(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

/// A native key-value store transaction with atomic batched writes.
///
/// Handles are single-use; drop discards staged writes. Reads through the
/// handle see this transaction's own staged writes first.
pub trait BlockStoreTx: Send {
    /// Reads a value as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stages a put.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    /// Stages a deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Finalizes the transaction, applying all staged writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the commit. The handle is
    /// consumed either way.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
