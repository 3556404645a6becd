//! Blockchain registry transaction adapter.

use crate::block::BlockStoreTx;
use crate::error::{RegistryError, RegistryResult};
use crate::undo::{UndoLog, UndoRecord};
use std::sync::Arc;

/// Wraps a native key-value transaction and binds it to the shared undo log:
/// every write through this handle appends its before-image, durably, before
/// the write is staged.
pub struct BlockTransaction {
    native: Option<Box<dyn BlockStoreTx>>,
    undo: Arc<UndoLog>,
}

impl BlockTransaction {
    pub(crate) fn new(native: Box<dyn BlockStoreTx>, undo: Arc<UndoLog>) -> Self {
        Self {
            native: Some(native),
            undo,
        }
    }

    fn native(&self) -> RegistryResult<&dyn BlockStoreTx> {
        self.native
            .as_deref()
            .ok_or_else(|| RegistryError::invalid_operation("blockchain transaction finalized"))
    }

    fn native_mut(&mut self) -> RegistryResult<&mut Box<dyn BlockStoreTx>> {
        self.native
            .as_mut()
            .ok_or_else(|| RegistryError::invalid_operation("blockchain transaction finalized"))
    }

    /// Reads a value as seen by this transaction (staged writes first).
    pub fn get(&self, key: &[u8]) -> RegistryResult<Option<Vec<u8>>> {
        self.native()?.get(key).map_err(RegistryError::Blockchain)
    }

    /// Puts a key, logging its before-image first.
    ///
    /// If the undo append fails the write does not proceed.
    pub fn put(&mut self, key: &[u8], value: Vec<u8>) -> RegistryResult<()> {
        let before = self.native()?.get(key).map_err(RegistryError::Blockchain)?;
        self.undo.append(&UndoRecord::BlockKey {
            key: key.to_vec(),
            before,
        })?;
        self.native_mut()?
            .put(key, value)
            .map_err(RegistryError::Blockchain)
    }

    /// Deletes a key, logging its before-image first.
    pub fn delete(&mut self, key: &[u8]) -> RegistryResult<()> {
        let before = self.native()?.get(key).map_err(RegistryError::Blockchain)?;
        self.undo.append(&UndoRecord::BlockKey {
            key: key.to_vec(),
            before,
        })?;
        self.native_mut()?
            .delete(key)
            .map_err(RegistryError::Blockchain)
    }

    /// Restores one before-image during rollback replay: the prior value,
    /// or a deletion if the before-image is a tombstone.
    ///
    /// Bypasses undo logging: replay must not feed the log it is draining.
    pub(crate) fn apply(&mut self, key: &[u8], before: Option<&[u8]>) -> RegistryResult<()> {
        let native = self.native_mut()?;
        match before {
            Some(value) => native.put(key, value.to_vec()),
            None => native.delete(key),
        }
        .map_err(RegistryError::Blockchain)
    }

    /// Finalizes the native transaction. The handle is single-use.
    pub(crate) fn commit(&mut self) -> RegistryResult<()> {
        let native = self
            .native
            .take()
            .ok_or_else(|| RegistryError::invalid_operation("blockchain transaction finalized"))?;
        native.commit().map_err(RegistryError::Blockchain)
    }

    /// Discards the native handle without committing.
    pub(crate) fn discard(&mut self) {
        self.native = None;
    }
}

impl std::fmt::Debug for BlockTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTransaction")
            .field("finalized", &self.native.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockStore, MemoryBlockStore};
    use chainreg_storage::InMemoryBackend;

    fn setup() -> (MemoryBlockStore, Arc<UndoLog>) {
        (
            MemoryBlockStore::new(),
            Arc::new(UndoLog::new(Box::new(InMemoryBackend::new()))),
        )
    }

    #[test]
    fn put_logs_tombstone_for_absent_key() {
        let (store, undo) = setup();
        let mut tx = BlockTransaction::new(store.begin().unwrap(), Arc::clone(&undo));

        tx.put(b"k1", b"v1".to_vec()).unwrap();

        assert_eq!(
            undo.entries().unwrap(),
            vec![UndoRecord::BlockKey {
                key: b"k1".to_vec(),
                before: None,
            }]
        );
    }

    #[test]
    fn delete_logs_previous_value() {
        let (store, undo) = setup();
        {
            let mut native = store.begin().unwrap();
            native.put(b"k1", b"v1".to_vec()).unwrap();
            native.commit().unwrap();
        }

        let mut tx = BlockTransaction::new(store.begin().unwrap(), Arc::clone(&undo));
        tx.delete(b"k1").unwrap();

        assert_eq!(
            undo.entries().unwrap(),
            vec![UndoRecord::BlockKey {
                key: b"k1".to_vec(),
                before: Some(b"v1".to_vec()),
            }]
        );
    }

    #[test]
    fn apply_does_not_log() {
        let (store, undo) = setup();
        let mut tx = BlockTransaction::new(store.begin().unwrap(), Arc::clone(&undo));

        tx.apply(b"k1", Some(b"v1")).unwrap();
        tx.apply(b"k1", None).unwrap();

        assert!(undo.entries().unwrap().is_empty());
    }

    #[test]
    fn write_after_commit_is_invalid_operation() {
        let (store, undo) = setup();
        let mut tx = BlockTransaction::new(store.begin().unwrap(), undo);
        tx.commit().unwrap();

        let result = tx.put(b"k1", b"v1".to_vec());
        assert!(matches!(
            result,
            Err(RegistryError::InvalidOperation { .. })
        ));
    }
}
