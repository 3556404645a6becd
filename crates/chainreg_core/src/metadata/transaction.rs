//! Metadata registry transaction adapter.

use crate::error::{RegistryError, RegistryResult};
use crate::metadata::MetadataStoreTx;
use crate::types::RowKey;
use crate::undo::{UndoLog, UndoRecord};
use std::sync::Arc;

/// Wraps a native metadata transaction and binds it to the shared undo log:
/// every write through this handle appends its before-image, durably, before
/// the write is staged.
pub struct MetadataTransaction {
    native: Option<Box<dyn MetadataStoreTx>>,
    undo: Arc<UndoLog>,
}

impl MetadataTransaction {
    pub(crate) fn new(native: Box<dyn MetadataStoreTx>, undo: Arc<UndoLog>) -> Self {
        Self {
            native: Some(native),
            undo,
        }
    }

    fn native(&self) -> RegistryResult<&dyn MetadataStoreTx> {
        self.native
            .as_deref()
            .ok_or_else(|| RegistryError::invalid_operation("metadata transaction finalized"))
    }

    fn native_mut(&mut self) -> RegistryResult<&mut Box<dyn MetadataStoreTx>> {
        self.native
            .as_mut()
            .ok_or_else(|| RegistryError::invalid_operation("metadata transaction finalized"))
    }

    /// Reads a row as seen by this transaction (staged writes first).
    pub fn get(&self, key: &RowKey) -> RegistryResult<Option<Vec<u8>>> {
        self.native()?.get(key).map_err(RegistryError::Metadata)
    }

    /// Inserts or updates a row, logging its before-image first.
    ///
    /// If the undo append fails the write does not proceed; rollback must
    /// never be left without a before-image for an applied write.
    pub fn upsert(&mut self, key: &RowKey, row: Vec<u8>) -> RegistryResult<()> {
        let before = self.native()?.get(key).map_err(RegistryError::Metadata)?;
        self.undo.append(&UndoRecord::MetadataRow {
            key: key.clone(),
            before,
        })?;
        self.native_mut()?
            .upsert(key, row)
            .map_err(RegistryError::Metadata)
    }

    /// Deletes a row, logging its before-image first.
    pub fn delete(&mut self, key: &RowKey) -> RegistryResult<()> {
        let before = self.native()?.get(key).map_err(RegistryError::Metadata)?;
        self.undo.append(&UndoRecord::MetadataRow {
            key: key.clone(),
            before,
        })?;
        self.native_mut()?
            .delete(key)
            .map_err(RegistryError::Metadata)
    }

    /// Restores one before-image during rollback replay.
    ///
    /// Bypasses undo logging: replay must not feed the log it is draining.
    pub(crate) fn apply(&mut self, key: &RowKey, before: Option<&[u8]>) -> RegistryResult<()> {
        let native = self.native_mut()?;
        match before {
            Some(row) => native.upsert(key, row.to_vec()),
            None => native.delete(key),
        }
        .map_err(RegistryError::Metadata)
    }

    /// Finalizes the native transaction. The handle is single-use.
    pub(crate) fn commit(&mut self) -> RegistryResult<()> {
        let native = self
            .native
            .take()
            .ok_or_else(|| RegistryError::invalid_operation("metadata transaction finalized"))?;
        native.commit().map_err(RegistryError::Metadata)
    }

    /// Discards the native handle without committing.
    pub(crate) fn discard(&mut self) {
        self.native = None;
    }
}

impl std::fmt::Debug for MetadataTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataTransaction")
            .field("finalized", &self.native.is_none())
            .finish_non_exhaustive()
    }
}
