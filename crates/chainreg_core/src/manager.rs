//! Registry manager: the top-level coordinator for multi-store transactions.
//!
//! The manager owns the single "one transaction at a time" write lock and
//! sequences begin/commit/rollback across the metadata and blockchain
//! registries through the shared undo log. It never inspects business data;
//! callers perform writes through the handles on [`MultiTransaction`].

use crate::block::{BlockStore, BlockTransaction};
use crate::error::{RegistryError, RegistryResult};
use crate::metadata::{MetadataStore, MetadataTransaction};
use crate::undo::{UndoLog, UndoRecord};
use chainreg_storage::StorageBackend;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// State of a multi-store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// The transaction is open and accepts writes.
    Active,
    /// Both stores were finalized.
    Committed,
    /// The transaction was rolled back.
    RolledBack,
}

/// Coordinates atomic state changes across the metadata registry and the
/// blockchain registry.
///
/// At most one multi-store transaction is open at any instant: `begin`
/// blocks until the prior transaction has terminated. The returned
/// [`MultiTransaction`] holds the lock for its lifetime, so releasing it is
/// tied to the transaction's destruction and cannot leak.
///
/// # Example
///
/// ```rust
/// use chainreg_core::{
///     EcosystemId, MemoryBlockStore, MemoryMetadataStore, RegistryManager, RowKey,
/// };
/// use chainreg_storage::InMemoryBackend;
/// use std::sync::Arc;
///
/// let manager = RegistryManager::new(
///     Arc::new(MemoryMetadataStore::new()),
///     Arc::new(MemoryBlockStore::new()),
///     Box::new(InMemoryBackend::new()),
/// );
///
/// let mut tx = manager.begin().unwrap();
/// let member = RowKey::new(EcosystemId::new(1), "members", b"1".to_vec());
/// tx.metadata().upsert(&member, b"alice".to_vec()).unwrap();
/// tx.blocks().put(b"block:1", b"...".to_vec()).unwrap();
/// manager.commit(&mut tx).unwrap();
/// ```
pub struct RegistryManager {
    metadata: Arc<dyn MetadataStore>,
    blocks: Arc<dyn BlockStore>,
    undo: Arc<UndoLog>,
    write_lock: Mutex<()>,
}

impl RegistryManager {
    /// Creates a manager over the two store drivers and an undo-log backing
    /// store.
    ///
    /// Undo records surviving in the backing store from a previous run stay
    /// readable: [`RegistryManager::rollback_block`] can still revert an
    /// interrupted block after a restart.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blocks: Arc<dyn BlockStore>,
        undo_backend: Box<dyn StorageBackend>,
    ) -> Self {
        Self {
            metadata,
            blocks,
            undo: Arc::new(UndoLog::new(undo_backend)),
            write_lock: Mutex::new(()),
        }
    }

    /// Opens a new multi-store transaction, blocking until any prior
    /// transaction has terminated.
    ///
    /// The previous block's retained undo entries are discarded at this
    /// point; from here on [`RegistryManager::rollback_block`] reverts the
    /// new block.
    ///
    /// # Errors
    ///
    /// Returns the underlying backend error, with backend-type context, if
    /// either store rejects the transaction open. No transaction is left
    /// running in that case, and the previous block's undo entries are
    /// still intact: a failed open must not cost the ability to revert the
    /// last committed block.
    pub fn begin(&self) -> RegistryResult<MultiTransaction<'_>> {
        let guard = self.write_lock.lock();
        // Clear only once both handles opened: until the new block's
        // transaction has actually begun, the retained entries still
        // belong to the last committed block.
        let (metadata, blocks) = self.open_handles()?;
        self.undo.clear()?;
        debug!("multi-store transaction open");
        Ok(MultiTransaction {
            metadata,
            blocks,
            state: TransactionState::Active,
            _guard: guard,
        })
    }

    /// Finalizes both store transactions.
    ///
    /// On a finalize failure the manager attempts a compensating rollback.
    /// If that succeeds the original error is returned; if the rollback
    /// itself fails the result is [`RegistryError::Unrecoverable`] and the
    /// caller must halt the node.
    ///
    /// On success the undo entries are retained until the next `begin`, so
    /// the committed block can still be reverted by
    /// [`RegistryManager::rollback_block`].
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidOperation`] if the transaction already
    /// terminated; otherwise as described above.
    pub fn commit(&self, tx: &mut MultiTransaction<'_>) -> RegistryResult<()> {
        tx.ensure_active()?;

        if let Err(err) = Self::finalize(tx) {
            tx.state = TransactionState::RolledBack;
            tx.metadata.discard();
            tx.blocks.discard();
            warn!(error = %err, "commit failed, attempting compensating rollback");
            return match self.replay_and_clear() {
                Ok(()) => Err(err),
                Err(replay_err) => Err(RegistryError::unrecoverable(format!(
                    "commit failed ({err}); compensating rollback failed ({replay_err})"
                ))),
            };
        }

        tx.state = TransactionState::Committed;
        debug!("multi-store transaction committed");
        Ok(())
    }

    /// Rolls back an open transaction.
    ///
    /// Discards the transaction's single-use native handles, then replays
    /// the undo log under the lock the transaction already holds. The
    /// replayed rollback is itself a multi-store transaction on fresh
    /// handles.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidOperation`] if the transaction already
    /// terminated; [`RegistryError::Unrecoverable`] if replay fails partway.
    pub fn rollback(&self, tx: &mut MultiTransaction<'_>) -> RegistryResult<()> {
        tx.ensure_active()?;
        tx.state = TransactionState::RolledBack;
        tx.metadata.discard();
        tx.blocks.discard();
        debug!("rolling back open multi-store transaction");
        self.replay_and_clear()
    }

    /// Reverts the changes recorded by the last block in all registries.
    ///
    /// Legal without a preceding `begin`: undo entries are retained across
    /// a successful commit, so this undoes the last committed block. An
    /// empty undo log is a no-op.
    ///
    /// # Errors
    ///
    /// Backend-open failures are returned with backend-type context (no
    /// state has been touched yet). Replay read/apply/finalize failures are
    /// [`RegistryError::Unrecoverable`]: once unwinding has itself failed
    /// there is no further compensating action.
    pub fn rollback_block(&self) -> RegistryResult<()> {
        let _guard = self.write_lock.lock();
        debug!("rolling back last block");
        self.replay_and_clear()
    }

    /// Returns true if no undo entries are currently recorded.
    pub fn undo_is_empty(&self) -> RegistryResult<bool> {
        self.undo.is_empty()
    }

    fn finalize(tx: &mut MultiTransaction<'_>) -> RegistryResult<()> {
        tx.metadata.commit()?;
        tx.blocks.commit()?;
        Ok(())
    }

    fn open_handles(&self) -> RegistryResult<(MetadataTransaction, BlockTransaction)> {
        let block_native = self.blocks.begin().map_err(|err| {
            error!(backend = "blockchain", error = %err, "starting blockchain transaction");
            RegistryError::Blockchain(err)
        })?;
        let metadata_native = self.metadata.begin().map_err(|err| {
            error!(backend = "metadata", error = %err, "starting metadata transaction");
            RegistryError::Metadata(err)
        })?;

        Ok((
            MetadataTransaction::new(metadata_native, Arc::clone(&self.undo)),
            BlockTransaction::new(block_native, Arc::clone(&self.undo)),
        ))
    }

    fn replay_and_clear(&self) -> RegistryResult<()> {
        self.replay_undo()?;
        self.undo.clear()?;
        Ok(())
    }

    /// Replays all undo entries in reverse append order, one handler per
    /// record variant, then finalizes the rollback transaction.
    fn replay_undo(&self) -> RegistryResult<()> {
        let records = self.undo.entries().map_err(|err| {
            RegistryError::unrecoverable(format!("reading undo log during rollback: {err}"))
        })?;
        if records.is_empty() {
            return Ok(());
        }

        let (mut metadata, mut blocks) = self.open_handles()?;
        for record in records.iter().rev() {
            let applied = match record {
                UndoRecord::MetadataRow { key, before } => metadata.apply(key, before.as_deref()),
                UndoRecord::BlockKey { key, before } => blocks.apply(key, before.as_deref()),
            };
            applied.map_err(|err| {
                RegistryError::unrecoverable(format!("applying undo entry: {err}"))
            })?;
        }

        metadata.commit().map_err(|err| {
            RegistryError::unrecoverable(format!("finalizing metadata rollback: {err}"))
        })?;
        blocks.commit().map_err(|err| {
            RegistryError::unrecoverable(format!("finalizing blockchain rollback: {err}"))
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for RegistryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryManager").finish_non_exhaustive()
    }
}

/// One atomic unit of work spanning both registries.
///
/// Created by [`RegistryManager::begin`], destroyed by
/// [`RegistryManager::commit`] or [`RegistryManager::rollback`]. Owns the
/// write lock for its lifetime, so no second transaction can open while it
/// exists. Writes through [`MultiTransaction::metadata`] and
/// [`MultiTransaction::blocks`] transparently append undo entries before
/// applying.
pub struct MultiTransaction<'a> {
    metadata: MetadataTransaction,
    blocks: BlockTransaction,
    state: TransactionState,
    _guard: MutexGuard<'a, ()>,
}

impl MultiTransaction<'_> {
    /// The metadata registry write handle.
    pub fn metadata(&mut self) -> &mut MetadataTransaction {
        &mut self.metadata
    }

    /// The blockchain registry write handle.
    pub fn blocks(&mut self) -> &mut BlockTransaction {
        &mut self.blocks
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks whether the transaction is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    fn ensure_active(&self) -> RegistryResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(RegistryError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::RolledBack => Err(RegistryError::invalid_operation(
                "transaction already rolled back",
            )),
        }
    }
}

impl std::fmt::Debug for MultiTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTransaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
