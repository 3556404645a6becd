//! In-memory metadata store driver.

use crate::error::StoreError;
use crate::metadata::{MetadataStore, MetadataStoreTx};
use crate::types::RowKey;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory relational metadata store.
///
/// Reference driver for tests and ephemeral nodes. Transactions stage their
/// writes and apply them atomically under the store's write lock on commit.
///
/// Fault injection: [`MemoryMetadataStore::fail_commits`] and
/// [`MemoryMetadataStore::fail_begins`] make the next N commits/begins fail,
/// which is how the compensating-rollback and unrecoverable paths are
/// exercised in tests.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    rows: Arc<RwLock<BTreeMap<RowKey, Vec<u8>>>>,
    begin_failures: Arc<AtomicUsize>,
    commit_failures: Arc<AtomicUsize>,
}

impl MemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all committed rows.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<RowKey, Vec<u8>> {
        self.rows.read().clone()
    }

    /// Makes the next `n` calls to [`MetadataStore::begin`] fail.
    pub fn fail_begins(&self, n: usize) {
        self.begin_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` transaction commits fail.
    pub fn fail_commits(&self, n: usize) {
        self.commit_failures.store(n, Ordering::SeqCst);
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MetadataStore for MemoryMetadataStore {
    fn begin(&self) -> Result<Box<dyn MetadataStoreTx>, StoreError> {
        if take_failure(&self.begin_failures) {
            return Err(StoreError::unavailable("injected begin failure"));
        }
        Ok(Box::new(MemoryMetadataTx {
            rows: Arc::clone(&self.rows),
            staged: BTreeMap::new(),
            commit_failures: Arc::clone(&self.commit_failures),
        }))
    }

    fn row(&self, key: &RowKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.rows.read().get(key).cloned())
    }
}

struct MemoryMetadataTx {
    rows: Arc<RwLock<BTreeMap<RowKey, Vec<u8>>>>,
    /// Staged writes; `None` is a staged deletion.
    staged: BTreeMap<RowKey, Option<Vec<u8>>>,
    commit_failures: Arc<AtomicUsize>,
}

impl MetadataStoreTx for MemoryMetadataTx {
    fn get(&self, key: &RowKey) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.rows.read().get(key).cloned())
    }

    fn upsert(&mut self, key: &RowKey, row: Vec<u8>) -> Result<(), StoreError> {
        self.staged.insert(key.clone(), Some(row));
        Ok(())
    }

    fn delete(&mut self, key: &RowKey) -> Result<(), StoreError> {
        self.staged.insert(key.clone(), None);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if take_failure(&self.commit_failures) {
            return Err(StoreError::rejected("injected commit failure"));
        }
        let mut rows = self.rows.write();
        for (key, staged) in self.staged {
            match staged {
                Some(row) => {
                    rows.insert(key, row);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }
}
