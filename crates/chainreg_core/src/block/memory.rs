//! In-memory blockchain store driver.

use crate::block::{BlockStore, BlockStoreTx};
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory embedded key-value store.
///
/// Reference driver for tests and ephemeral nodes, with the same
/// fault-injection hooks as the metadata counterpart.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    begin_failures: Arc<AtomicUsize>,
    commit_failures: Arc<AtomicUsize>,
}

impl MemoryBlockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all committed entries.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.entries.read().clone()
    }

    /// Makes the next `n` calls to [`BlockStore::begin`] fail.
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

impl BlockStore for MemoryBlockStore {
    fn begin(&self) -> Result<Box<dyn BlockStoreTx>, StoreError> {
        if take_failure(&self.begin_failures) {
            return Err(StoreError::unavailable("injected begin failure"));
        }
        Ok(Box::new(MemoryBlockTx {
            entries: Arc::clone(&self.entries),
            staged: BTreeMap::new(),
            commit_failures: Arc::clone(&self.commit_failures),
        }))
    }

    fn value(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }
}

struct MemoryBlockTx {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    /// Staged writes; `None` is a staged deletion.
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    commit_failures: Arc<AtomicUsize>,
}

impl BlockStoreTx for MemoryBlockTx {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.staged.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if take_failure(&self.commit_failures) {
            return Err(StoreError::rejected("injected commit failure"));
        }
        let mut entries = self.entries.write();
        for (key, staged) in self.staged {
            match staged {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
