use log::warn;
use opfs_lib::EntryId;
use std::collections::HashSet;
use std::sync::Mutex;

/// Point-in-time answer to "is this entry open for exclusive access".
pub trait LockRegistry: Send + Sync {
    fn is_locked(&self, entry_id: &EntryId) -> bool;
}

#[derive(Default)]
pub struct ExclusiveLockRegistry {
    locked: Mutex<HashSet<EntryId>>,
}

impl ExclusiveLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the entry was already locked.
    pub fn lock_exclusive(&self, entry_id: &EntryId) -> bool {
        match self.locked.lock() {
            Ok(mut locked) => locked.insert(*entry_id),
            Err(e) => {
                warn!("lock registry poisoned: {}", e);
                false
            }
        }
    }

    pub fn unlock_exclusive(&self, entry_id: &EntryId) {
        match self.locked.lock() {
            Ok(mut locked) => {
                locked.remove(entry_id);
            }
            Err(e) => warn!("lock registry poisoned: {}", e),
        }
    }
}

impl LockRegistry for ExclusiveLockRegistry {
    fn is_locked(&self, entry_id: &EntryId) -> bool {
        self.locked
            .lock()
            .map(|locked| locked.contains(entry_id))
            .unwrap_or(true)
    }
}
