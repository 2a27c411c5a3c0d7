//! Per-hash async locks.
//!
//! Serializes blob writes and deletes for the same content hash within one
//! process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutexes, one per content hash in use.
#[derive(Debug, Default)]
pub struct HashLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guard held while a hash is locked.
pub struct HashGuard {
    _guard: OwnedMutexGuard<()>,
}

impl HashLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `hash`, waiting for any current holder.
    pub async fn lock(&self, hash: &str) -> HashGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only the table still holds are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(hash.to_string()).or_default())
        };

        HashGuard {
            _guard: lock.lock_owned().await,
        }
    }
}
