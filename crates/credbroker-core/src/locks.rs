//! Per-id exclusive locks.
//!
//! Create and delete for the same binding id (or instance id) must not
//! overlap, while different ids run fully in parallel. [`KeyedLocks`] hands
//! out one async mutex per id and forgets it once the last holder or waiter
//! is gone, so the table only ever holds ids that are in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// A table of async mutexes keyed by id.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive hold on one id. Released on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    table: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_owned()).or_default())
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            table: self,
            key: key.to_owned(),
            guard: Some(guard),
        }
    }

    /// Number of ids currently held or awaited.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .table
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the table's own handle left: nobody holds or waits on this id.
        if locks
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
