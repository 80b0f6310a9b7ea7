//! In-process cache tier

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::CacheEntry;

/// In-memory map of cache entries behind a single mutex
///
/// Entries are small and every operation is O(1), so one lock for the whole
/// map is enough. Cloning shares the same map.
#[derive(Debug)]
pub struct MemoryTier<T> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<T>>>>,
}

impl<T> Clone for MemoryTier<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for MemoryTier<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone> MemoryTier<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave an entry half-written,
    // so a poisoned map is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the entry stored under `key`
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.lock().get(key).cloned()
    }

    /// Stores `entry` under `key`, replacing any previous entry
    pub fn insert(&self, key: &str, entry: CacheEntry<T>) {
        self.lock().insert(key.to_string(), entry);
    }

    /// Removes entries whose remaining TTL is zero or less
    pub fn remove_expired(&self, now: i64) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.remaining_ttl(now) > 0);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
