//! Two-tier cache store combining the memory and durable tiers

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use super::{
    now_epoch_seconds, CacheEntry, CacheError, CacheTier, CachedData, DiskCache, MemoryTier,
};

/// Tunables for a [`CacheStore`]
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Lifetime of entries written with [`CacheStore::put`]
    pub ttl: Duration,
    /// Entries older than this are ignored even by stale lookups
    pub stale_limit: Duration,
    /// Upper bound on a durable-tier read; a slower read counts as a miss
    pub durable_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),                  // 1 hour
            stale_limit: Duration::from_secs(7 * 24 * 3600), // 7 days
            durable_timeout: Duration::from_millis(500),
        }
    }
}

/// TTL-bounded key/value store with an in-memory and a durable tier
///
/// All access to cached state goes through this type. Clones share the same
/// memory tier and durable directory. Durable-tier failures are logged and
/// never surfaced: without a working disk the store keeps operating on
/// memory alone.
#[derive(Debug)]
pub struct CacheStore<T> {
    memory: MemoryTier<T>,
    disk: Option<DiskCache>,
    settings: CacheSettings,
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        Self {
            memory: self.memory.clone(),
            disk: self.disk.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<T> CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Creates a store; `disk = None` runs memory-only
    pub fn new(settings: CacheSettings, disk: Option<DiskCache>) -> Self {
        Self {
            memory: MemoryTier::new(),
            disk,
            settings,
        }
    }

    /// Creates a memory-only store with default settings and the given TTL
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(
            CacheSettings {
                ttl,
                ..CacheSettings::default()
            },
            None,
        )
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    fn stale_limit_secs(&self) -> u64 {
        self.settings.stale_limit.as_secs()
    }

    /// Looks up a fresh entry
    ///
    /// Checks the memory tier first. On a miss (or an expired memory entry)
    /// the durable tier is consulted; a durable record within the stale limit
    /// is promoted into memory. Only entries whose TTL has not elapsed are
    /// returned.
    pub async fn get(&self, key: &str) -> Option<CachedData<T>> {
        let now = now_epoch_seconds();

        if let Some(entry) = self.memory.get(key) {
            if entry.is_valid(now) {
                tracing::debug!(key, tier = "memory", "cache hit");
                return Some(CachedData::from_entry(&entry, now, CacheTier::Memory));
            }
        }

        let entry = self.read_durable(key).await?;
        if entry.age_secs(now) > self.stale_limit_secs() {
            return None;
        }
        self.memory.insert(key, entry.clone());

        if entry.is_valid(now) {
            tracing::debug!(key, tier = "durable", "cache hit");
            Some(CachedData::from_entry(&entry, now, CacheTier::Durable))
        } else {
            tracing::debug!(key, age_secs = entry.age_secs(now), "cache entry expired");
            None
        }
    }

    /// Stores a value in both tiers with the default TTL
    pub async fn put(&self, key: &str, payload: T) {
        self.put_with_ttl(key, payload, self.settings.ttl).await;
    }

    /// Stores a value in both tiers with an explicit TTL
    ///
    /// A durable write failure, or one slower than `durable_timeout`, is
    /// logged and swallowed.
    pub async fn put_with_ttl(&self, key: &str, payload: T, ttl: Duration) {
        let entry = CacheEntry::new(payload, ttl.as_secs());
        self.memory.insert(key, entry.clone());
        self.write_durable(key, &entry).await;
    }

    /// Stores demo data in the memory tier only, flagged as synthetic
    ///
    /// Synthetic entries can answer fresh lookups until their TTL elapses but
    /// are never used as a stale fallback, and never reach disk where they
    /// could replace a real record.
    pub fn put_synthetic(&self, key: &str, payload: T, ttl: Duration) {
        let mut entry = CacheEntry::new(payload, ttl.as_secs());
        entry.synthetic = true;
        self.memory.insert(key, entry);
    }

    /// Looks up an entry in the memory tier, ignoring the TTL
    pub fn get_stale_from_memory(&self, key: &str) -> Option<CachedData<T>> {
        let now = now_epoch_seconds();
        let entry = self.memory.get(key)?;
        self.stale_candidate(&entry, now)
            .then(|| CachedData::from_entry(&entry, now, CacheTier::Memory))
    }

    /// Looks up an entry in the durable tier, ignoring the TTL
    ///
    /// A hit is promoted into the memory tier.
    pub async fn get_stale_from_disk(&self, key: &str) -> Option<CachedData<T>> {
        let now = now_epoch_seconds();
        let entry = self.read_durable(key).await?;
        if !self.stale_candidate(&entry, now) {
            return None;
        }
        self.memory.insert(key, entry.clone());
        Some(CachedData::from_entry(&entry, now, CacheTier::Durable))
    }

    /// Same lookup order as [`CacheStore::get`] without the TTL check
    ///
    /// Used by the fallback policy; the returned age lets the caller describe
    /// how old the data is.
    pub async fn get_stale_allowing_age(&self, key: &str) -> Option<CachedData<T>> {
        match self.get_stale_from_memory(key) {
            Some(hit) => Some(hit),
            None => self.get_stale_from_disk(key).await,
        }
    }

    fn stale_candidate(&self, entry: &CacheEntry<T>, now: i64) -> bool {
        !entry.synthetic && entry.age_secs(now) <= self.stale_limit_secs()
    }

    /// Deletes entries whose remaining TTL is zero or less from both tiers
    ///
    /// Returns the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = now_epoch_seconds();
        let mut removed = self.memory.remove_expired(now);

        if let Some(disk) = &self.disk {
            match disk.remove_expired(now).await {
                Ok(count) => removed += count,
                Err(e) => tracing::warn!(
                    dir = %disk.dir().display(),
                    error = %e,
                    "durable cache sweep failed"
                ),
            }
        }

        removed
    }

    /// Reads a durable record, treating errors and slow reads as a miss
    async fn write_durable(&self, key: &str, entry: &CacheEntry<T>) {
        let Some(disk) = &self.disk else {
            return;
        };
        let timeout = self.settings.durable_timeout;

        let result = match tokio::time::timeout(timeout, disk.write(key, entry)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "durable cache write failed; continuing memory-only");
        }
    }

    fn timeout_error(&self) -> CacheError {
        let millis = self.settings.durable_timeout.as_millis();
        CacheError::Timeout(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    async fn read_durable(&self, key: &str) -> Option<CacheEntry<T>> {
        let disk = self.disk.as_ref()?;
        let timeout = self.settings.durable_timeout;

        let result = match tokio::time::timeout(timeout, disk.read::<T>(key)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        };

        match result {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "durable cache read failed; treating as miss");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(ttl_secs: u64) -> (CacheStore<Vec<String>>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let settings = CacheSettings {
            ttl: Duration::from_secs(ttl_secs),
            ..CacheSettings::default()
        };
        let disk = DiskCache::with_dir(temp_dir.path().to_path_buf());
        let store = CacheStore::new(settings, Some(disk));
        (store, temp_dir)
    }

    fn payload(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_then_get_hits_memory() {
        let (store, _temp_dir) = create_test_store(3600);
        store.put("k", payload(&["a", "b"])).await;

        let hit = store.get("k").await.expect("Should hit");

        assert_eq!(hit.data, payload(&["a", "b"]));
        assert_eq!(hit.tier, CacheTier::Memory);
        assert!(!hit.is_expired);
    }

    #[tokio::test]
    async fn test_put_writes_durable_tier() {
        let (store, temp_dir) = create_test_store(3600);
        store.put("narrow::gaming::5", payload(&["a"])).await;

        let path = temp_dir.path().join(DiskCache::file_name("narrow::gaming::5"));
        assert!(path.exists(), "Durable record should exist");
    }

    #[tokio::test]
    async fn test_durable_hit_survives_restart_and_is_promoted() {
        let (store, temp_dir) = create_test_store(3600);
        store.put("k", payload(&["persisted"])).await;

        // A fresh store over the same directory models a process restart.
        let restarted: CacheStore<Vec<String>> = CacheStore::new(
            store.settings().clone(),
            Some(DiskCache::with_dir(temp_dir.path().to_path_buf())),
        );
        let hit = restarted.get("k").await.expect("Should hit durable tier");
        assert_eq!(hit.tier, CacheTier::Durable);

        let again = restarted.get("k").await.expect("Should hit memory tier");
        assert_eq!(again.tier, CacheTier::Memory);
        assert_eq!(again.data, payload(&["persisted"]));
    }

    #[tokio::test]
    async fn test_get_skips_expired_entries_but_stale_lookup_returns_them() {
        let (store, _temp_dir) = create_test_store(3600);
        let disk = store.disk().expect("disk tier").clone();
        let stored_at = now_epoch_seconds() - 7200;
        disk.write("k", &CacheEntry::stored_at(payload(&["x", "y", "z"]), stored_at, 3600))
            .await
            .expect("write");

        assert!(store.get("k").await.is_none(), "Expired entry must not be served fresh");

        let stale = store.get_stale_allowing_age("k").await.expect("Stale lookup should hit");
        assert!(stale.is_expired);
        assert!(stale.age_secs >= 7200);
        assert_eq!(stale.data.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_limit_hides_ancient_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let disk = DiskCache::with_dir(temp_dir.path().to_path_buf());
        let settings = CacheSettings {
            ttl: Duration::from_secs(60),
            stale_limit: Duration::from_secs(600),
            ..CacheSettings::default()
        };
        let store: CacheStore<Vec<String>> = CacheStore::new(settings, Some(disk.clone()));
        disk.write("k", &CacheEntry::stored_at(payload(&["old"]), now_epoch_seconds() - 601, 60))
            .await
            .expect("write");

        assert!(store.get_stale_allowing_age("k").await.is_none());
    }

    #[tokio::test]
    async fn test_synthetic_entries_are_fresh_only_and_memory_only() {
        let (store, temp_dir) = create_test_store(3600);
        store.put_synthetic("k", payload(&["demo"]), Duration::from_secs(60));

        let hit = store.get("k").await.expect("Synthetic entry serves fresh lookups");
        assert!(hit.synthetic);
        assert!(store.get_stale_from_memory("k").is_none());
        assert!(!temp_dir.path().join(DiskCache::file_name("k")).exists());
    }

    #[tokio::test]
    async fn test_durable_failure_degrades_to_memory_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // A regular file where the cache directory should be makes every write fail.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").expect("write blocker");
        let store: CacheStore<Vec<String>> =
            CacheStore::new(CacheSettings::default(), Some(DiskCache::with_dir(blocker)));

        store.put("k", payload(&["still cached"])).await;

        let hit = store.get("k").await.expect("Memory tier should still serve");
        assert_eq!(hit.data, payload(&["still cached"]));
    }

    #[tokio::test]
    async fn test_durable_write_is_bounded_by_timeout() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let settings = CacheSettings {
            durable_timeout: Duration::ZERO,
            ..CacheSettings::default()
        };
        let store: CacheStore<Vec<String>> =
            CacheStore::new(settings, Some(DiskCache::with_dir(temp_dir.path().join("slow"))));

        tokio::time::timeout(Duration::from_secs(1), store.put("k", payload(&["a"])))
            .await
            .expect("put must not wait on the durable tier");

        let hit = store.get_stale_from_memory("k").expect("Memory tier should still serve");
        assert_eq!(hit.data, payload(&["a"]));
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_from_both_tiers() {
        let (store, _temp_dir) = create_test_store(3600);
        store.put("live", payload(&["a"])).await;
        store.put_with_ttl("dead", payload(&["b"]), Duration::from_secs(0)).await;

        let removed = store.sweep_expired().await;

        assert_eq!(removed, 2, "one memory entry and one durable record");
        assert!(store.get("live").await.is_some());
        assert!(store.get_stale_allowing_age("dead").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_only_store() {
        let store: CacheStore<Vec<String>> = CacheStore::in_memory(Duration::from_secs(60));
        store.put("k", payload(&["a"])).await;

        assert!(store.disk().is_none());
        assert!(store.get("k").await.is_some());
        assert!(store.get_stale_from_disk("k").await.is_none());
    }
}
