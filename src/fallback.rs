//! Degraded-result resolution for quota exhaustion and platform failures
//!
//! Resolution order, stopping at the first hit:
//! 1. memory tier, stale allowed
//! 2. durable tier, stale allowed
//! 3. demo data
//!
//! The last step cannot fail, so every resolution yields entries and an
//! advisory.

use crate::cache::{CacheStore, CachedData};
use crate::data::{CreatorEntry, DemoDataGenerator, ResultSource};

/// Advisory for demo data served because a platform quota was hit
pub const QUOTA_ADVISORY: &str = "quota exceeded — using offline/demo data";

/// Advisory for demo data served because every search came back empty
pub const NO_RESULTS_ADVISORY: &str = "no results found; using demo data";

/// Advisory for demo data served because the platforms failed
pub const UNAVAILABLE_ADVISORY: &str = "platforms unavailable — using offline/demo data";

/// Advisory for live results missing the platforms that hit their quota
pub const PARTIAL_ADVISORY: &str = "quota exceeded on some platforms — showing partial results";

/// Advisory for expired cached results
pub fn stale_advisory(age_secs: u64) -> String {
    format!("showing cached results ({age_secs}s old)")
}

/// Why the aggregator gave up on live data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    /// At least one platform reported a rate limit
    QuotaExceeded,
    /// Every platform answered, but none found anything
    NoResults,
    /// Every platform failed for other reasons
    Unavailable,
}

impl FallbackCause {
    /// Advisory attached to demo data for this cause
    pub fn demo_advisory(&self) -> &'static str {
        match self {
            FallbackCause::QuotaExceeded => QUOTA_ADVISORY,
            FallbackCause::NoResults => NO_RESULTS_ADVISORY,
            FallbackCause::Unavailable => UNAVAILABLE_ADVISORY,
        }
    }
}

/// Substitute result chosen by the [`FallbackPolicy`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entries: Vec<CreatorEntry>,
    pub advisory: String,
    pub source: ResultSource,
}

/// Walks stale cache tiers and finally the demo generator
///
/// The aggregator calls [`FallbackPolicy::stale`] first and only reaches
/// [`FallbackPolicy::demo`] when no real result exists and no partial live
/// result can be served.
#[derive(Debug, Clone, Default)]
pub struct FallbackPolicy {
    demo: DemoDataGenerator,
}

impl FallbackPolicy {
    pub fn new(demo: DemoDataGenerator) -> Self {
        Self { demo }
    }

    /// Steps 1 and 2: the most recent real result for `key`, whatever its age
    pub async fn stale(
        &self,
        cache: &CacheStore<Vec<CreatorEntry>>,
        key: &str,
        limit: usize,
    ) -> Option<Resolution> {
        let hit = cache.get_stale_allowing_age(key).await?;
        tracing::info!(key, age_secs = hit.age_secs, tier = ?hit.tier, "serving stale cache entry");
        Some(Self::from_cached(hit, limit))
    }

    /// Step 3: synthetic entries for `category`
    pub fn demo(&self, category: &str, limit: usize, cause: FallbackCause) -> Resolution {
        tracing::info!(category, ?cause, "serving demo data");
        Resolution {
            entries: self.demo.generate(category, limit),
            advisory: cause.demo_advisory().to_string(),
            source: ResultSource::Demo,
        }
    }

    fn from_cached(hit: CachedData<Vec<CreatorEntry>>, limit: usize) -> Resolution {
        let mut entries = hit.data;
        entries.truncate(limit);
        Resolution {
            entries,
            advisory: stale_advisory(hit.age_secs),
            source: ResultSource::StaleCache { age_secs: hit.age_secs },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{now_epoch_seconds, CacheEntry, CacheSettings, DiskCache};
    use crate::data::Platform;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entries(n: usize) -> Vec<CreatorEntry> {
        (0..n)
            .map(|i| CreatorEntry::new(Platform::YouTube, format!("UC{i}"), format!("Channel {i}")))
            .collect()
    }

    #[test]
    fn test_stale_advisory_format() {
        assert_eq!(stale_advisory(7200), "showing cached results (7200s old)");
    }

    #[tokio::test]
    async fn test_stale_prefers_memory_entry() {
        let cache = CacheStore::in_memory(Duration::from_secs(0));
        cache.put("narrow::gaming::5", entries(2)).await;

        let resolution = FallbackPolicy::default()
            .stale(&cache, "narrow::gaming::5", 5)
            .await
            .expect("memory entry should be served stale");

        assert_eq!(resolution.entries.len(), 2);
        assert!(resolution.advisory.starts_with("showing cached results ("));
        assert!(matches!(resolution.source, ResultSource::StaleCache { .. }));
    }

    #[tokio::test]
    async fn test_stale_reads_durable_tier_and_truncates() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let disk = DiskCache::with_dir(temp.path().to_path_buf());
        let stored_at = now_epoch_seconds() - 7200;
        disk.write("narrow::gaming::2", &CacheEntry::stored_at(entries(3), stored_at, 3600))
            .await
            .expect("Failed to seed durable tier");
        let cache = CacheStore::new(CacheSettings::default(), Some(disk));

        let resolution = FallbackPolicy::default()
            .stale(&cache, "narrow::gaming::2", 2)
            .await
            .expect("durable entry should be served stale");

        assert_eq!(resolution.entries.len(), 2);
        assert!(resolution.advisory.contains("7200s old"), "{}", resolution.advisory);
    }

    #[tokio::test]
    async fn test_stale_misses_on_empty_cache() {
        let cache = CacheStore::in_memory(Duration::from_secs(60));
        assert!(FallbackPolicy::default().stale(&cache, "k", 5).await.is_none());
    }

    #[test]
    fn test_demo_advisory_depends_on_cause() {
        let policy = FallbackPolicy::default();

        let quota = policy.demo("gaming", 5, FallbackCause::QuotaExceeded);
        assert_eq!(quota.entries.len(), 5);
        assert_eq!(quota.advisory, QUOTA_ADVISORY);
        assert_eq!(quota.source, ResultSource::Demo);

        let empty = policy.demo("gaming", 5, FallbackCause::NoResults);
        assert_eq!(empty.advisory, NO_RESULTS_ADVISORY);
    }

    #[test]
    fn test_demo_names_only_configured_platforms() {
        let policy = FallbackPolicy::new(DemoDataGenerator::with_platforms(vec![Platform::TikTok]));

        let resolution = policy.demo("gaming", 4, FallbackCause::Unavailable);

        assert!(resolution.entries.iter().all(|e| e.platform == Platform::TikTok));
        assert_eq!(resolution.advisory, UNAVAILABLE_ADVISORY);
    }

    #[tokio::test]
    async fn test_synthetic_entries_are_not_stale_candidates() {
        let cache = CacheStore::in_memory(Duration::from_secs(60));
        cache.put_synthetic("k", entries(4), Duration::from_secs(0));

        assert!(FallbackPolicy::default().stale(&cache, "k", 2).await.is_none());
    }
}
