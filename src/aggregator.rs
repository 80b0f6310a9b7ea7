//! Category aggregation across platform fetchers
//!
//! [`Aggregator::aggregate`] is the single entry point the outer layers call.
//! It answers from the merged-result cache when it can, otherwise fans the
//! query out to every fetcher concurrently, ranks what comes back and stores
//! it. Platform failures never reach the caller: they are resolved by the
//! [`FallbackPolicy`] into stale or demo data with an advisory.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::cache::{CacheKey, CacheStore, CachedData, QueryScope};
use crate::data::{
    AggregationResult, CreatorEntry, DemoDataGenerator, FetchOutcome, Fetched, Platform,
    PlatformFetcher, ResultSource,
};
use crate::fallback::{
    FallbackCause, FallbackPolicy, Resolution, PARTIAL_ADVISORY, UNAVAILABLE_ADVISORY,
};
use crate::ranking;

/// Largest accepted `limit` (the YouTube search page size)
pub const MAX_LIMIT: usize = 50;

/// The only error a caller of [`Aggregator::aggregate`] can see
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AggregateError {
    /// HTTP status the web layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            AggregateError::InvalidInput(_) => 400,
        }
    }
}

/// Timing knobs for an [`Aggregator`]
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// TTL for demo data and partial results
    pub demo_ttl: Duration,
    /// Deadline for one platform task, detail enrichment included
    pub task_timeout: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            demo_ttl: Duration::from_secs(60),
            task_timeout: Duration::from_secs(30),
        }
    }
}

/// What one platform task produced
#[derive(Debug)]
struct PlatformReport {
    platform: Platform,
    outcome: FetchOutcome,
    entries: Vec<CreatorEntry>,
}

impl PlatformReport {
    fn failed(platform: Platform, outcome: FetchOutcome) -> Self {
        Self {
            platform,
            outcome,
            entries: Vec::new(),
        }
    }
}

/// Fans category queries out to platform fetchers and merges the results
pub struct Aggregator {
    fetchers: Vec<Arc<dyn PlatformFetcher>>,
    cache: CacheStore<Vec<CreatorEntry>>,
    platform_cache: Option<CacheStore<Value>>,
    fallback: FallbackPolicy,
    settings: AggregatorSettings,
}

impl Aggregator {
    /// Demo data produced by the fallback names only the fetchers' platforms
    pub fn new(
        fetchers: Vec<Arc<dyn PlatformFetcher>>,
        cache: CacheStore<Vec<CreatorEntry>>,
    ) -> Self {
        let mut aggregator = Self {
            fetchers,
            cache,
            platform_cache: None,
            fallback: FallbackPolicy::default(),
            settings: AggregatorSettings::default(),
        };
        aggregator.fallback =
            FallbackPolicy::new(DemoDataGenerator::with_platforms(aggregator.platforms()));
        aggregator
    }

    pub fn with_settings(mut self, settings: AggregatorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Registers the raw payload cache shared by the fetchers so that
    /// [`Aggregator::sweep_expired`] covers it too
    pub fn with_platform_cache(mut self, cache: CacheStore<Value>) -> Self {
        self.platform_cache = Some(cache);
        self
    }

    pub fn cache(&self) -> &CacheStore<Vec<CreatorEntry>> {
        &self.cache
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.fetchers.iter().map(|f| f.platform()).collect()
    }

    /// Top creators for `category`, narrow scope
    pub async fn aggregate(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<AggregationResult, AggregateError> {
        self.aggregate_scoped(QueryScope::Narrow, category, limit).await
    }

    /// Top creators for `category` with an explicit query scope
    pub async fn aggregate_scoped(
        &self,
        scope: QueryScope,
        category: &str,
        limit: usize,
    ) -> Result<AggregationResult, AggregateError> {
        let key = validate(scope, category, limit)?.to_string();

        if let Some(hit) = self.cache.get(&key).await {
            return Ok(from_cache_hit(category, hit));
        }

        Ok(self.collect(scope, category, limit, &key).await)
    }

    /// Recomputes a result without consulting the fresh cache
    ///
    /// Used by the periodic refresh so that entries are replaced before they
    /// expire.
    pub async fn refresh(
        &self,
        scope: QueryScope,
        category: &str,
        limit: usize,
    ) -> Result<AggregationResult, AggregateError> {
        let key = validate(scope, category, limit)?.to_string();
        Ok(self.collect(scope, category, limit, &key).await)
    }

    /// Removes expired entries from the merged and platform caches
    pub async fn sweep_expired(&self) -> usize {
        let mut removed = self.cache.sweep_expired().await;
        if let Some(platform_cache) = &self.platform_cache {
            removed += platform_cache.sweep_expired().await;
        }
        removed
    }

    async fn collect(
        &self,
        scope: QueryScope,
        category: &str,
        limit: usize,
        key: &str,
    ) -> AggregationResult {
        let count = scope.fetch_count(limit, MAX_LIMIT);
        let reports = self.fan_out(category, count).await;

        let rate_limited = reports.iter().any(|r| r.outcome == FetchOutcome::RateLimited);
        let any_ok = reports.iter().any(|r| r.outcome.is_ok());
        let all_empty =
            !reports.is_empty() && reports.iter().all(|r| r.outcome == FetchOutcome::Empty);
        let ranked = ranking::rank(reports.into_iter().flat_map(|r| r.entries).collect(), limit);

        if any_ok && !rate_limited {
            self.cache.put(key, ranked.clone()).await;
            return AggregationResult {
                category: category.to_string(),
                entries: ranked,
                advisory: None,
                source: ResultSource::Live,
                rate_limited: false,
            };
        }

        let cause = if rate_limited {
            FallbackCause::QuotaExceeded
        } else if all_empty {
            FallbackCause::NoResults
        } else {
            FallbackCause::Unavailable
        };
        tracing::info!(category, key, ?cause, "live aggregation degraded; falling back");

        if let Some(resolution) = self.fallback.stale(&self.cache, key, limit).await {
            return degraded(category, resolution, rate_limited);
        }

        if !ranked.is_empty() {
            self.cache.put_with_ttl(key, ranked.clone(), self.settings.demo_ttl).await;
            return AggregationResult {
                category: category.to_string(),
                entries: ranked,
                advisory: Some(PARTIAL_ADVISORY.to_string()),
                source: ResultSource::Live,
                rate_limited,
            };
        }

        let resolution = self.fallback.demo(category, limit, cause);
        self.cache
            .put_synthetic(key, resolution.entries.clone(), self.settings.demo_ttl);
        degraded(category, resolution, rate_limited)
    }

    /// Runs one task per fetcher and waits for all of them
    ///
    /// Dropping the returned future aborts the tasks still in flight.
    async fn fan_out(&self, category: &str, count: usize) -> Vec<PlatformReport> {
        let mut tasks = JoinSet::new();
        let mut task_platforms = HashMap::new();

        for fetcher in &self.fetchers {
            let fetcher = Arc::clone(fetcher);
            let category = category.to_string();
            let deadline = self.settings.task_timeout;
            let platform = fetcher.platform();

            let handle = tasks.spawn(async move {
                let task = fetch_platform(fetcher.as_ref(), &category, count);
                match tokio::time::timeout(deadline, task).await {
                    Ok(report) => report,
                    Err(_) => {
                        tracing::warn!(
                            platform = %platform,
                            timeout_secs = deadline.as_secs(),
                            "platform task timed out"
                        );
                        PlatformReport::failed(platform, FetchOutcome::TransientError)
                    }
                }
            });
            task_platforms.insert(handle.id(), platform);
        }

        let mut reports = Vec::with_capacity(self.fetchers.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, report)) => {
                    tracing::debug!(
                        platform = %report.platform,
                        outcome = ?report.outcome,
                        entries = report.entries.len(),
                        "platform finished"
                    );
                    reports.push(report);
                }
                Err(e) => {
                    let platform = task_platforms.get(&e.id()).copied();
                    tracing::warn!(platform = ?platform, error = %e, "platform task failed");
                    if let Some(platform) = platform {
                        let failed = PlatformReport::failed(platform, FetchOutcome::TransientError);
                        reports.push(failed);
                    }
                }
            }
        }
        reports
    }
}

fn validate(scope: QueryScope, category: &str, limit: usize) -> Result<CacheKey, AggregateError> {
    if category.trim().is_empty() {
        return Err(AggregateError::InvalidInput("category must not be empty".to_string()));
    }
    if limit == 0 || limit > MAX_LIMIT {
        return Err(AggregateError::InvalidInput(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(CacheKey::new(scope, category, limit))
}

/// Search, normalize and enrich for one platform
async fn fetch_platform(
    fetcher: &dyn PlatformFetcher,
    category: &str,
    count: usize,
) -> PlatformReport {
    let platform = fetcher.platform();
    let search = fetcher.fetch_top_by_category(category.trim(), count).await;
    if !search.outcome.is_ok() {
        if let Some(detail) = &search.detail {
            tracing::warn!(
                platform = %platform,
                outcome = ?search.outcome,
                detail,
                "search failed"
            );
        }
        return PlatformReport::failed(platform, search.outcome);
    }

    let entries = fetcher.normalize(&search.payload);
    if entries.is_empty() {
        return PlatformReport::failed(platform, FetchOutcome::Empty);
    }

    let details = futures::future::join_all(
        entries
            .iter()
            .map(|entry| fetcher.fetch_detail(&entry.platform_id)),
    )
    .await;
    enrich(fetcher, entries, details)
}

/// Keeps only the entries whose detail lookup succeeded
///
/// A rate-limited lookup marks the whole platform `RateLimited`; the entries
/// enriched before the quota ran out are still reported so they can be served
/// as partial results.
fn enrich(
    fetcher: &dyn PlatformFetcher,
    entries: Vec<CreatorEntry>,
    details: Vec<Fetched>,
) -> PlatformReport {
    let platform = fetcher.platform();
    let mut rate_limited = false;
    let mut all_empty = true;
    let mut enriched = Vec::with_capacity(entries.len());

    for (mut entry, detail) in entries.into_iter().zip(details) {
        match detail.outcome {
            FetchOutcome::Ok => {
                fetcher.apply_detail(&mut entry, &detail.payload);
                enriched.push(entry);
                continue;
            }
            FetchOutcome::RateLimited => rate_limited = true,
            _ => {}
        }
        all_empty &= detail.outcome == FetchOutcome::Empty;
        tracing::debug!(
            platform = %platform,
            platform_id = %entry.platform_id,
            outcome = ?detail.outcome,
            "detail lookup failed; dropping entry"
        );
    }

    let outcome = if rate_limited {
        FetchOutcome::RateLimited
    } else if !enriched.is_empty() {
        FetchOutcome::Ok
    } else if all_empty {
        FetchOutcome::Empty
    } else {
        FetchOutcome::TransientError
    };
    if outcome != FetchOutcome::Ok {
        tracing::warn!(
            platform = %platform,
            ?outcome,
            enriched = enriched.len(),
            "detail enrichment degraded"
        );
    }

    PlatformReport {
        platform,
        outcome,
        entries: enriched,
    }
}

fn from_cache_hit(category: &str, hit: CachedData<Vec<CreatorEntry>>) -> AggregationResult {
    if hit.synthetic {
        return AggregationResult {
            category: category.to_string(),
            entries: hit.data,
            advisory: Some(UNAVAILABLE_ADVISORY.to_string()),
            source: ResultSource::Demo,
            rate_limited: false,
        };
    }
    AggregationResult {
        category: category.to_string(),
        entries: hit.data,
        advisory: None,
        source: ResultSource::Cache,
        rate_limited: false,
    }
}

fn degraded(category: &str, resolution: Resolution, rate_limited: bool) -> AggregationResult {
    AggregationResult {
        category: category.to_string(),
        entries: resolution.entries,
        advisory: Some(resolution.advisory),
        source: resolution.source,
        rate_limited,
    }
}
