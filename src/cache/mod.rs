//! Two-tier TTL cache for aggregation results and raw platform payloads
//!
//! The fast tier is an in-process map behind a single mutex and is lost on
//! restart. The durable tier stores one JSON file per key and survives
//! restarts. Expired entries stay readable for the fallback policy, tagged
//! with their age, but are never served as fresh results.

mod durable;
mod memory;
mod store;

pub use durable::{CacheError, DiskCache};
pub use memory::MemoryTier;
pub use store::{CacheSettings, CacheStore};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the parts of a cache key
pub const KEY_SEPARATOR: &str = "::";

/// Current wall-clock time as seconds since the Unix epoch
pub fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Query mode, part of the merged-result cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    /// Ask each platform for exactly `limit` candidates
    #[default]
    Narrow,
    /// Ask each platform for a wider candidate pool before ranking
    Broad,
}

impl QueryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryScope::Narrow => "narrow",
            QueryScope::Broad => "broad",
        }
    }

    /// Number of candidates to request from each platform for `limit` results
    pub fn fetch_count(&self, limit: usize, max: usize) -> usize {
        match self {
            QueryScope::Narrow => limit.min(max),
            QueryScope::Broad => limit.saturating_mul(3).min(max),
        }
    }

    /// Parses a scope name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "narrow" => Some(QueryScope::Narrow),
            "broad" => Some(QueryScope::Broad),
            _ => None,
        }
    }
}

impl fmt::Display for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a merged aggregation result: `scope::category::limit`
///
/// The category is kept case-preserved; path-unsafe characters are only
/// encoded when the key is turned into a durable-tier file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: QueryScope,
    pub category: String,
    pub limit: usize,
}

impl CacheKey {
    pub fn new(scope: QueryScope, category: impl Into<String>, limit: usize) -> Self {
        Self {
            scope,
            category: category.into(),
            limit,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.scope,
            self.category,
            self.limit,
            sep = KEY_SEPARATOR
        )
    }
}

/// A cached value with its storage timestamp
///
/// Entries are never mutated in place; a refresh replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// When the entry was written
    pub stored_at_epoch_seconds: i64,
    /// Lifetime of the entry in seconds
    pub ttl_seconds: u64,
    /// Set for demo data; such entries are never used as stale fallbacks
    #[serde(default)]
    pub synthetic: bool,
    /// The cached value
    pub payload: T,
}

impl<T> CacheEntry<T> {
    /// Creates an entry stored at `now`
    pub fn new(payload: T, ttl_seconds: u64) -> Self {
        Self::stored_at(payload, now_epoch_seconds(), ttl_seconds)
    }

    /// Creates an entry with an explicit storage timestamp
    pub fn stored_at(payload: T, stored_at_epoch_seconds: i64, ttl_seconds: u64) -> Self {
        Self {
            stored_at_epoch_seconds,
            ttl_seconds,
            synthetic: false,
            payload,
        }
    }

    /// Seconds elapsed since the entry was stored; clock skew clamps to 0
    pub fn age_secs(&self, now: i64) -> u64 {
        u64::try_from(now.saturating_sub(self.stored_at_epoch_seconds)).unwrap_or(0)
    }

    /// An entry is valid while its age does not exceed its TTL
    pub fn is_valid(&self, now: i64) -> bool {
        self.age_secs(now) <= self.ttl_seconds
    }

    /// Remaining lifetime in seconds; zero or negative means sweepable
    pub fn remaining_ttl(&self, now: i64) -> i64 {
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        let age = i64::try_from(self.age_secs(now)).unwrap_or(i64::MAX);
        ttl.saturating_sub(age)
    }
}

/// Which tier answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Durable,
}

/// Result of reading from the cache, including metadata about freshness
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    /// The cached value
    pub data: T,
    /// When the value was originally stored
    pub stored_at_epoch_seconds: i64,
    /// Age at lookup time
    pub age_secs: u64,
    /// Whether the TTL has elapsed
    pub is_expired: bool,
    /// Whether the value is demo data
    pub synthetic: bool,
    /// Tier that served the lookup
    pub tier: CacheTier,
}

impl<T: Clone> CachedData<T> {
    pub(crate) fn from_entry(entry: &CacheEntry<T>, now: i64, tier: CacheTier) -> Self {
        Self {
            data: entry.payload.clone(),
            stored_at_epoch_seconds: entry.stored_at_epoch_seconds,
            age_secs: entry.age_secs(now),
            is_expired: !entry.is_valid(now),
            synthetic: entry.synthetic,
            tier,
        }
    }
}
