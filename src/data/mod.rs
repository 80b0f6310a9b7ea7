//! Core data models for topcreators
//!
//! This module contains the types shared by the platform fetchers, the ranking
//! step, the cache and the aggregator: platforms, ranked creator entries and
//! the public aggregation result.

pub mod demo;
pub mod fetcher;
pub mod instagram;
pub mod tiktok;
pub mod youtube;

pub use demo::DemoDataGenerator;
pub use fetcher::{FetchOutcome, Fetched, PlatformError, PlatformFetcher};
pub use instagram::InstagramClient;
pub use tiktok::TikTokClient;
pub use youtube::YouTubeClient;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Social platforms a creator ranking can be sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
}

impl Platform {
    /// All supported platforms, in fan-out order
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Instagram, Platform::TikTok];

    /// Lowercase identifier used in cache keys, logs and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }

    /// Parses a platform name, accepting a few common aliases
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "youtube" | "yt" => Some(Platform::YouTube),
            "instagram" | "ig" | "insta" => Some(Platform::Instagram),
            "tiktok" | "tt" => Some(Platform::TikTok),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked creator/channel
///
/// `(platform, platform_id)` identifies an entry; the ranking step collapses
/// duplicates of that pair into one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorEntry {
    /// Platform the creator was found on
    pub platform: Platform,
    /// Opaque identifier, unique within the platform
    pub platform_id: String,
    /// Human-readable channel or account name
    pub display_name: String,
    /// Avatar or channel thumbnail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Subscribers (YouTube) or followers (everything else)
    #[serde(default)]
    pub follower_count: u64,
    /// Title of the most recent post or video, when the platform reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_item_title: Option<String>,
    /// Number of published items (videos, media posts)
    #[serde(default)]
    pub item_count: u64,
    /// Platform interaction total (YouTube views, TikTok likes)
    #[serde(default)]
    pub interaction_count: u64,
}

impl CreatorEntry {
    /// Creates an entry with only the identifying fields set
    pub fn new(
        platform: Platform,
        platform_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            platform_id: platform_id.into(),
            display_name: display_name.into(),
            thumbnail_url: None,
            follower_count: 0,
            recent_item_title: None,
            item_count: 0,
            interaction_count: 0,
        }
    }
}

/// Where the entries of an [`AggregationResult`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResultSource {
    /// Fresh results from the platform APIs
    Live,
    /// A still-valid merged result from the cache
    Cache,
    /// An expired cache entry served by the fallback policy
    StaleCache {
        #[serde(rename = "ageSecs")]
        age_secs: u64,
    },
    /// Synthetic data from the demo generator
    Demo,
}

/// Public output of an aggregation call
///
/// `entries` is always present. An empty list with no advisory means the
/// platforms confirmed there are no matches; an empty list with an advisory
/// means the answer could not be determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    /// Category exactly as requested
    pub category: String,
    /// Ranked entries, best first, never longer than the requested limit
    pub entries: Vec<CreatorEntry>,
    /// Explanation attached to degraded results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
    /// Provenance of `entries`
    pub source: ResultSource,
    /// Whether a platform rate limit caused the degradation
    #[serde(default)]
    pub rate_limited: bool,
}

impl AggregationResult {
    /// HTTP status the web layer should answer with: 429 when a quota was hit,
    /// 200 otherwise (the advisory travels in the body)
    pub fn http_status(&self) -> u16 {
        if self.rate_limited {
            429
        } else {
            200
        }
    }

    /// Returns a copy restricted to one platform, preserving rank order
    pub fn for_platform(&self, platform: Platform) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|entry| entry.platform == platform)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> AggregationResult {
        let mut yt = CreatorEntry::new(Platform::YouTube, "UC1", "Gamer One");
        yt.follower_count = 900;
        let mut ig = CreatorEntry::new(Platform::Instagram, "17841", "insta_gamer");
        ig.follower_count = 500;

        AggregationResult {
            category: "gaming".to_string(),
            entries: vec![yt, ig],
            advisory: None,
            source: ResultSource::Live,
            rate_limited: false,
        }
    }

    #[test]
    fn test_platform_names_roundtrip() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_name(platform.as_str()), Some(platform));
            assert_eq!(platform.to_string(), platform.as_str());
        }
    }

    #[test]
    fn test_platform_aliases() {
        assert_eq!(Platform::from_name("YT"), Some(Platform::YouTube));
        assert_eq!(Platform::from_name(" insta "), Some(Platform::Instagram));
        assert_eq!(Platform::from_name("tt"), Some(Platform::TikTok));
        assert_eq!(Platform::from_name("myspace"), None);
    }

    #[test]
    fn test_creator_entry_serializes_camel_case() {
        let mut entry = CreatorEntry::new(Platform::YouTube, "UCabc", "Channel");
        entry.follower_count = 42;

        let json = serde_json::to_value(&entry).expect("Failed to serialize entry");

        assert_eq!(json["platform"], "youtube");
        assert_eq!(json["platformId"], "UCabc");
        assert_eq!(json["followerCount"], 42);
        assert!(json.get("thumbnailUrl").is_none());
    }

    #[test]
    fn test_http_status_reflects_rate_limit() {
        let mut result = sample_result();
        assert_eq!(result.http_status(), 200);

        result.rate_limited = true;
        result.advisory = Some("quota exceeded".to_string());
        assert_eq!(result.http_status(), 429);
    }

    #[test]
    fn test_for_platform_keeps_order_and_metadata() {
        let mut result = sample_result();
        result.advisory = Some("showing cached results (10s old)".to_string());

        let filtered = result.for_platform(Platform::Instagram);

        assert_eq!(filtered.entries.len(), 1);
        assert_eq!(filtered.entries[0].platform_id, "17841");
        assert_eq!(filtered.advisory, result.advisory);
        assert_eq!(filtered.category, "gaming");
    }

    #[test]
    fn test_result_source_serialization() {
        let json = serde_json::to_value(ResultSource::StaleCache { age_secs: 7200 })
            .expect("Failed to serialize source");
        assert_eq!(json["kind"], "staleCache");
        assert_eq!(json["ageSecs"], 7200);
        assert!(json.get("age_secs").is_none());
    }
}
