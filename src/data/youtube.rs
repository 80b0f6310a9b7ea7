//! YouTube Data API v3 client
//!
//! Searches channels by category with `search?type=channel` and enriches each
//! channel with `channels?part=statistics`. Both calls request only the fields
//! the ranking needs through the `fields` mask.
//!
//! `recent_item_title` stays unset for YouTube entries; the latest upload
//! would need one more `playlistItems` call per channel.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::fetcher::{de_count, detail_cache_key, fetch_with_cache, search_cache_key, send_json};
use super::{CreatorEntry, FetchOutcome, Fetched, Platform, PlatformError, PlatformFetcher};
use crate::cache::CacheStore;

/// Base URL for the YouTube Data API
pub const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube caps `maxResults` at 50
pub const MAX_RESULTS: usize = 50;

const SEARCH_FIELDS: &str =
    "items(id/channelId,snippet(title,channelTitle,thumbnails/default/url))";
const CHANNEL_FIELDS: &str = concat!(
    "items(id,snippet(title,thumbnails/default/url),",
    "statistics(subscriberCount,viewCount,videoCount))"
);

/// Error reasons YouTube uses for quota and rate limits
const QUOTA_REASONS: [&str; 5] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "servingLimitExceeded",
];

/// Credentials and endpoint for the YouTube client
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: YOUTUBE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct SearchId {
    #[serde(rename = "channelId")]
    channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "channelTitle")]
    channel_title: Option<String>,
    #[serde(default)]
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    #[serde(default)]
    snippet: Option<Snippet>,
    #[serde(default)]
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default, deserialize_with = "de_count")]
    subscriber_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    view_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    video_count: u64,
}

impl Snippet {
    fn thumbnail_url(&self) -> Option<String> {
        self.thumbnails
            .as_ref()
            .and_then(|t| t.default.as_ref())
            .map(|t| t.url.clone())
            .filter(|url| !url.is_empty())
    }
}

/// Client for the YouTube Data API
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http_client: Client,
    config: YouTubeConfig,
    /// Platform payload cache, separate from the merged-result cache
    cache: Option<CacheStore<Value>>,
}

impl YouTubeClient {
    pub fn new(
        http_client: Client,
        config: YouTubeConfig,
        cache: Option<CacheStore<Value>>,
    ) -> Self {
        Self {
            http_client,
            config,
            cache,
        }
    }

    fn api_key(&self) -> Result<&str, PlatformError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(PlatformError::MissingCredentials("YOUTUBE_API_KEY"))
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    async fn search(&self, category: &str, count: usize) -> Result<Value, PlatformError> {
        let key = self.api_key()?;
        let max_results = count.clamp(1, MAX_RESULTS).to_string();
        let request = self.http_client.get(self.endpoint("search")).query(&[
            ("part", "snippet"),
            ("type", "channel"),
            ("q", category),
            ("maxResults", max_results.as_str()),
            ("fields", SEARCH_FIELDS),
            ("key", key),
        ]);

        send_json(request, "youtube search", is_quota_error).await
    }

    async fn channel(&self, channel_id: &str) -> Result<Value, PlatformError> {
        let key = self.api_key()?;
        let request = self.http_client.get(self.endpoint("channels")).query(&[
            ("part", "snippet,statistics"),
            ("id", channel_id),
            ("fields", CHANNEL_FIELDS),
            ("key", key),
        ]);

        send_json(request, "youtube channels", is_quota_error).await
    }
}

/// Whether an error body is one of YouTube's quota errors
///
/// Quota errors arrive as HTTP 403 with a reason in `error.errors[]`, which
/// is what separates them from a plain permission failure.
fn is_quota_error(status: StatusCode, body: &Value) -> bool {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return false;
    }

    body.pointer("/error/errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors.iter().any(|e| {
                e.get("reason")
                    .and_then(Value::as_str)
                    .is_some_and(|reason| QUOTA_REASONS.contains(&reason))
            })
        })
}

fn has_no_items(payload: &Value) -> bool {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map_or(true, Vec::is_empty)
}

#[async_trait]
impl PlatformFetcher for YouTubeClient {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn fetch_top_by_category(&self, category: &str, limit: usize) -> Fetched {
        let key = search_cache_key(Platform::YouTube, category, limit);
        fetch_with_cache(
            self.cache.as_ref(),
            Platform::YouTube,
            &key,
            self.search(category, limit),
            has_no_items,
        )
        .await
    }

    async fn fetch_detail(&self, platform_id: &str) -> Fetched {
        let key = detail_cache_key(Platform::YouTube, platform_id);
        let fetched = fetch_with_cache(
            self.cache.as_ref(),
            Platform::YouTube,
            &key,
            self.channel(platform_id),
            has_no_items,
        )
        .await;

        if fetched.outcome == FetchOutcome::Empty {
            tracing::debug!(channel_id = platform_id, "channel not found");
        }
        fetched
    }

    fn normalize(&self, payload: &Value) -> Vec<CreatorEntry> {
        let response: SearchResponse = match serde_json::from_value(payload.clone()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(platform = "youtube", error = %e, "unexpected search payload");
                return Vec::new();
            }
        };

        response
            .items
            .into_iter()
            .filter_map(|item| {
                let channel_id = item.id.channel_id.filter(|id| !id.is_empty())?;
                let snippet = item.snippet.unwrap_or_default();
                let title = if snippet.title.is_empty() {
                    snippet.channel_title.clone().unwrap_or_default()
                } else {
                    snippet.title.clone()
                };

                let mut entry = CreatorEntry::new(Platform::YouTube, channel_id, title);
                entry.thumbnail_url = snippet.thumbnail_url();
                Some(entry)
            })
            .collect()
    }

    fn apply_detail(&self, entry: &mut CreatorEntry, payload: &Value) {
        let response: ChannelsResponse = match serde_json::from_value(payload.clone()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(platform = "youtube", error = %e, "unexpected channels payload");
                return;
            }
        };

        let Some(channel) = response.items.into_iter().find(|c| c.id == entry.platform_id) else {
            return;
        };

        if let Some(stats) = channel.statistics {
            entry.follower_count = stats.subscriber_count;
            entry.interaction_count = stats.view_count;
            entry.item_count = stats.video_count;
        }
        if let Some(snippet) = channel.snippet {
            if entry.thumbnail_url.is_none() {
                entry.thumbnail_url = snippet.thumbnail_url();
            }
            if entry.display_name.is_empty() {
                entry.display_name = snippet.title;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fetcher::http_client;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, api_key: Option<&str>) -> YouTubeClient {
        YouTubeClient::new(
            http_client(Duration::from_secs(5)).expect("client"),
            YouTubeConfig {
                api_key: api_key.map(str::to_string),
                base_url: base_url.to_string(),
            },
            Some(CacheStore::in_memory(Duration::from_secs(60))),
        )
    }

    fn quota_body() -> Value {
        json!({
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{"domain": "youtube.quota", "reason": "quotaExceeded"}]
            }
        })
    }

    #[test]
    fn test_quota_detection() {
        assert!(is_quota_error(StatusCode::FORBIDDEN, &quota_body()));
        assert!(!is_quota_error(
            StatusCode::FORBIDDEN,
            &json!({"error": {"errors": [{"reason": "forbidden"}]}})
        ));
        assert!(!is_quota_error(StatusCode::INTERNAL_SERVER_ERROR, &quota_body()));
    }

    #[test]
    fn test_normalize_search_payload() {
        let client = test_client("http://unused", Some("k"));
        let payload = json!({
            "items": [
                {
                    "id": {"channelId": "UC1"},
                    "snippet": {"title": "One", "thumbnails": {"default": {"url": "https://img/1"}}}
                },
                {"id": {"channelId": "UC2"}, "snippet": {"title": "", "channelTitle": "Two"}},
                {"id": {}, "snippet": {"title": "video result without channel"}}
            ]
        });

        let entries = client.normalize(&payload);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].platform_id, "UC1");
        assert_eq!(entries[0].thumbnail_url.as_deref(), Some("https://img/1"));
        assert_eq!(entries[1].display_name, "Two");
        assert!(entries.iter().all(|e| e.platform == Platform::YouTube));
    }

    #[test]
    fn test_apply_detail_reads_string_statistics() {
        let client = test_client("http://unused", Some("k"));
        let mut entry = CreatorEntry::new(Platform::YouTube, "UC1", "One");
        let payload = json!({
            "items": [{
                "id": "UC1",
                "snippet": {"title": "One", "thumbnails": {"default": {"url": "https://img/1"}}},
                "statistics": {"subscriberCount": "900", "viewCount": "45000", "videoCount": "30"}
            }]
        });

        client.apply_detail(&mut entry, &payload);

        assert_eq!(entry.follower_count, 900);
        assert_eq!(entry.interaction_count, 45_000);
        assert_eq!(entry.item_count, 30);
        assert_eq!(entry.thumbnail_url.as_deref(), Some("https://img/1"));
        assert_eq!(entry.recent_item_title, None);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), None);
        let fetched = client.fetch_top_by_category("gaming", 5).await;

        assert_eq!(fetched.outcome, FetchOutcome::ConfigError);
    }

    #[tokio::test]
    async fn test_search_sends_field_mask_and_caches_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "gaming"))
            .and(query_param("type", "channel"))
            .and(query_param("maxResults", "5"))
            .and(query_param("fields", SEARCH_FIELDS))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": {"channelId": "UC1"}, "snippet": {"title": "One"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), Some("test-key"));
        let first = client.fetch_top_by_category("gaming", 5).await;
        let second = client.fetch_top_by_category("gaming", 5).await;

        assert_eq!(first.outcome, FetchOutcome::Ok);
        assert_eq!(second.outcome, FetchOutcome::Ok);
        assert_eq!(client.normalize(&second.payload).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_search_reports_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), Some("test-key"));
        let fetched = client.fetch_top_by_category("nothing-here", 5).await;

        assert_eq!(fetched.outcome, FetchOutcome::Empty);
    }

    #[tokio::test]
    async fn test_quota_error_reports_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_json(quota_body()))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), Some("test-key"));
        let fetched = client.fetch_top_by_category("gaming", 5).await;

        assert_eq!(fetched.outcome, FetchOutcome::RateLimited);
        assert!(fetched.detail.unwrap_or_default().contains("quota"));
    }

    #[tokio::test]
    async fn test_plain_forbidden_is_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": 403,
                    "message": "API key not valid",
                    "errors": [{"reason": "forbidden"}]
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), Some("bad-key"));
        let fetched = client.fetch_detail("UC1").await;

        assert_eq!(fetched.outcome, FetchOutcome::ConfigError);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), Some("test-key"));
        let fetched = client.fetch_top_by_category("gaming", 5).await;

        assert_eq!(fetched.outcome, FetchOutcome::TransientError);
    }
}
