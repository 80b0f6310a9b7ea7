//! Instagram Graph API client
//!
//! Searches creator accounts for a category through the business discovery
//! search endpoint and reads follower and media counts per account.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::fetcher::{de_count, detail_cache_key, fetch_with_cache, search_cache_key, send_json};
use super::{CreatorEntry, Fetched, Platform, PlatformError, PlatformFetcher};
use crate::cache::CacheStore;

/// Base URL for the Instagram Graph API
pub const INSTAGRAM_BASE_URL: &str = "https://graph.instagram.com";

const SEARCH_FIELDS: &str = "id,username,name,profile_picture_url";
const DETAIL_FIELDS: &str = "id,username,name,profile_picture_url,followers_count,media_count";

/// Graph API throttling error codes (application, user, page and call-count limits)
const RATE_LIMIT_CODES: [i64; 5] = [4, 17, 32, 613, 80_002];

/// Credentials and endpoint for the Instagram client
#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub base_url: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            access_token: None,
            base_url: INSTAGRAM_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profile_picture_url: Option<String>,
    #[serde(default, deserialize_with = "de_count")]
    followers_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    media_count: u64,
}

impl Account {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.username.clone())
            .unwrap_or_default()
    }
}

/// Client for the Instagram Graph API
#[derive(Debug, Clone)]
pub struct InstagramClient {
    http_client: Client,
    config: InstagramConfig,
    cache: Option<CacheStore<Value>>,
}

impl InstagramClient {
    pub fn new(
        http_client: Client,
        config: InstagramConfig,
        cache: Option<CacheStore<Value>>,
    ) -> Self {
        Self {
            http_client,
            config,
            cache,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), PlatformError> {
        let user_id = self
            .config
            .user_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(PlatformError::MissingCredentials("INSTAGRAM_USER_ID"))?;
        let token = self
            .config
            .access_token
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(PlatformError::MissingCredentials("INSTAGRAM_ACCESS_TOKEN"))?;
        Ok((user_id, token))
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    async fn search(&self, category: &str, count: usize) -> Result<Value, PlatformError> {
        let (user_id, token) = self.credentials()?;
        let limit = count.to_string();
        let request = self.http_client.get(self.endpoint("hashtag_search")).query(&[
            ("user_id", user_id),
            ("q", category),
            ("limit", limit.as_str()),
            ("fields", SEARCH_FIELDS),
            ("access_token", token),
        ]);

        send_json(request, "instagram search", is_rate_limit_error).await
    }

    async fn account(&self, account_id: &str) -> Result<Value, PlatformError> {
        let (_, token) = self.credentials()?;
        let request = self
            .http_client
            .get(self.endpoint(account_id))
            .query(&[("fields", DETAIL_FIELDS), ("access_token", token)]);

        send_json(request, "instagram account", is_rate_limit_error).await
    }
}

/// Graph API reports throttling through `error.code`, usually with HTTP 400 or 403
fn is_rate_limit_error(_status: StatusCode, body: &Value) -> bool {
    body.pointer("/error/code")
        .and_then(Value::as_i64)
        .is_some_and(|code| RATE_LIMIT_CODES.contains(&code))
}

fn has_no_accounts(payload: &Value) -> bool {
    payload
        .get("data")
        .and_then(Value::as_array)
        .map_or(true, Vec::is_empty)
}

#[async_trait]
impl PlatformFetcher for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn fetch_top_by_category(&self, category: &str, limit: usize) -> Fetched {
        let key = search_cache_key(Platform::Instagram, category, limit);
        fetch_with_cache(
            self.cache.as_ref(),
            Platform::Instagram,
            &key,
            self.search(category, limit),
            has_no_accounts,
        )
        .await
    }

    async fn fetch_detail(&self, platform_id: &str) -> Fetched {
        let key = detail_cache_key(Platform::Instagram, platform_id);
        fetch_with_cache(
            self.cache.as_ref(),
            Platform::Instagram,
            &key,
            self.account(platform_id),
            |payload| payload.get("id").is_none(),
        )
        .await
    }

    fn normalize(&self, payload: &Value) -> Vec<CreatorEntry> {
        let response: SearchResponse = match serde_json::from_value(payload.clone()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(platform = "instagram", error = %e, "unexpected search payload");
                return Vec::new();
            }
        };

        response
            .data
            .into_iter()
            .filter(|account| !account.id.is_empty())
            .map(|account| {
                let name = account.display_name();
                let mut entry = CreatorEntry::new(Platform::Instagram, account.id.clone(), name);
                entry.thumbnail_url = account.profile_picture_url;
                entry.follower_count = account.followers_count;
                entry.item_count = account.media_count;
                entry
            })
            .collect()
    }

    fn apply_detail(&self, entry: &mut CreatorEntry, payload: &Value) {
        let account: Account = match serde_json::from_value(payload.clone()) {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(platform = "instagram", error = %e, "unexpected account payload");
                return;
            }
        };
        if account.id != entry.platform_id {
            return;
        }

        entry.follower_count = account.followers_count;
        entry.item_count = account.media_count;
        if entry.display_name.is_empty() {
            entry.display_name = account.display_name();
        }
        if entry.thumbnail_url.is_none() {
            entry.thumbnail_url = account.profile_picture_url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fetcher::http_client;
    use crate::data::FetchOutcome;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, configured: bool) -> InstagramClient {
        let config = InstagramConfig {
            user_id: configured.then(|| "1784".to_string()),
            access_token: configured.then(|| "token".to_string()),
            base_url: base_url.to_string(),
        };
        InstagramClient::new(http_client(Duration::from_secs(5)).expect("client"), config, None)
    }

    #[test]
    fn test_rate_limit_codes() {
        assert!(is_rate_limit_error(
            StatusCode::BAD_REQUEST,
            &json!({"error": {"code": 4, "message": "Application request limit reached"}})
        ));
        assert!(!is_rate_limit_error(
            StatusCode::BAD_REQUEST,
            &json!({"error": {"code": 190, "message": "Invalid OAuth access token"}})
        ));
    }

    #[test]
    fn test_normalize_prefers_name_over_username() {
        let client = test_client("http://unused", true);
        let payload = json!({
            "data": [
                {
                    "id": "1",
                    "username": "cook_daily",
                    "name": "Daily Cook",
                    "followers_count": 1200
                },
                {"id": "2", "username": "bakes"},
                {"id": "", "username": "broken"}
            ]
        });

        let entries = client.normalize(&payload);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].display_name, "Daily Cook");
        assert_eq!(entries[0].follower_count, 1200);
        assert_eq!(entries[1].display_name, "bakes");
    }

    #[test]
    fn test_apply_detail_ignores_other_accounts() {
        let client = test_client("http://unused", true);
        let mut entry = CreatorEntry::new(Platform::Instagram, "1", "Daily Cook");

        client.apply_detail(&mut entry, &json!({"id": "2", "followers_count": 99}));
        assert_eq!(entry.follower_count, 0);

        let detail = json!({"id": "1", "followers_count": "5000", "media_count": 40});
        client.apply_detail(&mut entry, &detail);
        assert_eq!(entry.follower_count, 5000);
        assert_eq!(entry.item_count, 40);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_config_error() {
        let client = test_client("http://unused", false);
        let fetched = client.fetch_top_by_category("cooking", 5).await;
        assert_eq!(fetched.outcome, FetchOutcome::ConfigError);
    }

    #[tokio::test]
    async fn test_throttled_search_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hashtag_search"))
            .and(query_param("q", "cooking"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 32, "message": "Page request limit reached"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), true);
        let fetched = client.fetch_top_by_category("cooking", 5).await;

        assert_eq!(fetched.outcome, FetchOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_detail_requests_minimal_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1"))
            .and(query_param("fields", DETAIL_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1", "followers_count": 321, "media_count": 12
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), true);
        let fetched = client.fetch_detail("1").await;

        assert_eq!(fetched.outcome, FetchOutcome::Ok);
        assert_eq!(fetched.payload["followers_count"], 321);
    }
}
