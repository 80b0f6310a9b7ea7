//! TikTok API client
//!
//! Uses the research user search for candidates and `user/info` for follower,
//! like and video counts. TikTok wraps every response in an `error` object
//! whose `code` is `"ok"` on success, so application errors can arrive with
//! HTTP 200 and are classified from the body.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::fetcher::{de_count, detail_cache_key, fetch_with_cache, search_cache_key, send_json};
use super::{CreatorEntry, Fetched, Platform, PlatformError, PlatformFetcher};
use crate::cache::CacheStore;

/// Base URL for the TikTok API
pub const TIKTOK_BASE_URL: &str = "https://open.tiktokapis.com/v2";

const SEARCH_FIELDS: &str = "username,display_name,avatar_url";
const DETAIL_FIELDS: &str =
    "username,display_name,avatar_url,follower_count,likes_count,video_count";

const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";
const AUTH_ERROR_CODES: [&str; 3] = [
    "access_token_invalid",
    "scope_not_authorized",
    "scope_permission_missed",
];

/// Credentials and endpoint for the TikTok client
#[derive(Debug, Clone)]
pub struct TikTokConfig {
    pub access_token: Option<String>,
    pub base_url: String,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: TIKTOK_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailData {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default, deserialize_with = "de_count")]
    follower_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    likes_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    video_count: u64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
}

/// Client for the TikTok API
#[derive(Debug, Clone)]
pub struct TikTokClient {
    http_client: Client,
    config: TikTokConfig,
    cache: Option<CacheStore<Value>>,
}

impl TikTokClient {
    pub fn new(
        http_client: Client,
        config: TikTokConfig,
        cache: Option<CacheStore<Value>>,
    ) -> Self {
        Self {
            http_client,
            config,
            cache,
        }
    }

    fn token(&self) -> Result<&str, PlatformError> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(PlatformError::MissingCredentials("TIKTOK_ACCESS_TOKEN"))
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    async fn search(&self, category: &str, count: usize) -> Result<Value, PlatformError> {
        let token = self.token()?;
        let max_count = count.to_string();
        let request = self
            .http_client
            .get(self.endpoint("research/user/search/"))
            .bearer_auth(token)
            .query(&[
                ("keywords", category),
                ("max_count", max_count.as_str()),
                ("fields", SEARCH_FIELDS),
            ]);

        check_envelope(send_json(request, "tiktok search", is_rate_limit_error).await?)
    }

    async fn user(&self, username: &str) -> Result<Value, PlatformError> {
        let token = self.token()?;
        let request = self
            .http_client
            .get(self.endpoint("user/info/"))
            .bearer_auth(token)
            .query(&[("username", username), ("fields", DETAIL_FIELDS)]);

        check_envelope(send_json(request, "tiktok user info", is_rate_limit_error).await?)
    }
}

fn error_code(body: &Value) -> Option<&str> {
    body.pointer("/error/code").and_then(Value::as_str)
}

fn is_rate_limit_error(_status: StatusCode, body: &Value) -> bool {
    error_code(body) == Some(RATE_LIMIT_CODE)
}

/// Turns a non-`ok` error code in a 2xx body into a [`PlatformError`]
fn check_envelope(body: Value) -> Result<Value, PlatformError> {
    let code = match error_code(&body) {
        None | Some("ok") => return Ok(body),
        Some(code) => code.to_string(),
    };
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Err(if code == RATE_LIMIT_CODE {
        PlatformError::RateLimited(message.to_string())
    } else if AUTH_ERROR_CODES.contains(&code.as_str()) {
        PlatformError::Rejected {
            status: 401,
            message: format!("{code}: {message}"),
        }
    } else {
        PlatformError::Api(format!("{code}: {message}"))
    })
}

fn has_no_users(payload: &Value) -> bool {
    payload
        .pointer("/data/users")
        .and_then(Value::as_array)
        .map_or(true, Vec::is_empty)
}

fn to_entry(user: User) -> CreatorEntry {
    let display_name = user
        .display_name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| user.username.clone());
    let mut entry = CreatorEntry::new(Platform::TikTok, user.username, display_name);
    entry.thumbnail_url = user.avatar_url;
    entry.follower_count = user.follower_count;
    entry.interaction_count = user.likes_count;
    entry.item_count = user.video_count;
    entry
}

#[async_trait]
impl PlatformFetcher for TikTokClient {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn fetch_top_by_category(&self, category: &str, limit: usize) -> Fetched {
        let key = search_cache_key(Platform::TikTok, category, limit);
        fetch_with_cache(
            self.cache.as_ref(),
            Platform::TikTok,
            &key,
            self.search(category, limit),
            has_no_users,
        )
        .await
    }

    async fn fetch_detail(&self, platform_id: &str) -> Fetched {
        let key = detail_cache_key(Platform::TikTok, platform_id);
        fetch_with_cache(
            self.cache.as_ref(),
            Platform::TikTok,
            &key,
            self.user(platform_id),
            |payload| payload.pointer("/data/user").map_or(true, Value::is_null),
        )
        .await
    }

    fn normalize(&self, payload: &Value) -> Vec<CreatorEntry> {
        match serde_json::from_value::<Envelope<SearchData>>(payload.clone()) {
            Ok(envelope) => envelope
                .data
                .unwrap_or_default()
                .users
                .into_iter()
                .filter(|user| !user.username.is_empty())
                .map(to_entry)
                .collect(),
            Err(e) => {
                tracing::warn!(platform = "tiktok", error = %e, "unexpected search payload");
                Vec::new()
            }
        }
    }

    fn apply_detail(&self, entry: &mut CreatorEntry, payload: &Value) {
        let user = match serde_json::from_value::<Envelope<DetailData>>(payload.clone()) {
            Ok(envelope) => envelope.data.unwrap_or_default().user,
            Err(e) => {
                tracing::warn!(platform = "tiktok", error = %e, "unexpected user info payload");
                None
            }
        };
        let Some(user) = user.filter(|u| u.username == entry.platform_id) else {
            return;
        };

        let detailed = to_entry(user);
        entry.follower_count = detailed.follower_count;
        entry.interaction_count = detailed.interaction_count;
        entry.item_count = detailed.item_count;
        if entry.thumbnail_url.is_none() {
            entry.thumbnail_url = detailed.thumbnail_url;
        }
    }
}
