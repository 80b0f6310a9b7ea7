//! Platform fetcher contract and shared HTTP plumbing
//!
//! Every platform client implements [`PlatformFetcher`]: a search call that
//! returns candidate creators for a category and a detail call that returns
//! audience metrics for one creator. Calls never fail with an error; they
//! report a [`FetchOutcome`] so the aggregator and fallback policy can branch
//! on structured state.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::{CreatorEntry, Platform};
use crate::cache::{CacheStore, KEY_SEPARATOR};

/// Maximum characters of an error body kept for logs
const ERROR_BODY_LIMIT: usize = 200;

/// Status of a single platform call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOutcome {
    /// The call succeeded and returned data
    Ok,
    /// The call succeeded but found nothing
    Empty,
    /// The provider refused the call because of a quota or rate limit
    RateLimited,
    /// Network failure, timeout, 5xx or malformed response
    TransientError,
    /// Missing or rejected credentials; permanent for this platform
    ConfigError,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Ok)
    }
}

/// Raw platform payload together with the outcome of the call
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Provider JSON document; `Value::Null` when the call failed
    pub payload: Value,
    pub outcome: FetchOutcome,
    /// Human-readable failure reason, for logs
    pub detail: Option<String>,
}

impl Fetched {
    pub fn ok(payload: Value) -> Self {
        Self {
            payload,
            outcome: FetchOutcome::Ok,
            detail: None,
        }
    }

    pub fn empty(payload: Value) -> Self {
        Self {
            payload,
            outcome: FetchOutcome::Empty,
            detail: None,
        }
    }

    pub fn failed(outcome: FetchOutcome, detail: impl Into<String>) -> Self {
        Self {
            payload: Value::Null,
            outcome,
            detail: Some(detail.into()),
        }
    }
}

impl From<PlatformError> for Fetched {
    fn from(err: PlatformError) -> Self {
        Self::failed(err.outcome(), err.to_string())
    }
}

/// Errors raised inside a platform client before they are folded into a
/// [`FetchOutcome`]
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network, TLS or timeout failure from the HTTP client
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A required credential is not configured
    #[error("missing credential: {0}")]
    MissingCredentials(&'static str),

    /// The provider reported a quota or rate limit
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider rejected the request as unauthorized or malformed
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Any other non-success HTTP status
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The provider returned an application-level error in a 2xx body
    #[error("API error: {0}")]
    Api(String),

    /// The response body did not match the provider schema
    #[error("failed to parse {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PlatformError {
    /// Maps the error onto the fetch outcome taxonomy
    pub fn outcome(&self) -> FetchOutcome {
        match self {
            PlatformError::RateLimited(_) => FetchOutcome::RateLimited,
            PlatformError::MissingCredentials(_) | PlatformError::Rejected { .. } => {
                FetchOutcome::ConfigError
            }
            PlatformError::Http(_)
            | PlatformError::Status { .. }
            | PlatformError::Api(_)
            | PlatformError::Deserialize { .. } => FetchOutcome::TransientError,
        }
    }
}

/// Capability shared by every platform client
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    /// Platform this fetcher talks to
    fn platform(&self) -> Platform;

    /// Searches for the top creators of a category
    async fn fetch_top_by_category(&self, category: &str, limit: usize) -> Fetched;

    /// Fetches audience metrics for one creator
    async fn fetch_detail(&self, platform_id: &str) -> Fetched;

    /// Turns a search payload into entries with identity fields filled in
    fn normalize(&self, payload: &Value) -> Vec<CreatorEntry>;

    /// Copies metrics from a detail payload into an entry
    fn apply_detail(&self, entry: &mut CreatorEntry, payload: &Value);
}

/// Builds the HTTP client shared by the platform fetchers
///
/// Every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<Client, PlatformError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("topcreators/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Cache key of a raw search payload
pub fn search_cache_key(platform: Platform, category: &str, count: usize) -> String {
    [platform.as_str(), "search", category, &count.to_string()].join(KEY_SEPARATOR)
}

/// Cache key of a raw detail payload
pub fn detail_cache_key(platform: Platform, platform_id: &str) -> String {
    [platform.as_str(), "detail", platform_id].join(KEY_SEPARATOR)
}

/// Runs a platform request with the platform payload cache in front of it
///
/// Only `Ok` payloads are cached. `is_empty` decides whether a successful
/// payload actually contains anything.
pub(crate) async fn fetch_with_cache<Fut>(
    cache: Option<&CacheStore<Value>>,
    platform: Platform,
    key: &str,
    request: Fut,
    is_empty: impl Fn(&Value) -> bool,
) -> Fetched
where
    Fut: Future<Output = Result<Value, PlatformError>>,
{
    if let Some(cache) = cache {
        if let Some(hit) = cache.get(key).await {
            tracing::debug!(platform = %platform, key, "platform payload cache hit");
            return Fetched::ok(hit.data);
        }
    }

    match request.await {
        Ok(payload) if is_empty(&payload) => Fetched::empty(payload),
        Ok(payload) => {
            if let Some(cache) = cache {
                cache.put(key, payload.clone()).await;
            }
            Fetched::ok(payload)
        }
        Err(e) => {
            tracing::warn!(platform = %platform, key, error = %e, "platform request failed");
            e.into()
        }
    }
}

/// Sends a request and decodes the JSON body
///
/// HTTP 429, or any error body for which `is_rate_limited` returns true,
/// becomes [`PlatformError::RateLimited`] so the caller never retries it.
pub(crate) async fn send_json(
    request: RequestBuilder,
    context: &str,
    is_rate_limited: fn(StatusCode, &Value) -> bool,
) -> Result<Value, PlatformError> {
    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&bytes).map_err(|source| PlatformError::Deserialize {
            context: context.to_string(),
            source,
        });
    }

    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    let message = error_message(&body, &bytes);

    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limited(status, &body) {
        return Err(PlatformError::RateLimited(message));
    }

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(PlatformError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
        _ => Err(PlatformError::Status {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Extracts `error.message` from a provider error body, or a prefix of the raw body
fn error_message(body: &Value, raw: &[u8]) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(raw).chars().take(ERROR_BODY_LIMIT).collect())
}

/// Deserializes a count that providers send either as a number or a string
pub(crate) fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
