//! Runtime settings loaded from the environment
//!
//! Every value has a default except platform credentials. A missing
//! credential is not an error here: the affected platform reports a
//! configuration failure when it is queried and the others keep working.

use std::env::VarError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::aggregator::{Aggregator, AggregatorSettings};
use crate::cache::{CacheSettings, CacheStore, DiskCache};
use crate::data::fetcher::http_client;
use crate::data::instagram::{InstagramConfig, INSTAGRAM_BASE_URL};
use crate::data::tiktok::{TikTokConfig, TIKTOK_BASE_URL};
use crate::data::youtube::{YouTubeConfig, YOUTUBE_BASE_URL};
use crate::data::{InstagramClient, PlatformError, PlatformFetcher, TikTokClient, YouTubeClient};

/// Subdirectory of the cache root holding merged results
const RESULTS_SUBDIR: &str = "results";
/// Subdirectory of the cache root holding raw platform payloads
const PLATFORM_SUBDIR: &str = "platform";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] PlatformError),
}

/// Everything needed to wire up an [`Aggregator`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_ttl: Duration,
    pub platform_cache_ttl: Duration,
    pub demo_cache_ttl: Duration,
    pub stale_limit: Duration,
    pub request_timeout: Duration,
    pub task_timeout: Duration,
    pub durable_timeout: Duration,
    /// Durable tier root; `None` when no cache directory can be determined
    pub cache_dir: Option<PathBuf>,
    pub youtube: YouTubeConfig,
    pub instagram: InstagramConfig,
    pub tiktok: TikTokConfig,
}

/// Loads settings, reading a `.env` file first when one exists
pub fn load_settings() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();
    load_settings_from_env()
}

/// Loads settings from the process environment only
pub fn load_settings_from_env() -> Result<Settings, ConfigError> {
    build_settings(|key| std::env::var(key))
}

fn build_settings<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional =
        |var: &str| -> Option<String> { lookup(var).ok().filter(|v| !v.trim().is_empty()) };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let secs = |var: &str, default: &str| parse_u64(var, default).map(Duration::from_secs);

    let request_timeout = secs("TOPCREATORS_REQUEST_TIMEOUT_SECS", "10")?;
    if request_timeout.is_zero() {
        return Err(ConfigError::InvalidEnvVar {
            var: "TOPCREATORS_REQUEST_TIMEOUT_SECS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let cache_dir = optional("TOPCREATORS_CACHE_DIR")
        .map(PathBuf::from)
        .or_else(|| DiskCache::new().map(|disk| disk.dir().to_path_buf()));

    Ok(Settings {
        cache_ttl: secs("TOPCREATORS_CACHE_TTL_SECS", "3600")?,
        platform_cache_ttl: secs("TOPCREATORS_PLATFORM_CACHE_TTL_SECS", "3600")?,
        demo_cache_ttl: secs("TOPCREATORS_DEMO_CACHE_TTL_SECS", "60")?,
        stale_limit: secs("TOPCREATORS_STALE_LIMIT_SECS", "604800")?,
        request_timeout,
        task_timeout: secs("TOPCREATORS_TASK_TIMEOUT_SECS", "30")?,
        durable_timeout: Duration::from_millis(parse_u64("TOPCREATORS_DURABLE_TIMEOUT_MS", "500")?),
        cache_dir,
        youtube: YouTubeConfig {
            api_key: optional("YOUTUBE_API_KEY"),
            base_url: or_default("YOUTUBE_BASE_URL", YOUTUBE_BASE_URL),
        },
        instagram: InstagramConfig {
            user_id: optional("INSTAGRAM_USER_ID"),
            access_token: optional("INSTAGRAM_ACCESS_TOKEN"),
            base_url: or_default("INSTAGRAM_BASE_URL", INSTAGRAM_BASE_URL),
        },
        tiktok: TikTokConfig {
            access_token: optional("TIKTOK_ACCESS_TOKEN"),
            base_url: or_default("TIKTOK_BASE_URL", TIKTOK_BASE_URL),
        },
    })
}

impl Settings {
    fn cache_settings(&self, ttl: Duration) -> CacheSettings {
        CacheSettings {
            ttl,
            stale_limit: self.stale_limit,
            durable_timeout: self.durable_timeout,
        }
    }

    fn disk(&self, subdir: &str) -> Option<DiskCache> {
        self.cache_dir
            .as_ref()
            .map(|root| DiskCache::with_dir(root.join(subdir)))
    }

    /// Builds the aggregator with all three platform clients, a merged
    /// result cache and a platform payload cache
    pub fn build_aggregator(&self) -> Result<Aggregator, ConfigError> {
        let client = http_client(self.request_timeout)?;
        let platform_cache = CacheStore::new(
            self.cache_settings(self.platform_cache_ttl),
            self.disk(PLATFORM_SUBDIR),
        );
        let results_cache = CacheStore::new(
            self.cache_settings(self.cache_ttl),
            self.disk(RESULTS_SUBDIR),
        );

        let fetchers: Vec<Arc<dyn PlatformFetcher>> = vec![
            Arc::new(YouTubeClient::new(
                client.clone(),
                self.youtube.clone(),
                Some(platform_cache.clone()),
            )),
            Arc::new(InstagramClient::new(
                client.clone(),
                self.instagram.clone(),
                Some(platform_cache.clone()),
            )),
            Arc::new(TikTokClient::new(client, self.tiktok.clone(), Some(platform_cache.clone()))),
        ];

        if self.cache_dir.is_none() {
            tracing::warn!("no cache directory available; running with the memory tier only");
        }

        Ok(Aggregator::new(fetchers, results_cache)
            .with_platform_cache(platform_cache)
            .with_settings(AggregatorSettings {
                demo_ttl: self.demo_cache_ttl,
                task_timeout: self.task_timeout,
            }))
    }
}
