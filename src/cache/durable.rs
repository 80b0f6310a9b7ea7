//! Durable cache tier persisting entries to disk
//!
//! Stores one JSON file per cache key, holding the storage timestamp, TTL and
//! payload, so cached rankings survive a restart and stay available to the
//! fallback policy while the platform APIs are unavailable.

use directories::ProjectDirs;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use super::CacheEntry;

/// Bytes left unencoded in file names; everything else is percent-encoded
const FILE_NAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Errors from the durable tier
///
/// These never reach the caller of an aggregation: the store logs them and
/// carries on with the in-memory tier.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a cache file failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A cache file could not be encoded or decoded
    #[error("cache record is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    /// The read did not finish within the configured bound
    #[error("durable cache read timed out after {0} ms")]
    Timeout(u64),
}

/// Only the bookkeeping fields of a record, used by the sweep
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordHeader {
    stored_at_epoch_seconds: i64,
    ttl_seconds: u64,
}

/// Reads and writes cache entries as JSON files in one directory
///
/// The default location is the XDG cache directory (`~/.cache/topcreators/`
/// on Linux).
#[derive(Debug, Clone)]
pub struct DiskCache {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl DiskCache {
    /// Creates a DiskCache in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "topcreators")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a DiskCache rooted at a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic, collision-free file name for a cache key
    ///
    /// Percent-encoding is injective, so distinct keys never share a file.
    pub fn file_name(key: &str) -> String {
        format!("{}.json", utf8_percent_encode(key, FILE_NAME_SAFE))
    }

    /// Returns the path to the cache file for the given key
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(Self::file_name(key))
    }

    /// Writes an entry, replacing any previous record for the key
    ///
    /// The record is written to a temporary file and renamed into place, so a
    /// concurrent reader sees either the old or the new record. Concurrent
    /// writers to the same key resolve as last write wins.
    pub async fn write<T: Serialize>(
        &self,
        key: &str,
        entry: &CacheEntry<T>,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).await?;

        let json = serde_json::to_vec_pretty(entry)?;
        let path = self.cache_path(key);
        let tmp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));

        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Reads the entry for a key
    ///
    /// Returns `Ok(None)` if no record exists. Expired records are returned
    /// as-is; freshness is decided by the caller.
    pub async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CacheEntry<T>>, CacheError> {
        let content = match fs::read(self.cache_path(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Deletes every record whose remaining TTL is zero or less
    ///
    /// Unreadable records are deleted too, since they can never be served.
    pub async fn remove_expired(&self, now: i64) -> Result<usize, CacheError> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let expired = match fs::read(&path).await {
                Ok(content) => match serde_json::from_slice::<RecordHeader>(&content) {
                    Ok(header) => {
                        let stored_at = header.stored_at_epoch_seconds;
                        let record = CacheEntry::stored_at((), stored_at, header.ttl_seconds);
                        record.remaining_ttl(now) <= 0
                    }
                    Err(_) => true,
                },
                Err(_) => continue,
            };

            if expired {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to delete expired cache file"
                    ),
                }
            }
        }

        Ok(removed)
    }
}
