//! Synthetic creator rankings used when no real data can be served
//!
//! Output depends only on the category and the requested count: no network,
//! no clock, no randomness beyond a seed derived from the category.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use super::{CreatorEntry, Platform};

const THUMBNAIL_BASE: &str = "https://dummyimage.com/120x90/000/fff&text=";

/// Lower bound of the follower count of the top demo entry
const BASE_FOLLOWERS: u64 = 1_000_000;

/// Deterministic generator of placeholder creator entries
#[derive(Debug, Clone)]
pub struct DemoDataGenerator {
    platforms: Vec<Platform>,
}

impl Default for DemoDataGenerator {
    fn default() -> Self {
        Self {
            platforms: Platform::ALL.to_vec(),
        }
    }
}

impl DemoDataGenerator {
    /// Generator that spreads entries round-robin over `platforms`
    ///
    /// An empty list falls back to every platform.
    pub fn with_platforms(platforms: Vec<Platform>) -> Self {
        if platforms.is_empty() {
            return Self::default();
        }
        Self { platforms }
    }

    /// Returns `count` entries for `category`, strictly descending by
    /// follower count
    pub fn generate(&self, category: &str, count: usize) -> Vec<CreatorEntry> {
        let label = category.trim();
        let top = BASE_FOLLOWERS + category_seed(label) % BASE_FOLLOWERS;
        let encoded = utf8_percent_encode(label, NON_ALPHANUMERIC).to_string();

        (0..count)
            .map(|i| {
                let n = i + 1;
                let platform = self.platforms[i % self.platforms.len()];
                let mut entry = CreatorEntry::new(
                    platform,
                    format!("demo-{}-{n}", platform.as_str()),
                    format!("{label} Channel {n}"),
                );
                entry.thumbnail_url = Some(format!("{THUMBNAIL_BASE}{encoded}+{n}"));
                entry.follower_count = top * (count - i) as u64 / count as u64;
                entry.recent_item_title = Some(format!("Latest {label} Video {n}"));
                entry
            })
            .collect()
    }
}

fn category_seed(category: &str) -> u64 {
    let digest = Sha256::digest(category.to_lowercase().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
