//! Engagement scoring and ranking of merged creator entries.
//!
//! Every platform is scored with the same shape,
//! `score = 0.7 * followers + 0.3 * activity`, where `activity` is the
//! platform's own measure of recent audience engagement:
//!
//! | Platform  | activity                              |
//! |-----------|---------------------------------------|
//! | YouTube   | total views / max(video count, 1)     |
//! | Instagram | media count                           |
//! | TikTok    | total likes / max(video count, 1)     |
//!
//! Scores are strictly increasing in follower count for fixed activity.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::data::{CreatorEntry, Platform};

/// Weight of the follower count in the engagement score
pub const FOLLOWER_WEIGHT: f64 = 0.7;

/// Weight of the platform activity measure in the engagement score
pub const ACTIVITY_WEIGHT: f64 = 0.3;

/// Platform-specific recent activity measure
pub fn activity_weight(entry: &CreatorEntry) -> f64 {
    match entry.platform {
        Platform::YouTube => entry.interaction_count as f64 / entry.item_count.max(1) as f64,
        Platform::Instagram => entry.item_count as f64,
        Platform::TikTok => entry.interaction_count as f64 / entry.item_count.max(1) as f64,
    }
}

/// Engagement score used to rank entries
pub fn engagement_score(entry: &CreatorEntry) -> f64 {
    FOLLOWER_WEIGHT * entry.follower_count as f64 + ACTIVITY_WEIGHT * activity_weight(entry)
}

/// Collapses entries sharing `(platform, platform_id)` into one
///
/// The first occurrence keeps its position and identity fields. It takes
/// the larger follower count of the duplicates and fills optional fields it
/// is missing.
pub fn dedup(entries: Vec<CreatorEntry>) -> Vec<CreatorEntry> {
    let mut index: HashMap<(Platform, String), usize> = HashMap::new();
    let mut unique: Vec<CreatorEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = (entry.platform, entry.platform_id.clone());
        match index.get(&key) {
            Some(&pos) => merge_into(&mut unique[pos], entry),
            None => {
                index.insert(key, unique.len());
                unique.push(entry);
            }
        }
    }

    unique
}

fn merge_into(kept: &mut CreatorEntry, duplicate: CreatorEntry) {
    if duplicate.follower_count > kept.follower_count {
        kept.follower_count = duplicate.follower_count;
    }
    kept.item_count = kept.item_count.max(duplicate.item_count);
    kept.interaction_count = kept.interaction_count.max(duplicate.interaction_count);
    if kept.thumbnail_url.is_none() {
        kept.thumbnail_url = duplicate.thumbnail_url;
    }
    if kept.recent_item_title.is_none() {
        kept.recent_item_title = duplicate.recent_item_title;
    }
    if kept.display_name.is_empty() {
        kept.display_name = duplicate.display_name;
    }
}

/// Total order: score descending, then `platform_id` ascending, then platform
fn compare(a: &CreatorEntry, b: &CreatorEntry) -> Ordering {
    engagement_score(b)
        .total_cmp(&engagement_score(a))
        .then_with(|| a.platform_id.cmp(&b.platform_id))
        .then_with(|| a.platform.cmp(&b.platform))
}

/// Deduplicates, sorts by engagement score and truncates to `limit`
pub fn rank(entries: Vec<CreatorEntry>, limit: usize) -> Vec<CreatorEntry> {
    let mut ranked = dedup(entries);
    ranked.sort_by(compare);
    ranked.truncate(limit);
    ranked
}
