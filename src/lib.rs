//! topcreators library
//!
//! Aggregates top creator rankings for a category across social platforms
//! with a two-tier TTL cache and a quota fallback chain. The binary in
//! `main.rs` is a thin CLI over [`aggregator::Aggregator`].

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod fallback;
pub mod ranking;
pub mod refresh;

pub use aggregator::{AggregateError, Aggregator};
pub use data::{AggregationResult, CreatorEntry, Platform};
