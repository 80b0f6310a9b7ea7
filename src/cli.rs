//! Command-line interface for topcreators
//!
//! This module defines the clap command tree and the helpers that turn raw
//! arguments into typed queries and render results for the terminal.

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::QueryScope;
use crate::data::{AggregationResult, Platform, ResultSource};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified platform name is not recognized
    #[error("Invalid platform: '{0}'. Valid platforms: youtube, instagram, tiktok")]
    InvalidPlatform(String),

    /// The specified scope name is not recognized
    #[error("Invalid scope: '{0}'. Valid scopes: narrow, broad")]
    InvalidScope(String),
}

/// Top creators per category across YouTube, Instagram and TikTok
#[derive(Parser, Debug)]
#[command(name = "topcreators")]
#[command(about = "Aggregate top creator rankings per category across social platforms")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the top creators for a category
    ///
    /// Examples:
    ///   topcreators top gaming
    ///   topcreators top cooking --limit 20 --scope broad
    ///   topcreators top dance --platform tiktok --json
    Top {
        /// Category or search term
        category: String,

        /// Number of creators to return (1-50)
        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        /// Query scope: narrow or broad
        #[arg(long, default_value = "narrow")]
        scope: String,

        /// Only show creators from this platform
        #[arg(long, short)]
        platform: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete expired cache entries
    Sweep,

    /// Keep categories refreshed in the background until interrupted
    Watch {
        /// Categories to refresh
        #[arg(required = true)]
        categories: Vec<String>,

        /// Seconds between refresh cycles
        #[arg(long, default_value_t = 21_600)]
        interval_secs: u64,

        /// Number of creators per category
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
}

/// Parses a platform name argument
pub fn parse_platform_arg(s: &str) -> Result<Platform, CliError> {
    Platform::from_name(s).ok_or_else(|| CliError::InvalidPlatform(s.to_string()))
}

/// Parses a query scope argument
pub fn parse_scope_arg(s: &str) -> Result<QueryScope, CliError> {
    QueryScope::from_name(s).ok_or_else(|| CliError::InvalidScope(s.to_string()))
}

/// Formats a count with thousands separators
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn source_label(source: &ResultSource) -> String {
    match source {
        ResultSource::Live => "live".to_string(),
        ResultSource::Cache => "cached".to_string(),
        ResultSource::StaleCache { age_secs } => format!("stale, {age_secs}s old"),
        ResultSource::Demo => "demo".to_string(),
    }
}

/// Renders a result as a plain-text table
pub fn render_table(result: &AggregationResult) -> String {
    let mut out = format!(
        "Top creators for \"{}\" ({})\n",
        result.category,
        source_label(&result.source)
    );

    if result.entries.is_empty() {
        out.push_str("  no creators found\n");
    } else {
        out.push_str(&format!("{:>3}  {:<10} {:>13}  {}\n", "#", "PLATFORM", "FOLLOWERS", "NAME"));
        for (i, entry) in result.entries.iter().enumerate() {
            out.push_str(&format!(
                "{:>3}  {:<10} {:>13}  {}\n",
                i + 1,
                entry.platform.as_str(),
                format_count(entry.follower_count),
                entry.display_name
            ));
        }
    }

    if let Some(advisory) = &result.advisory {
        out.push_str(&format!("note: {advisory}\n"));
    }
    out
}
