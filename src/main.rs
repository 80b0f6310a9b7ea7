//! topcreators - top creator rankings per category
//!
//! Queries YouTube, Instagram and TikTok for a category, ranks the creators
//! found and prints them. Rate limits and outages degrade to cached or demo
//! data with a note instead of failing.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use topcreators::aggregator::{AggregateError, Aggregator};
use topcreators::cli::{parse_platform_arg, parse_scope_arg, render_table, Cli, Command};
use topcreators::config::load_settings;
use topcreators::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};

/// Exit code for invalid arguments
const EXIT_USAGE: u8 = 2;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let settings = load_settings()?;
    let aggregator = Arc::new(settings.build_aggregator()?);

    match cli.command {
        Command::Top {
            category,
            limit,
            scope,
            platform,
            json,
        } => {
            let platform = platform.as_deref().map(parse_platform_arg).transpose();
            let (scope, platform) = match (parse_scope_arg(&scope), platform) {
                (Ok(scope), Ok(platform)) => (scope, platform),
                (Err(e), _) | (_, Err(e)) => {
                    eprintln!("error: {e}");
                    return Ok(ExitCode::from(EXIT_USAGE));
                }
            };

            let mut result = match aggregator.aggregate_scoped(scope, &category, limit).await {
                Ok(result) => result,
                Err(e @ AggregateError::InvalidInput(_)) => {
                    eprintln!("error: {e}");
                    return Ok(ExitCode::from(EXIT_USAGE));
                }
            };
            if let Some(platform) = platform {
                result = result.for_platform(platform);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render_table(&result));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Sweep => {
            let removed = aggregator.sweep_expired().await;
            println!("removed {removed} expired cache entries");
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch {
            categories,
            interval_secs,
            limit,
        } => watch(aggregator, categories, interval_secs, limit).await,
    }
}

async fn watch(
    aggregator: Arc<Aggregator>,
    categories: Vec<String>,
    interval_secs: u64,
    limit: usize,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = RefreshConfig {
        refresh_interval: Duration::from_secs(interval_secs.max(1)),
        categories,
        limit,
        ..RefreshConfig::default()
    };
    let mut handle = RefreshHandle::spawn(config, aggregator);
    handle.request_refresh();

    loop {
        tokio::select! {
            message = handle.receiver.recv() => match message {
                Some(RefreshMessage::CategoryRefreshed { category, entries, advisory }) => {
                    match advisory {
                        Some(advisory) => println!("{category}: {entries} creators ({advisory})"),
                        None => println!("{category}: {entries} creators"),
                    }
                }
                Some(RefreshMessage::RefreshError(e)) => eprintln!("refresh failed: {e}"),
                Some(RefreshMessage::SweepCompleted { removed }) => {
                    println!("swept {removed} expired entries")
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown().await;
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
