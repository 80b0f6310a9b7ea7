//! Background cache refresh and sweep
//!
//! Recomputes a configured list of categories on an interval so that cached
//! results are replaced before they expire, and periodically deletes expired
//! cache entries. Progress is reported over a tokio channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::aggregator::Aggregator;
use crate::cache::QueryScope;

/// Messages sent from the background task to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshMessage {
    /// A refresh cycle started
    RefreshStarted,
    /// One category was recomputed
    CategoryRefreshed {
        category: String,
        entries: usize,
        advisory: Option<String>,
    },
    /// A category could not be refreshed
    RefreshError(String),
    /// A refresh cycle finished
    RefreshCompleted,
    /// Expired cache entries were deleted
    SweepCompleted { removed: usize },
}

/// Configuration for refresh and sweep intervals
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between refresh cycles
    pub refresh_interval: Duration,
    /// Interval between cache sweeps
    pub sweep_interval: Duration,
    /// Categories recomputed on every cycle
    pub categories: Vec<String>,
    pub limit: usize,
    pub scope: QueryScope,
    /// Whether the background task runs at all
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(6 * 3600), // 6 hours
            sweep_interval: Duration::from_secs(24 * 3600),  // 24 hours
            categories: Vec::new(),
            limit: 10,
            scope: QueryScope::Narrow,
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Spawns the background task
    ///
    /// The first refresh happens one interval after spawning, or earlier
    /// through [`RefreshHandle::request_refresh`]. Dropping the handle stops
    /// the task.
    pub fn spawn(config: RefreshConfig, aggregator: Arc<Aggregator>) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut refresh = tokio::time::interval(config.refresh_interval);
                let mut sweep = tokio::time::interval(config.sweep_interval);
                // Skip the first tick (immediate)
                refresh.tick().await;
                sweep.tick().await;

                loop {
                    tokio::select! {
                        _ = refresh.tick() => {
                            refresh_all(&aggregator, &config, &msg_tx).await;
                        }
                        Some(()) = trigger_rx.recv() => {
                            refresh_all(&aggregator, &config, &msg_tx).await;
                        }
                        _ = sweep.tick() => {
                            let removed = aggregator.sweep_expired().await;
                            tracing::info!(removed, "cache sweep finished");
                            let _ = msg_tx.send(RefreshMessage::SweepCompleted { removed }).await;
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
                tracing::debug!("refresh task stopped");
            });
        }

        Self {
            receiver: msg_rx,
            trigger_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate refresh cycle
    ///
    /// Does nothing when a request is already pending.
    pub fn request_refresh(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Shuts down the background task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn refresh_all(
    aggregator: &Aggregator,
    config: &RefreshConfig,
    tx: &mpsc::Sender<RefreshMessage>,
) {
    let _ = tx.send(RefreshMessage::RefreshStarted).await;

    for category in &config.categories {
        let message = match aggregator.refresh(config.scope, category, config.limit).await {
            Ok(result) => {
                if let Some(advisory) = &result.advisory {
                    tracing::warn!(category = %category, advisory = %advisory, "refresh degraded");
                }
                RefreshMessage::CategoryRefreshed {
                    category: category.clone(),
                    entries: result.entries.len(),
                    advisory: result.advisory,
                }
            }
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "refresh failed");
                RefreshMessage::RefreshError(format!("{category}: {e}"))
            }
        };
        let _ = tx.send(message).await;
    }

    let _ = tx.send(RefreshMessage::RefreshCompleted).await;
}

/// Checks for pending refresh messages without blocking
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::fallback::UNAVAILABLE_ADVISORY;

    fn offline_aggregator() -> Arc<Aggregator> {
        Arc::new(Aggregator::new(Vec::new(), CacheStore::in_memory(Duration::from_secs(60))))
    }

    async fn next(handle: &mut RefreshHandle) -> RefreshMessage {
        tokio::time::timeout(Duration::from_secs(5), handle.receiver.recv())
            .await
            .expect("timed out waiting for refresh message")
            .expect("refresh channel closed")
    }

    #[test]
    fn test_refresh_config_default() {
        let config = RefreshConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(21_600));
        assert_eq!(config.sweep_interval, Duration::from_secs(86_400));
        assert!(config.categories.is_empty());
        assert!(config.enabled);
    }

    #[tokio::test]
    async fn test_refresh_handle_spawn_disabled() {
        let config = RefreshConfig {
            enabled: false,
            ..Default::default()
        };

        let mut handle = RefreshHandle::spawn(config, offline_aggregator());

        // With refresh disabled, there should be no messages
        assert!(try_recv(&mut handle).is_none());
    }

    #[tokio::test]
    async fn test_requested_refresh_reports_each_category() {
        let config = RefreshConfig {
            categories: vec!["gaming".to_string(), "".to_string()],
            limit: 3,
            ..Default::default()
        };
        let mut handle = RefreshHandle::spawn(config, offline_aggregator());

        handle.request_refresh();

        assert_eq!(next(&mut handle).await, RefreshMessage::RefreshStarted);
        assert_eq!(
            next(&mut handle).await,
            RefreshMessage::CategoryRefreshed {
                category: "gaming".to_string(),
                entries: 3,
                advisory: Some(UNAVAILABLE_ADVISORY.to_string()),
            }
        );
        assert!(matches!(next(&mut handle).await, RefreshMessage::RefreshError(_)));
        assert_eq!(next(&mut handle).await, RefreshMessage::RefreshCompleted);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweep_runs_on_interval() {
        let aggregator = offline_aggregator();
        aggregator
            .cache()
            .put_with_ttl("narrow::old::1", Vec::new(), Duration::from_secs(0))
            .await;

        let config = RefreshConfig {
            sweep_interval: Duration::from_millis(50),
            ..Default::default()
        };
        let mut handle = RefreshHandle::spawn(config, aggregator);

        assert_eq!(next(&mut handle).await, RefreshMessage::SweepCompleted { removed: 1 });
        handle.shutdown().await;
    }
}
