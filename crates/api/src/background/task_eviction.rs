//! Periodic removal of expired task records.
//!
//! Runs on a fixed interval using `tokio::time::interval` until cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fluxgen_pipeline::store::TaskStore;
use tokio_util::sync::CancellationToken;

/// Run the eviction loop. Runs until `cancel` is triggered.
pub async fn run(store: Arc<dyn TaskStore>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Task eviction job started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task eviction job stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = store.evict_expired(Utc::now()).await;
                if evicted > 0 {
                    let remaining = store.len().await;
                    tracing::info!(evicted, remaining, "Task eviction: purged expired records");
                } else {
                    tracing::debug!("Task eviction: nothing to purge");
                }
            }
        }
    }
}
