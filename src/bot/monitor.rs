//! Periodic log line about requests piling up in the queue.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::QueueDirs;

pub const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn_queue_monitor(dirs: QueueDirs, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match dirs.pending_requests().await {
                Ok(pending) if !pending.is_empty() => {
                    info!("Queue status: {} pending request(s)", pending.len());
                }
                Ok(_) => {}
                Err(e) => warn!("Queue monitor: {e}"),
            }
        }
    });
}
