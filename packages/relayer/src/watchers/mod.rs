//! Live chain watchers
//!
//! Both watchers feed the same [`EventRegistry`](crate::registry::EventRegistry)
//! ingestion path as the backfill scanner. A failed poll is logged and retried
//! on the next tick; only shutdown ends a watcher.

use eyre::Result;
use tracing::{error, info};

use crate::shutdown::ShutdownReceiver;

pub mod l1;
pub mod solana;

pub use l1::L1Watcher;
pub use solana::DestinationWatcher;

/// Split an inclusive block range into chunks of at most `max_range` blocks
pub fn block_ranges(from: u64, to: u64, max_range: u64) -> Vec<(u64, u64)> {
    let step = max_range.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(step - 1).min(to);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Manages the chain watchers
pub struct WatcherManager {
    l1: L1Watcher,
    destination: DestinationWatcher,
}

impl WatcherManager {
    pub fn new(l1: L1Watcher, destination: DestinationWatcher) -> Self {
        Self { l1, destination }
    }

    /// Run all watchers concurrently until shutdown
    pub async fn run(self, shutdown: ShutdownReceiver) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        let l1 = self.l1;
        let l1_shutdown = shutdown.clone();
        join_set.spawn(async move { ("l1", l1.run(l1_shutdown).await) });

        let destination = self.destination;
        join_set.spawn(async move { ("solana", destination.run(shutdown).await) });

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(watcher = name, "Watcher stopped"),
                Ok((name, Err(e))) => error!(watcher = name, error = ?e, "Watcher stopped with error"),
                Err(e) => error!(error = ?e, "A watcher task panicked"),
            }
        }
        Ok(())
    }
}
