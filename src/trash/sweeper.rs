//! The single consumer of the deferred-deletion queue.

use super::{TrashEntry, TrashQueue};
use crate::clock::Timestamp;
use crate::error::Result;
use crate::object::ObjectStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Member scheduled at time zero to wake a blocked sweep on shutdown.
pub(crate) const WAKEUP_SENTINEL: &str = "\u{0}sweeper-wakeup";

/// Pause after a failed pop before trying again.
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Permanently deletes a swept key.
pub trait Purge: Send + Sync + 'static {
    fn purge<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Purges through the object store's registered `Trashable` hooks.
#[derive(Debug, Clone)]
pub struct ObjectPurge {
    objects: ObjectStore,
}

impl ObjectPurge {
    pub fn new(objects: ObjectStore) -> Self {
        ObjectPurge { objects }
    }
}

impl Purge for ObjectPurge {
    fn purge<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.objects.purge(key).await? {
                debug!(key = %key, "Swept key already gone");
            }
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct SweeperStats {
    purged: AtomicU64,
    failed: AtomicU64,
}

impl SweeperStats {
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct Sweeper {
    queue: TrashQueue,
    purge: Arc<dyn Purge>,
    stats: Arc<SweeperStats>,
}

impl Sweeper {
    pub fn new(queue: TrashQueue, purge: Arc<dyn Purge>) -> Self {
        Sweeper {
            queue,
            purge,
            stats: Arc::new(SweeperStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SweeperStats> {
        self.stats.clone()
    }

    /// Sweep until `shutdown` is cancelled.
    ///
    /// Cancellation never abandons a popped entry: the in-flight wait is
    /// woken with a sentinel and driven to completion, and whatever it
    /// popped is fully processed before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(queue = %self.queue.key(), "Sweeper started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let wait = self.queue.block_until_ready(None);
            tokio::pin!(wait);

            let popped = tokio::select! {
                popped = &mut wait => popped,
                _ = shutdown.cancelled() => {
                    if let Err(e) = self.queue.schedule(WAKEUP_SENTINEL, Timestamp::ZERO).await {
                        warn!(error = %e, "Failed to wake sweeper");
                    }
                    let popped = wait.await;
                    self.process(popped).await;
                    if let Err(e) = self.queue.cancel(WAKEUP_SENTINEL).await {
                        warn!(error = %e, "Failed to remove sweeper sentinel");
                    }
                    break;
                }
            };

            if !self.process(popped).await {
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
        info!(
            queue = %self.queue.key(),
            purged = self.stats.purged(),
            failed = self.stats.failed(),
            "Sweeper stopped"
        );
    }

    /// Handle one pop result. Returns `false` if the queue itself failed.
    async fn process(&self, popped: Result<Option<TrashEntry>>) -> bool {
        match popped {
            Ok(Some(entry)) if entry.key == WAKEUP_SENTINEL => true,
            Ok(Some(entry)) => {
                self.sweep(entry).await;
                true
            }
            Ok(None) => true,
            Err(e) => {
                error!(queue = %self.queue.key(), error = %e, "Trash queue unavailable");
                false
            }
        }
    }

    async fn sweep(&self, entry: TrashEntry) {
        match self.purge.purge(&entry.key).await {
            Ok(()) => {
                self.stats.purged.fetch_add(1, Ordering::Relaxed);
                info!(key = %entry.key, "Purged");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %entry.key, error = %e, "Purge failed, rescheduling");
                if let Err(e) = self.queue.trash(&entry.key).await {
                    error!(key = %entry.key, error = %e, "Failed to reschedule; entry dropped");
                }
            }
        }
    }
}
