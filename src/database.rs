//! Top-level handle wiring the layers together from a [`Config`].

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::object::{ObjectStore, Registry};
use crate::ratelimit::RateLimiter;
use crate::store::Store;
use crate::tasks::Background;
use crate::trash::{ObjectPurge, Sweeper, SweeperStats, TrashQueue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CACHE_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub struct Database {
    config: Config,
    store: Store,
    objects: ObjectStore,
    trash: TrashQueue,
    rate_limiter: RateLimiter,
    sweeper: Arc<SweeperStats>,
    background: Background,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("store", &self.store)
            .field("trash", &self.trash)
            .field("background", &self.background)
            .finish()
    }
}

impl Database {
    pub async fn open(config: Config, registry: Registry) -> Result<Self> {
        Self::open_with_clock(config, registry, SystemClock::shared()).await
    }

    /// Open and start the background sweep. Must run inside a tokio runtime.
    pub async fn open_with_clock(config: Config, registry: Registry, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = Store::connect(&config.store.url, &config.store.notification_prefix).await?;
        store.ping().await?;

        let objects = ObjectStore::new(store.clone(), registry, config.cache.enabled);
        let trash = TrashQueue::new(
            store.clone(),
            config.trash.key.clone(),
            clock,
            config.trash.retention(),
        );

        let background = Background::new();
        let rate_limiter = RateLimiter::new(
            store.clone(),
            config.rate_limit.prefix.clone(),
            background.token().child_token(),
        );

        let sweeper = Sweeper::new(trash.clone(), Arc::new(ObjectPurge::new(objects.clone())));
        let sweeper_stats = sweeper.stats();
        background.spawn("trash-sweeper", move |token| sweeper.run(token));

        let cached = objects.clone();
        background.spawn("cache-prune", move |token| async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(CACHE_PRUNE_INTERVAL) => {
                        let live = cached.prune_cache();
                        debug!(live, "Identity cache pruned");
                    }
                }
            }
        });

        info!(
            store = %store.describe(),
            caching = config.cache.enabled,
            trash = %config.trash.key,
            "Database opened"
        );
        Ok(Database {
            config,
            store,
            objects,
            trash,
            rate_limiter,
            sweeper: sweeper_stats,
            background,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn trash(&self) -> &TrashQueue {
        &self.trash
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn sweeper_stats(&self) -> &SweeperStats {
        &self.sweeper
    }

    /// Stop background work: pending rate-limit resets fire, the sweep
    /// finishes any entry it holds, and every task is joined.
    pub async fn shutdown(&self) {
        info!("Database shutting down");
        self.rate_limiter.shutdown().await;
        self.background.shutdown().await;
    }
}
