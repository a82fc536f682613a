//! Fixed-window rate limiting.
//!
//! A counter per `(rule, client)` lives at `<prefix><rule id>:<client>`. The
//! first increment starts a timer that deletes the counter after the rule's
//! time frame, resetting the window.

use crate::error::{Result, StoreError};
use crate::store::Store;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    id: String,
    n: u64,
    time_frame: Duration,
}

impl RateLimitRule {
    /// At most `n` calls per client within `time_frame`.
    pub fn new(id: impl Into<String>, n: u64, time_frame: Duration) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("rate limit rule id is empty".to_string()));
        }
        if n == 0 {
            return Err(StoreError::InvalidArgument(format!("rule {}: n must be positive", id)));
        }
        if time_frame.is_zero() {
            return Err(StoreError::InvalidArgument(format!(
                "rule {}: time frame must be positive",
                id
            )));
        }
        Ok(RateLimitRule { id, n, time_frame })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn time_frame(&self) -> Duration {
        self.time_frame
    }
}

pub struct RateLimiter {
    store: Store,
    prefix: String,
    token: CancellationToken,
    timers: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("prefix", &self.prefix)
            .field("timers", &self.timers.lock().len())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(store: Store, prefix: impl Into<String>, token: CancellationToken) -> Self {
        RateLimiter {
            store,
            prefix: prefix.into(),
            token,
            timers: Mutex::new(JoinSet::new()),
        }
    }

    fn counter_key(&self, rule: &RateLimitRule, client: &str) -> String {
        format!("{}{}:{}", self.prefix, rule.id, client)
    }

    /// Count one call by `client` under `rule`. The increment is kept even
    /// when it exceeds the limit.
    pub async fn count(&self, rule: &RateLimitRule, client: &str) -> Result<u64> {
        let key = self.counter_key(rule, client);
        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.schedule_reset(key.clone(), rule.time_frame);
        }
        trace!(key = %key, count, limit = rule.n, "Rate limit counted");

        let count = count.max(0) as u64;
        if count > rule.n {
            debug!(rule = %rule.id, client = %client, count, "Rate limit exceeded");
            return Err(StoreError::RateLimitExceeded {
                rule: rule.id.clone(),
                client: client.to_string(),
            });
        }
        Ok(count)
    }

    /// Calls counted in the current window.
    pub async fn current(&self, rule: &RateLimitRule, client: &str) -> Result<u64> {
        let raw = self.store.get(&self.counter_key(rule, client)).await?;
        Ok(raw
            .and_then(|r| std::str::from_utf8(&r).ok()?.parse::<u64>().ok())
            .unwrap_or(0))
    }

    fn schedule_reset(&self, key: String, after: Duration) {
        let store = self.store.clone();
        let token = self.token.clone();
        let mut timers = self.timers.lock();
        while timers.try_join_next().is_some() {}
        timers.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {}
                // A counter without a timer would never reset.
                _ = token.cancelled() => {}
            }
            if let Err(e) = store.del(&[key.as_str()]).await {
                warn!(key = %key, error = %e, "Failed to reset rate limit counter");
            }
        });
    }

    pub fn pending_resets(&self) -> usize {
        self.timers.lock().len()
    }

    /// Fire every pending reset now and wait for them.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let mut timers = std::mem::take(&mut *self.timers.lock());
        while timers.join_next().await.is_some() {}
    }
}
