//! Deferred-deletion queue.
//!
//! A sorted set of keys scored by the wall-clock millisecond at which they
//! become eligible for permanent deletion. Entries are consumed by a single
//! [`Sweeper`], or removed early by [`TrashQueue::restore`].
//!
//! ```text
//!   trash(k) ──► scheduled(now + retention) ──► pop_ready ──► purge(k)
//!                        │
//!                        └──► restore(k) (removed, nothing deleted)
//! ```

mod sweeper;

pub use sweeper::{ObjectPurge, Purge, Sweeper, SweeperStats};

use crate::clock::{Clock, Timestamp};
use crate::error::{Result, StoreError};
use crate::keyspace::Reply;
use crate::store::{Script, Store};
use bytes::Bytes;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Upper bound on one wait inside `block_until_ready`; the queue is
/// re-polled after it even without a notification.
const MAX_WAIT: Duration = Duration::from_secs(5);

// KEYS[1] queue; ARGV[1] now in ms
static POP_READY: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local head = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if #head == 0 then return {} end
if tonumber(head[2]) <= tonumber(ARGV[1]) then
    redis.call('ZREM', KEYS[1], head[1])
    return {'ready', head[1], head[2]}
end
return {'pending', head[1], head[2]}
"#,
    )
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashEntry {
    pub key: String,
    pub ready_at: Timestamp,
}

/// Outcome of one [`TrashQueue::pop_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    /// The earliest entry was due and has been removed.
    Ready(TrashEntry),
    /// The earliest entry is due at this time; nothing was removed.
    Pending(Timestamp),
    /// Nothing scheduled. Equivalent to a ready-time of +infinity.
    Empty,
}

#[derive(Clone)]
pub struct TrashQueue {
    store: Store,
    key: String,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl std::fmt::Debug for TrashQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashQueue")
            .field("key", &self.key)
            .field("retention", &self.retention)
            .finish()
    }
}

fn parse_pop(reply: Reply) -> Result<Pop> {
    let items = match reply {
        Reply::Array(Some(items)) => items,
        Reply::Array(None) | Reply::Bulk(None) => return Ok(Pop::Empty),
        other => return Err(StoreError::protocol(format!("pop_ready: unexpected {:?}", other))),
    };
    if items.is_empty() {
        return Ok(Pop::Empty);
    }
    let text = |r: &Reply| match r {
        Reply::Bulk(Some(b)) => Ok(String::from_utf8_lossy(b).into_owned()),
        Reply::Status(s) => Ok(s.clone()),
        Reply::Integer(n) => Ok(n.to_string()),
        other => Err(StoreError::protocol(format!("pop_ready: unexpected {:?}", other))),
    };
    let [state, key, score] = items.as_slice() else {
        return Err(StoreError::protocol(format!(
            "pop_ready: expected 3 fields, got {}",
            items.len()
        )));
    };
    let score: f64 = text(score)?
        .parse()
        .map_err(|_| StoreError::protocol("pop_ready: score is not a number"))?;
    let ready_at = Timestamp::from_score(score);
    match text(state)?.as_str() {
        "ready" => Ok(Pop::Ready(TrashEntry {
            key: text(key)?,
            ready_at,
        })),
        "pending" => Ok(Pop::Pending(ready_at)),
        other => Err(StoreError::protocol(format!("pop_ready: unknown state {:?}", other))),
    }
}

impl TrashQueue {
    pub fn new(store: Store, key: impl Into<String>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        TrashQueue {
            store,
            key: key.into(),
            clock,
            retention,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Schedule (or reschedule) `key` for deletion at `at`.
    pub async fn schedule(&self, key: &str, at: Timestamp) -> Result<()> {
        self.store
            .zadd(&self.key, vec![(at.as_score(), Bytes::from(key.to_string()))])
            .await?;
        debug!(queue = %self.key, key = %key, at = at.as_millis(), "Scheduled");
        Ok(())
    }

    /// Remove `key` from the queue. Returns whether it was scheduled.
    pub async fn cancel(&self, key: &str) -> Result<bool> {
        let removed = self
            .store
            .zrem(&self.key, vec![Bytes::from(key.to_string())])
            .await?;
        Ok(removed > 0)
    }

    /// Schedule `key` one retention period from now.
    pub async fn trash(&self, key: &str) -> Result<Timestamp> {
        let at = self.clock.now() + self.retention;
        self.schedule(key, at).await?;
        Ok(at)
    }

    /// Take `key` back out of the trash before it is swept.
    pub async fn restore(&self, key: &str) -> Result<bool> {
        let restored = self.cancel(key).await?;
        if restored {
            debug!(queue = %self.key, key = %key, "Restored");
        }
        Ok(restored)
    }

    pub async fn ready_time(&self, key: &str) -> Result<Option<Timestamp>> {
        let score = self.store.zscore(&self.key, key.to_string()).await?;
        Ok(score.map(Timestamp::from_score))
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.zcard(&self.key).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Atomically remove the earliest entry if it is due.
    pub async fn pop_ready(&self) -> Result<Pop> {
        let now = self.clock.now();
        let reply = self
            .store
            .run_script(
                &POP_READY,
                vec![self.key.clone()],
                vec![Bytes::from(now.as_millis().to_string())],
            )
            .await?;
        let pop = parse_pop(reply)?;
        trace!(queue = %self.key, now = now.as_millis(), pop = ?pop, "pop_ready");
        Ok(pop)
    }

    /// Pop the next due entry, waiting for it. `None` once `timeout`
    /// elapses; no timeout waits indefinitely.
    ///
    /// Sleeps until the earliest ready-time or the deadline, and wakes early
    /// on any write to the queue.
    pub async fn block_until_ready(&self, timeout: Option<Duration>) -> Result<Option<TrashEntry>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        // Subscribe first so an insert between the pop and the wait is seen.
        let mut changes = self.store.subscribe(&self.key);

        loop {
            let until_ready = match self.pop_ready().await? {
                Pop::Ready(entry) => return Ok(Some(entry)),
                Pop::Pending(at) => Some(self.clock.now().until(at)),
                Pop::Empty => None,
            };

            let until_deadline = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(None);
                    }
                    Some(d - now)
                }
                None => None,
            };

            let wait = [until_ready, until_deadline, Some(MAX_WAIT)]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(MAX_WAIT);

            tokio::select! {
                changed = changes.changed() => {
                    changed?;
                    trace!(queue = %self.key, "Woken by queue write");
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(all(test, feature = "lua"))]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    fn queue(clock: Arc<dyn Clock>, retention_ms: u64) -> TrashQueue {
        TrashQueue::new(Store::memory(), "trash", clock, Duration::from_millis(retention_ms))
    }

    #[test]
    fn test_parse_pop() {
        assert_eq!(parse_pop(Reply::array(vec![])).unwrap(), Pop::Empty);
        let pending = Reply::array(vec![
            Reply::bulk(Bytes::from_static(b"pending")),
            Reply::bulk(Bytes::from_static(b"k")),
            Reply::bulk(Bytes::from_static(b"1500")),
        ]);
        assert_eq!(parse_pop(pending).unwrap(), Pop::Pending(Timestamp(1500)));
        assert!(parse_pop(Reply::Integer(3)).is_err());
    }

    #[tokio::test]
    async fn test_pop_ready_respects_clock() {
        let clock = Arc::new(ManualClock::new(1_000));
        let q = queue(clock.clone(), 500);

        assert_eq!(q.pop_ready().await.unwrap(), Pop::Empty);

        let at = q.trash("list:1").await.unwrap();
        assert_eq!(at, Timestamp(1_500));
        assert_eq!(q.pop_ready().await.unwrap(), Pop::Pending(Timestamp(1_500)));
        assert_eq!(q.len().await.unwrap(), 1);

        clock.advance(Duration::from_millis(500));
        assert_eq!(
            q.pop_ready().await.unwrap(),
            Pop::Ready(TrashEntry {
                key: "list:1".to_string(),
                ready_at: Timestamp(1_500),
            })
        );
        assert_eq!(q.pop_ready().await.unwrap(), Pop::Empty);
    }

    #[tokio::test]
    async fn test_restore_removes_entry() {
        let q = queue(Arc::new(ManualClock::new(0)), 100);
        q.trash("a").await.unwrap();
        assert_eq!(q.ready_time("a").await.unwrap(), Some(Timestamp(100)));
        assert!(q.restore("a").await.unwrap());
        assert!(!q.restore("a").await.unwrap());
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_block_until_ready_times_out() {
        let q = queue(SystemClock::shared(), 10_000);
        q.trash("later").await.unwrap();
        let popped = q.block_until_ready(Some(Duration::from_millis(50))).await.unwrap();
        assert_eq!(popped, None);
        assert_eq!(q.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_block_until_ready_wakes_on_insert() {
        let q = queue(SystemClock::shared(), 10_000);
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.block_until_ready(Some(Duration::from_secs(2))).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        q.schedule("now", Timestamp::ZERO).await.unwrap();

        let entry = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(entry.key, "now");
    }

    #[tokio::test]
    async fn test_block_until_ready_waits_for_ready_time() {
        let q = queue(SystemClock::shared(), 80);
        q.trash("soon").await.unwrap();
        let started = std::time::Instant::now();
        let entry = q
            .block_until_ready(Some(Duration::from_secs(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.key, "soon");
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
