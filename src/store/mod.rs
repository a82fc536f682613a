//! Backing store client.
//!
//! [`Store`] is a cheap-to-clone handle exposing the key-value, list,
//! sorted-set, hash and scripting primitives the upper layers are built on.
//! It talks to either the embedded keyspace (`memory://`) or a Redis-protocol
//! server (`redis://host:port/db`) through the [`Connection`] seam.
//!
//! Error replies from the store surface as [`StoreError::Backend`]; transport
//! failures surface as [`StoreError::Unavailable`]. Neither is retried.

mod connection;
mod net;
mod script;

pub use connection::Connection;
pub use net::RespConnection;
pub use script::Script;

use crate::error::{Result, StoreError};
use crate::keyspace::{Command, KeyEvent, KeyspaceHandle, LexBound, Reply};
use ahash::AHashSet;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

/// Parsed `store.url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Memory,
    Redis { addr: String, db: u32 },
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Endpoint> {
        if url == "memory://" || url == "memory" {
            return Ok(Endpoint::Memory);
        }
        let Some(rest) = url.strip_prefix("redis://") else {
            return Err(StoreError::InvalidArgument(format!(
                "unsupported store url {:?}: expected memory:// or redis://host:port/db",
                url
            )));
        };

        let (addr, db) = match rest.split_once('/') {
            Some((addr, "")) => (addr, 0),
            Some((addr, db)) => {
                let db = db.parse::<u32>().map_err(|_| {
                    StoreError::InvalidArgument(format!("invalid database index in {:?}", url))
                })?;
                (addr, db)
            }
            None => (rest, 0),
        };
        if addr.is_empty() {
            return Err(StoreError::InvalidArgument(format!("missing host in {:?}", url)));
        }
        let addr = if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{}:6379", addr)
        };
        Ok(Endpoint::Redis { addr, db })
    }
}

/// Wakes on writes to one key.
pub struct Subscription {
    key: String,
    rx: broadcast::Receiver<KeyEvent>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolve on the next write to the key. Missed notifications (lag)
    /// count as a write.
    pub async fn changed(&mut self) -> Result<()> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.key == self.key => {
                    trace!(key = %self.key, event = %event.event, "key changed");
                    return Ok(());
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(key = %self.key, skipped, "notification stream lagged");
                    return Ok(());
                }
                Err(RecvError::Closed) => {
                    return Err(StoreError::unavailable("notification stream closed"))
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<dyn Connection>,
    /// SHA1s this connection has already loaded.
    loaded: Arc<Mutex<AHashSet<String>>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("endpoint", &self.conn.describe())
            .finish()
    }
}

fn unexpected(what: &str, reply: &Reply) -> StoreError {
    StoreError::protocol(format!("unexpected reply to {}: {:?}", what, reply))
}

fn to_int(what: &str, reply: Reply) -> Result<i64> {
    match reply {
        Reply::Integer(n) => Ok(n),
        other => Err(unexpected(what, &other)),
    }
}

fn to_bulk(what: &str, reply: Reply) -> Result<Option<Bytes>> {
    match reply {
        Reply::Bulk(b) => Ok(b),
        other => Err(unexpected(what, &other)),
    }
}

fn to_array(what: &str, reply: Reply) -> Result<Vec<Reply>> {
    match reply {
        Reply::Array(Some(items)) => Ok(items),
        Reply::Array(None) => Ok(Vec::new()),
        other => Err(unexpected(what, &other)),
    }
}

fn to_bulk_array(what: &str, reply: Reply) -> Result<Vec<Bytes>> {
    to_array(what, reply)?
        .into_iter()
        .map(|item| match item {
            Reply::Bulk(Some(b)) => Ok(b),
            other => Err(unexpected(what, &other)),
        })
        .collect()
}

fn to_score(what: &str, raw: &[u8]) -> Result<f64> {
    let text = std::str::from_utf8(raw).map_err(|_| StoreError::protocol(format!("{}: non-utf8 score", what)))?;
    match text {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse::<f64>()
            .map_err(|_| StoreError::protocol(format!("{}: invalid score {:?}", what, other))),
    }
}

impl Store {
    pub fn from_connection(conn: Arc<dyn Connection>) -> Self {
        Store {
            conn,
            loaded: Arc::new(Mutex::new(AHashSet::new())),
        }
    }

    /// Fresh embedded keyspace. Must be called inside a tokio runtime.
    pub fn memory() -> Self {
        Self::from_connection(Arc::new(KeyspaceHandle::spawn()))
    }

    /// Open the store named by `url`; `notification_prefix` limits which
    /// keys a remote server publishes change notifications for.
    pub async fn connect(url: &str, notification_prefix: &str) -> Result<Self> {
        match Endpoint::parse(url)? {
            Endpoint::Memory => Ok(Self::memory()),
            Endpoint::Redis { addr, db } => {
                let conn = RespConnection::connect(&addr, db, notification_prefix).await?;
                Ok(Self::from_connection(Arc::new(conn)))
            }
        }
    }

    pub fn describe(&self) -> String {
        self.conn.describe()
    }

    /// Send a command; error replies become `StoreError::Backend`.
    pub async fn call(&self, cmd: Command) -> Result<Reply> {
        match self.conn.call(cmd).await? {
            Reply::Error(e) => Err(StoreError::Backend(e)),
            reply => Ok(reply),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self.call(Command::Ping).await? {
            Reply::Status(_) | Reply::Bulk(Some(_)) => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    // Strings and keys

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        to_bulk("GET", self.call(Command::Get(key.to_string())).await?)
    }

    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        self.call(Command::Set(key.to_string(), value.into())).await?;
        Ok(())
    }

    pub async fn del(&self, keys: &[&str]) -> Result<i64> {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        to_int("DEL", self.call(Command::Del(keys)).await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(to_int("EXISTS", self.call(Command::Exists(vec![key.to_string()])).await?)? > 0)
    }

    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        to_array("MGET", self.call(Command::MGet(keys.to_vec())).await?)?
            .into_iter()
            .map(|item| to_bulk("MGET", item))
            .collect()
    }

    pub async fn mset(&self, pairs: Vec<(String, Bytes)>) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.call(Command::MSet(pairs)).await?;
        Ok(())
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        to_int("INCR", self.call(Command::Incr(key.to_string())).await?)
    }

    pub async fn flushall(&self) -> Result<()> {
        self.call(Command::FlushAll).await?;
        Ok(())
    }

    // Lists

    pub async fn lpush(&self, key: &str, values: Vec<Bytes>) -> Result<i64> {
        to_int("LPUSH", self.call(Command::LPush(key.to_string(), values)).await?)
    }

    pub async fn rpush(&self, key: &str, values: Vec<Bytes>) -> Result<i64> {
        to_int("RPUSH", self.call(Command::RPush(key.to_string(), values)).await?)
    }

    pub async fn lindex(&self, key: &str, index: isize) -> Result<Option<Bytes>> {
        to_bulk("LINDEX", self.call(Command::LIndex(key.to_string(), index)).await?)
    }

    /// Inclusive `stop`, negative indices count from the tail.
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<Bytes>> {
        to_bulk_array(
            "LRANGE",
            self.call(Command::LRange(key.to_string(), start, stop)).await?,
        )
    }

    pub async fn llen(&self, key: &str) -> Result<usize> {
        Ok(to_int("LLEN", self.call(Command::LLen(key.to_string())).await?)?.max(0) as usize)
    }

    pub async fn lrem(&self, key: &str, count: isize, value: impl Into<Bytes>) -> Result<i64> {
        to_int(
            "LREM",
            self.call(Command::LRem(key.to_string(), count, value.into()))
                .await?,
        )
    }

    /// Returns the new length, `-1` if `pivot` is absent, `0` if the list is.
    pub async fn linsert(
        &self,
        key: &str,
        before: bool,
        pivot: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<i64> {
        let cmd = Command::LInsert {
            key: key.to_string(),
            before,
            pivot: pivot.into(),
            value: value.into(),
        };
        to_int("LINSERT", self.call(cmd).await?)
    }

    pub async fn lpos(&self, key: &str, value: impl Into<Bytes>) -> Result<Option<usize>> {
        match self.call(Command::LPos(key.to_string(), value.into())).await? {
            Reply::Integer(n) if n >= 0 => Ok(Some(n as usize)),
            Reply::Bulk(None) => Ok(None),
            other => Err(unexpected("LPOS", &other)),
        }
    }

    // Sorted sets

    pub async fn zadd(&self, key: &str, pairs: Vec<(f64, Bytes)>) -> Result<i64> {
        to_int("ZADD", self.call(Command::ZAdd(key.to_string(), pairs)).await?)
    }

    pub async fn zrem(&self, key: &str, members: Vec<Bytes>) -> Result<i64> {
        to_int("ZREM", self.call(Command::ZRem(key.to_string(), members)).await?)
    }

    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<Bytes>> {
        let cmd = Command::ZRange {
            key: key.to_string(),
            start,
            stop,
            with_scores: false,
        };
        to_bulk_array("ZRANGE", self.call(cmd).await?)
    }

    pub async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(Bytes, f64)>> {
        let cmd = Command::ZRange {
            key: key.to_string(),
            start,
            stop,
            with_scores: true,
        };
        let flat = to_bulk_array("ZRANGE", self.call(cmd).await?)?;
        if flat.len() % 2 != 0 {
            return Err(StoreError::protocol("ZRANGE WITHSCORES returned an odd count"));
        }
        flat.chunks(2)
            .map(|pair| Ok((pair[0].clone(), to_score("ZRANGE", &pair[1])?)))
            .collect()
    }

    pub async fn zrangebylex(&self, key: &str, min: LexBound, max: LexBound) -> Result<Vec<Bytes>> {
        let cmd = Command::ZRangeByLex {
            key: key.to_string(),
            min,
            max,
        };
        to_bulk_array("ZRANGEBYLEX", self.call(cmd).await?)
    }

    pub async fn zrank(&self, key: &str, member: impl Into<Bytes>) -> Result<Option<usize>> {
        match self.call(Command::ZRank(key.to_string(), member.into())).await? {
            Reply::Integer(n) if n >= 0 => Ok(Some(n as usize)),
            Reply::Bulk(None) => Ok(None),
            other => Err(unexpected("ZRANK", &other)),
        }
    }

    pub async fn zscore(&self, key: &str, member: impl Into<Bytes>) -> Result<Option<f64>> {
        match to_bulk(
            "ZSCORE",
            self.call(Command::ZScore(key.to_string(), member.into()))
                .await?,
        )? {
            Some(raw) => Ok(Some(to_score("ZSCORE", &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn zcard(&self, key: &str) -> Result<usize> {
        Ok(to_int("ZCARD", self.call(Command::ZCard(key.to_string())).await?)?.max(0) as usize)
    }

    // Hashes

    pub async fn hset(&self, key: &str, pairs: Vec<(Bytes, Bytes)>) -> Result<i64> {
        to_int("HSET", self.call(Command::HSet(key.to_string(), pairs)).await?)
    }

    pub async fn hget(&self, key: &str, field: impl Into<Bytes>) -> Result<Option<Bytes>> {
        to_bulk("HGET", self.call(Command::HGet(key.to_string(), field.into())).await?)
    }

    pub async fn hdel(&self, key: &str, fields: Vec<Bytes>) -> Result<i64> {
        to_int("HDEL", self.call(Command::HDel(key.to_string(), fields)).await?)
    }

    pub async fn hexists(&self, key: &str, field: impl Into<Bytes>) -> Result<bool> {
        Ok(to_int(
            "HEXISTS",
            self.call(Command::HExists(key.to_string(), field.into()))
                .await?,
        )? == 1)
    }

    pub async fn hgetall(&self, key: &str) -> Result<Vec<(Bytes, Bytes)>> {
        let flat = to_bulk_array("HGETALL", self.call(Command::HGetAll(key.to_string())).await?)?;
        if flat.len() % 2 != 0 {
            return Err(StoreError::protocol("HGETALL returned an odd count"));
        }
        Ok(flat
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect())
    }

    pub async fn hvals(&self, key: &str) -> Result<Vec<Bytes>> {
        to_bulk_array("HVALS", self.call(Command::HVals(key.to_string())).await?)
    }

    // Scripts

    /// Run `script` atomically on the server. The script is loaded once per
    /// connection and invoked by SHA1 afterwards; a server that lost its
    /// script cache (`NOSCRIPT`) gets it reloaded once.
    pub async fn run_script(&self, script: &Script, keys: Vec<String>, args: Vec<Bytes>) -> Result<Reply> {
        if !self.loaded.lock().contains(script.sha1()) {
            self.load_script(script).await?;
        }

        let evalsha = Command::EvalSha {
            sha1: script.sha1().to_string(),
            keys: keys.clone(),
            args: args.clone(),
        };
        match self.conn.call(evalsha).await? {
            Reply::Error(e) if e.starts_with("NOSCRIPT") => {
                debug!(sha1 = script.sha1(), "script cache miss, reloading");
                self.loaded.lock().remove(script.sha1());
                self.load_script(script).await?;
                self.call(Command::EvalSha {
                    sha1: script.sha1().to_string(),
                    keys,
                    args,
                })
                .await
            }
            Reply::Error(e) => Err(StoreError::Backend(e)),
            reply => Ok(reply),
        }
    }

    async fn load_script(&self, script: &Script) -> Result<()> {
        let reply = self
            .call(Command::ScriptLoad(script.source().to_string()))
            .await?;
        match to_bulk("SCRIPT LOAD", reply)? {
            Some(sha) if &sha[..] == script.sha1().as_bytes() => {
                self.loaded.lock().insert(script.sha1().to_string());
                Ok(())
            }
            other => Err(StoreError::protocol(format!(
                "SCRIPT LOAD returned {:?}, expected {}",
                other,
                script.sha1()
            ))),
        }
    }

    // Notifications

    /// Subscribe before reading state you intend to wait on, so no write
    /// between the read and the wait is missed.
    pub fn subscribe(&self, key: &str) -> Subscription {
        Subscription {
            key: key.to_string(),
            rx: self.conn.notifications(),
        }
    }
}
