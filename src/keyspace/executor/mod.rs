//! Keyspace command executor.
//!
//! The executor is the single-threaded state machine behind the embedded
//! backing store. Commands are split by family:
//!
//! - `mod.rs` (this file): core struct, dispatch, notification bookkeeping
//! - `string_ops.rs`: GET, SET, DEL, EXISTS, MGET, MSET, INCR, FLUSHALL
//! - `list_ops.rs`: LPUSH, RPUSH, LINDEX, LRANGE, LLEN, LREM, LINSERT, LPOS
//! - `sorted_set_ops.rs`: ZADD, ZREM, ZRANGE, ZRANGEBYLEX, ZRANK, ZSCORE, ZCARD
//! - `hash_ops.rs`: HSET, HGET, HDEL, HEXISTS, HGETALL, HVALS
//! - `script_ops.rs`: EVAL, EVALSHA, SCRIPT LOAD/EXISTS/FLUSH
//!
//! Every write records a [`KeyEvent`]; the owner drains them after each
//! top-level command and publishes them as keyspace notifications. A Lua
//! script runs to completion inside one `execute` call, so no other command
//! can observe its intermediate state.

mod hash_ops;
mod list_ops;
mod script_ops;
mod sorted_set_ops;
mod string_ops;

pub use script_ops::ScriptCache;

use super::command::Command;
use super::data::Value;
use super::reply::Reply;
use ahash::AHashMap;

/// A write against a single key, published as `__keyspace@<db>__:<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub event: String,
}

pub struct Executor {
    pub(crate) data: AHashMap<String, Value>,
    pub(crate) events: Vec<KeyEvent>,
    pub(crate) commands_processed: u64,
    pub(crate) script_cache: ScriptCache,
    pub(crate) in_script: bool,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Executor {
            data: AHashMap::new(),
            events: Vec::new(),
            commands_processed: 0,
            script_cache: ScriptCache::new(),
            in_script: false,
        }
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed
    }

    pub fn key_count(&self) -> usize {
        self.data.len()
    }

    /// Take the events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<KeyEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn notify(&mut self, key: &str, event: &str) {
        self.events.push(KeyEvent {
            key: key.to_string(),
            event: event.to_string(),
        });
    }

    /// Drop `key` if it holds a collection that became empty.
    pub(crate) fn reap_if_empty(&mut self, key: &str) {
        if self
            .data
            .get(key)
            .map(|v| v.is_empty_collection())
            .unwrap_or(false)
        {
            self.data.remove(key);
            self.notify(key, "del");
        }

        // TigerStyle: Postcondition
        debug_assert!(
            self.data
                .get(key)
                .map(|v| !v.is_empty_collection())
                .unwrap_or(true),
            "Postcondition violated: empty collections must not stay in the keyspace"
        );
    }

    pub fn execute(&mut self, cmd: &Command) -> Reply {
        self.commands_processed += 1;

        match cmd {
            Command::Ping => Reply::Status("PONG".to_string()),
            Command::Get(key) => self.execute_get(key),
            Command::Set(key, value) => self.execute_set(key, value),
            Command::Del(keys) => self.execute_del(keys),
            Command::Exists(keys) => self.execute_exists(keys),
            Command::MGet(keys) => self.execute_mget(keys),
            Command::MSet(pairs) => self.execute_mset(pairs),
            Command::Incr(key) => self.execute_incr(key),
            Command::FlushAll => self.execute_flushall(),

            Command::LPush(key, values) => self.execute_push(key, values, true),
            Command::RPush(key, values) => self.execute_push(key, values, false),
            Command::LIndex(key, index) => self.execute_lindex(key, *index),
            Command::LRange(key, start, stop) => self.execute_lrange(key, *start, *stop),
            Command::LLen(key) => self.execute_llen(key),
            Command::LRem(key, count, value) => self.execute_lrem(key, *count, value),
            Command::LInsert {
                key,
                before,
                pivot,
                value,
            } => self.execute_linsert(key, *before, pivot, value),
            Command::LPos(key, value) => self.execute_lpos(key, value),

            Command::ZAdd(key, pairs) => self.execute_zadd(key, pairs),
            Command::ZRem(key, members) => self.execute_zrem(key, members),
            Command::ZRange {
                key,
                start,
                stop,
                with_scores,
            } => self.execute_zrange(key, *start, *stop, *with_scores),
            Command::ZRangeByLex { key, min, max } => self.execute_zrangebylex(key, min, max),
            Command::ZRank(key, member) => self.execute_zrank(key, member),
            Command::ZScore(key, member) => self.execute_zscore(key, member),
            Command::ZCard(key) => self.execute_zcard(key),

            Command::HSet(key, pairs) => self.execute_hset(key, pairs),
            Command::HGet(key, field) => self.execute_hget(key, field),
            Command::HDel(key, fields) => self.execute_hdel(key, fields),
            Command::HExists(key, field) => self.execute_hexists(key, field),
            Command::HGetAll(key) => self.execute_hgetall(key),
            Command::HVals(key) => self.execute_hvals(key),

            Command::Eval { .. }
            | Command::EvalSha { .. }
            | Command::ScriptLoad(_)
            | Command::ScriptExists(_)
            | Command::ScriptFlush
                if self.in_script =>
            {
                Reply::err("ERR This Redis command is not allowed from script")
            }
            Command::Eval { script, keys, args } => self.execute_eval(script, keys, args),
            Command::EvalSha { sha1, keys, args } => self.execute_evalsha(sha1, keys, args),
            Command::ScriptLoad(script) => self.execute_script_load(script),
            Command::ScriptExists(shas) => self.execute_script_exists(shas),
            Command::ScriptFlush => self.execute_script_flush(),
        }
    }
}
