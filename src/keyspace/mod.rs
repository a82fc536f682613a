//! Embedded Redis-compatible keyspace.
//!
//! A single-owner executor for the subset of Redis the persistence layer
//! needs (strings, lists, sorted sets, hashes, Lua scripting), driven by an
//! actor and observable through keyspace notifications. The same [`Command`]
//! and [`Reply`] types are spoken over the network by the RESP transport.

mod actor;
mod command;
mod data;
mod executor;
mod reply;

pub use actor::{KeyspaceHandle, KeyspaceStats};
pub use command::{format_score, Command};
pub use data::{Hash, LexBound, List, SortedSet, Value};
pub use executor::{Executor, KeyEvent, ScriptCache};
pub use reply::{RespCodec, Reply};
