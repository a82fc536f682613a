//! Persistence and coordination layer over a Redis-style key-value store.
//!
//! Layers, bottom up:
//!
//! - [`keyspace`]: embedded single-actor engine (strings, lists, hashes,
//!   sorted sets, Lua scripting, keyspace notifications)
//! - [`store`]: typed client over the embedded engine or a RESP server
//! - [`object`]: tagged-JSON documents with a weak identity cache
//! - [`collection`]: ordered views and typed collections over id sequences
//! - [`compound`]: atomic multi-key scripts (roles, lexical indexes)
//! - [`trash`]: deferred-deletion queue and its sweeper
//! - [`ratelimit`]: fixed-window per-client counters
//!
//! [`Database`] wires them together from a [`Config`].

pub mod clock;
pub mod collection;
pub mod compound;
pub mod config;
pub mod database;
pub mod error;
pub mod keyspace;
pub mod object;
pub mod observability;
pub mod ratelimit;
pub mod store;
pub mod tasks;
pub mod trash;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use collection::{Collection, Orderable, Page, Selector, Sequence, Slice};
pub use compound::{Indexed, IndexedCollection, LexicalIndex, RoleTable};
pub use config::Config;
pub use database::Database;
pub use error::{Conflict, ErrorKind, Result, StoreError};
pub use object::{Document, Fallback, Object, ObjectStore, Registry, Trashable};
pub use ratelimit::{RateLimitRule, RateLimiter};
pub use store::{Endpoint, Store, Subscription};
pub use trash::{ObjectPurge, Pop, Purge, Sweeper, TrashEntry, TrashQueue};
