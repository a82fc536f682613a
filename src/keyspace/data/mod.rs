//! Keyspace value types
//!
//! - `Value`: union of every value kind a key can hold
//! - `List`: double-ended list (LPUSH/RPUSH/LINSERT/LREM)
//! - `Hash`: field-value map
//! - `SortedSet`: members ordered by `(score, member bytes)`

mod hash;
mod list;
mod sorted_set;
mod value;

pub use hash::Hash;
pub use list::List;
pub use sorted_set::{LexBound, SortedSet};
pub use value::Value;
