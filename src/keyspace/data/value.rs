//! Keyspace value enum

use super::{Hash, List, SortedSet};
use bytes::Bytes;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(Bytes),
    List(List),
    Hash(Hash),
    SortedSet(SortedSet),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
        }
    }

    /// Collections that become empty are removed from the keyspace.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::SortedSet(zs) => zs.is_empty(),
        }
    }
}
