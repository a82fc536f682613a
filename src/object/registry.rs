//! Type registry: stored discriminator to decode/delete dispatch.
//!
//! Built once at startup and then shared read-only. Dispatch is through
//! plain function pointers monomorphised per registered type.

use super::codec;
use super::{AnyObject, Document, ObjectStore, Trashable};
use crate::error::{Result, StoreError};
use ahash::AHashMap;
use serde_json::Value as Json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub(crate) type DecodeFn = fn(&str, Json) -> Result<AnyObject>;
pub(crate) type PurgeFn = for<'a> fn(
    &'a str,
    AnyObject,
    &'a ObjectStore,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

struct Entry {
    decode: DecodeFn,
    purge: Option<PurgeFn>,
}

fn decode_as<T: Document>(key: &str, fields: Json) -> Result<AnyObject> {
    let obj: AnyObject = Arc::new(codec::decode_fields::<T>(key, fields)?);
    Ok(obj)
}

fn purge_as<'a, T: Trashable>(
    key: &'a str,
    obj: AnyObject,
    objects: &'a ObjectStore,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    match obj.downcast::<T>() {
        Ok(obj) => obj.delete(key, objects),
        Err(_) => Box::pin(async move {
            Err(StoreError::Type {
                key: key.to_string(),
                expected: T::TAG,
                found: "a different registered type".to_string(),
            })
        }),
    }
}

#[derive(Default)]
pub struct Registry {
    entries: AHashMap<&'static str, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            entries: AHashMap::new(),
        }
    }

    fn insert(&mut self, tag: &'static str, entry: Entry) -> Result<()> {
        if self.entries.contains_key(tag) {
            return Err(StoreError::InvalidArgument(format!(
                "type tag {} registered twice",
                tag
            )));
        }
        self.entries.insert(tag, entry);
        Ok(())
    }

    pub fn register<T: Document>(&mut self) -> Result<()> {
        self.insert(
            T::TAG,
            Entry {
                decode: decode_as::<T>,
                purge: None,
            },
        )
    }

    /// Register a type the deferred-deletion sweep may purge.
    pub fn register_trashable<T: Trashable>(&mut self) -> Result<()> {
        self.insert(
            T::TAG,
            Entry {
                decode: decode_as::<T>,
                purge: Some(purge_as::<T>),
            },
        )
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a stored payload. Unknown tags are a protocol error.
    pub(crate) fn decode(&self, key: &str, raw: &[u8]) -> Result<(&'static str, AnyObject)> {
        let (tag, fields) = codec::decode_envelope(key, raw)?;
        let Some((tag, entry)) = self.entries.get_key_value(tag.as_str()) else {
            return Err(StoreError::protocol(format!(
                "{}: unknown type tag {:?}",
                key, tag
            )));
        };
        Ok((*tag, (entry.decode)(key, fields)?))
    }

    pub(crate) fn purge_fn(&self, tag: &str) -> Option<PurgeFn> {
        self.entries.get(tag).and_then(|e| e.purge)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.entries.keys().collect();
        tags.sort();
        f.debug_struct("Registry").field("tags", &tags).finish()
    }
}
