//! Object store: typed domain objects over the backing store.
//!
//! Objects are stored as tagged JSON (see [`codec`]) and decoded through a
//! [`Registry`] built at startup. Decoded instances are handed out as
//! `Arc<T>`, and an [`IdentityCache`] of weak handles makes repeated lookups
//! of a key return the same instance for as long as anyone holds it.
//!
//! Batch variants are not atomic as a batch: a fault part way through can
//! leave some keys written and others not.

mod cache;
pub mod codec;
mod registry;

pub use cache::IdentityCache;
pub use registry::Registry;

use crate::error::{Result, StoreError};
use crate::store::Store;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Type-erased decoded object.
pub type AnyObject = Arc<dyn Any + Send + Sync>;

/// A type that can be stored. `TAG` is the stored discriminator and must be
/// unique within a registry.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + fmt::Debug + 'static {
    const TAG: &'static str;
}

/// A document the deferred-deletion sweep can permanently delete.
pub trait Trashable: Document {
    fn delete<'a>(
        self: Arc<Self>,
        key: &'a str,
        objects: &'a ObjectStore,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// What `get_or` yields for a missing key.
#[derive(Debug)]
pub enum Fallback<T> {
    Value(Arc<T>),
    Error(StoreError),
}

/// A decoded object of some registered type.
#[derive(Clone)]
pub struct Object {
    key: String,
    tag: &'static str,
    value: AnyObject,
}

impl Object {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn is<T: Document>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Narrow to `T`, failing with a type error on mismatch.
    pub fn downcast<T: Document>(self) -> Result<Arc<T>> {
        let Object { key, tag, value } = self;
        value.downcast::<T>().map_err(|_| StoreError::Type {
            key,
            expected: T::TAG,
            found: tag.to_string(),
        })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .finish()
    }
}

#[derive(Clone)]
pub struct ObjectStore {
    store: Store,
    registry: Arc<Registry>,
    cache: Arc<IdentityCache>,
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("caching", &self.caching())
            .finish()
    }
}

impl ObjectStore {
    pub fn new(store: Store, registry: Registry, caching: bool) -> Self {
        ObjectStore {
            store,
            registry: Arc::new(registry),
            cache: Arc::new(IdentityCache::new(caching)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn caching(&self) -> bool {
        self.cache.enabled()
    }

    /// Switch identity caching for every clone of this store. Disabling it
    /// drops all entries.
    pub fn set_caching(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    pub fn evict(&self, key: &str) {
        self.cache.evict(key);
    }

    /// Drop dead cache entries; returns how many remain.
    pub fn prune_cache(&self) -> usize {
        self.cache.prune()
    }

    /// Make `obj` the cached instance for `key` without writing it.
    pub fn cache_put<T: Document>(&self, key: &str, obj: &Arc<T>) {
        let any: AnyObject = obj.clone();
        self.cache.put(key, T::TAG, &any);
    }

    /// Encode `obj`, rejecting types the registry could not decode again.
    pub fn encode<T: Document>(&self, obj: &T) -> Result<Bytes> {
        if !self.registry.contains(T::TAG) {
            return Err(StoreError::InvalidArgument(format!(
                "type tag {} is not registered",
                T::TAG
            )));
        }
        codec::encode(obj)
    }

    fn decode(&self, key: &str, raw: &[u8]) -> Result<Object> {
        let (tag, value) = self.registry.decode(key, raw)?;
        // Another reader may have decoded the same key meanwhile.
        let (tag, value) = self.cache.get_or_insert(key, tag, value);
        Ok(Object {
            key: key.to_string(),
            tag,
            value,
        })
    }

    /// Fetch and decode whatever is stored at `key`.
    pub async fn get_object(&self, key: &str) -> Result<Option<Object>> {
        if let Some((tag, value)) = self.cache.get(key) {
            trace!(key, "identity cache hit");
            return Ok(Some(Object {
                key: key.to_string(),
                tag,
                value,
            }));
        }

        match self.store.get(key).await? {
            Some(raw) => Ok(Some(self.decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get<T: Document>(&self, key: &str) -> Result<Option<Arc<T>>> {
        match self.get_object(key).await? {
            Some(obj) => Ok(Some(obj.downcast()?)),
            None => Ok(None),
        }
    }

    /// `get`, with `fallback` deciding what a missing key produces.
    pub async fn get_or<T: Document>(&self, key: &str, fallback: Fallback<T>) -> Result<Arc<T>> {
        match self.get::<T>(key).await? {
            Some(obj) => Ok(obj),
            None => match fallback {
                Fallback::Value(v) => Ok(v),
                Fallback::Error(e) => Err(e),
            },
        }
    }

    /// `get`, failing with not-found for a missing key.
    pub async fn require<T: Document>(&self, key: &str) -> Result<Arc<T>> {
        self.get_or(key, Fallback::Error(StoreError::NotFound(key.to_string())))
            .await
    }

    pub async fn set<T: Document>(&self, key: &str, obj: &Arc<T>) -> Result<()> {
        let raw = self.encode(obj.as_ref())?;
        self.store.set(key, raw).await?;
        self.cache_put(key, obj);
        Ok(())
    }

    /// Per-key `get` semantics, fetched in one round trip for cache misses.
    pub async fn get_many<T: Document>(&self, keys: &[String]) -> Result<Vec<Option<Arc<T>>>> {
        let mut out: Vec<Option<Arc<T>>> = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match self.cache.get(key) {
                Some((tag, value)) => {
                    let obj = Object {
                        key: key.clone(),
                        tag,
                        value,
                    };
                    out.push(Some(obj.downcast()?));
                }
                None => {
                    out.push(None);
                    missing.push(i);
                }
            }
        }

        if !missing.is_empty() {
            let fetch: Vec<String> = missing.iter().map(|&i| keys[i].clone()).collect();
            let raws = self.store.mget(&fetch).await?;
            if raws.len() != fetch.len() {
                return Err(StoreError::protocol("MGET returned the wrong number of values"));
            }
            for (i, raw) in missing.into_iter().zip(raws) {
                if let Some(raw) = raw {
                    out[i] = Some(self.decode(&keys[i], &raw)?.downcast()?);
                }
            }
        }

        // TigerStyle: Postcondition
        debug_assert_eq!(out.len(), keys.len(), "Postcondition violated: one result per key");
        Ok(out)
    }

    /// Per-key `set` semantics. Not atomic as a batch.
    pub async fn set_many<T: Document>(&self, items: &[(String, Arc<T>)]) -> Result<()> {
        let mut pairs = Vec::with_capacity(items.len());
        for (key, obj) in items {
            pairs.push((key.clone(), self.encode(obj.as_ref())?));
        }
        self.store.mset(pairs).await?;
        for (key, obj) in items {
            self.cache_put(key, obj);
        }
        Ok(())
    }

    /// Remove the stored value and its cache entry.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.store.del(&[key]).await? > 0;
        self.cache.evict(key);
        debug!(key, removed, "object deleted");
        Ok(removed)
    }

    /// Run the registered delete hook for whatever is stored at `key`.
    /// Returns false if nothing is stored there anymore.
    pub async fn purge(&self, key: &str) -> Result<bool> {
        let Some(obj) = self.get_object(key).await? else {
            return Ok(false);
        };
        let Some(purge) = self.registry.purge_fn(obj.tag) else {
            return Err(StoreError::InvalidArgument(format!(
                "{}: type {} is not trashable",
                key, obj.tag
            )));
        };
        purge(key, obj.value, self).await?;
        self.cache.evict(key);
        Ok(true)
    }
}
