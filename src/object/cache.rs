//! Identity cache.
//!
//! Maps a key to a weak handle on the last instance decoded or written for
//! it. The cache never keeps an object alive: once the last `Arc` goes away
//! the entry is dead and is pruned on the next lookup or sweep.

use super::AnyObject;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Full sweep of dead entries every this many insertions.
const PRUNE_INTERVAL: usize = 256;

struct Slot {
    tag: &'static str,
    object: Weak<dyn Any + Send + Sync>,
}

pub struct IdentityCache {
    entries: Mutex<AHashMap<String, Slot>>,
    enabled: AtomicBool,
    inserts: AtomicUsize,
}

impl IdentityCache {
    pub fn new(enabled: bool) -> Self {
        IdentityCache {
            entries: Mutex::new(AHashMap::new()),
            enabled: AtomicBool::new(enabled),
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turning the cache off drops every entry.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.entries.lock().clear();
        }
    }

    pub fn get(&self, key: &str) -> Option<(&'static str, AnyObject)> {
        if !self.enabled() {
            return None;
        }
        let mut entries = self.entries.lock();
        let slot = entries.get(key)?;
        match slot.object.upgrade() {
            Some(object) => Some((slot.tag, object)),
            None => {
                entries.remove(key);
                None
            }
        }
    }

    /// Make `object` the instance for `key`, replacing any live one.
    pub fn put(&self, key: &str, tag: &'static str, object: &AnyObject) {
        if !self.enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        self.insert(&mut entries, key, tag, object);
    }

    /// Return the live instance for `key` if there is one, otherwise cache
    /// `object` and hand it back.
    pub fn get_or_insert(
        &self,
        key: &str,
        tag: &'static str,
        object: AnyObject,
    ) -> (&'static str, AnyObject) {
        if !self.enabled() {
            return (tag, object);
        }
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get(key) {
            if let Some(existing) = slot.object.upgrade() {
                return (slot.tag, existing);
            }
        }
        self.insert(&mut entries, key, tag, &object);
        (tag, object)
    }

    fn insert(
        &self,
        entries: &mut AHashMap<String, Slot>,
        key: &str,
        tag: &'static str,
        object: &AnyObject,
    ) {
        entries.insert(
            key.to_string(),
            Slot {
                tag,
                object: Arc::downgrade(object),
            },
        );

        if self.inserts.fetch_add(1, Ordering::Relaxed) % PRUNE_INTERVAL == PRUNE_INTERVAL - 1 {
            entries.retain(|_, slot| slot.object.strong_count() > 0);
        }
    }

    pub fn evict(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Drop dead entries. Returns how many remain.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|_, slot| slot.object.strong_count() > 0);
        entries.len()
    }

    /// Entries whose object is still alive.
    pub fn live(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| slot.object.strong_count() > 0)
            .count()
    }
}
