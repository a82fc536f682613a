//! Typed collections over identifier sequences.
//!
//! A [`Collection`] pairs a [`Sequence`] of keys with the [`ObjectStore`]:
//! positions and slices resolve to decoded objects, string keys resolve
//! through a membership check and a single fetch.

mod sequence;
mod slice;

pub use sequence::{lexical_id, lexical_member, Backing, Sequence, LEXICAL_SEPARATOR};
pub use slice::Slice;

use crate::error::{Result, StoreError};
use crate::object::{Document, ObjectStore};
use bytes::Bytes;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// What an access is about to touch. Passed to the check hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    Index(isize),
    Slice(Slice),
    Key(&'a str),
}

/// Access hook run before any store I/O; an `Err` aborts the access.
pub type Check = Arc<dyn Fn(&Selector<'_>) -> Result<()> + Send + Sync>;

/// One page of a collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Length of the whole collection when the page was taken.
    pub count: usize,
    pub items: Vec<Arc<T>>,
    /// Effective bounds of `items`, `stop - start == items.len()`.
    pub start: usize,
    pub stop: usize,
}

pub struct Collection<T> {
    seq: Sequence,
    objects: ObjectStore,
    check: Option<Check>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            seq: self.seq.clone(),
            objects: self.objects.clone(),
            check: self.check.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("seq", &self.seq)
            .field("checked", &self.check.is_some())
            .finish()
    }
}

impl<T: Document> Collection<T> {
    pub fn new(objects: ObjectStore, seq: Sequence) -> Self {
        Collection {
            seq,
            objects,
            check: None,
            _marker: PhantomData,
        }
    }

    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Selector<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    fn authorize(&self, selector: Selector<'_>) -> Result<()> {
        match &self.check {
            Some(check) => check(&selector),
            None => Ok(()),
        }
    }

    pub async fn len(&self) -> Result<usize> {
        self.seq.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.seq.is_empty().await
    }

    /// Object at `index`; negative indices count from the end.
    pub async fn at(&self, index: isize) -> Result<Arc<T>> {
        self.authorize(Selector::Index(index))?;
        match self.seq.get(index).await? {
            Some(id) => self.objects.require::<T>(&id).await,
            None => Err(StoreError::NotFound(format!("{}[{}]", self.seq.key(), index))),
        }
    }

    pub async fn slice(&self, slice: impl Into<Slice>) -> Result<Vec<Arc<T>>> {
        let slice = slice.into();
        self.authorize(Selector::Slice(slice))?;
        let ids = self.seq.slice(slice).await?;
        self.fetch(&ids).await
    }

    /// Member `key`, after confirming it belongs to this collection.
    pub async fn by_key(&self, key: &str) -> Result<Arc<T>> {
        self.authorize(Selector::Key(key))?;
        if !self.seq.contains(key).await? {
            return Err(StoreError::NotFound(format!("{} in {}", key, self.seq.key())));
        }
        self.objects.require::<T>(key).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        self.authorize(Selector::Key(key))?;
        self.seq.contains(key).await
    }

    pub async fn index_of(&self, key: &str) -> Result<usize> {
        self.authorize(Selector::Key(key))?;
        self.seq
            .index_of(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} in {}", key, self.seq.key())))
    }

    pub async fn to_page(&self, slice: impl Into<Slice>) -> Result<Page<T>> {
        let slice = slice.into();
        self.authorize(Selector::Slice(slice))?;
        let count = self.seq.len().await?;
        let (start, stop) = slice.resolve(count);
        let ids = self.seq.range(start, stop).await?;
        let items = self.fetch(&ids).await?;

        let stop = start + items.len();
        // TigerStyle: Postcondition
        debug_assert!(stop <= count.max(start), "Postcondition violated: page within bounds");
        Ok(Page {
            count,
            items,
            start,
            stop,
        })
    }

    /// Batch fetch; identifiers whose object is gone are skipped.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Arc<T>>> {
        let fetched = self.objects.get_many::<T>(ids).await?;
        let mut items = Vec::with_capacity(fetched.len());
        for (id, obj) in ids.iter().zip(fetched) {
            match obj {
                Some(obj) => items.push(obj),
                None => warn!(key = %id, seq = %self.seq.key(), "Dangling identifier in sequence"),
            }
        }
        Ok(items)
    }
}

/// Manual reordering of a list-backed sequence.
///
/// `move_item` is a remove followed by an insert. A concurrent reader can
/// observe the sequence between the two steps without the item.
pub trait Orderable: Sync {
    fn ordering(&self) -> &Sequence;

    fn authorize_move(&self, _item: &str) -> Result<()> {
        Ok(())
    }

    /// Place `item` right after `to`, or first when `to` is `None`.
    fn move_item<'a>(
        &'a self,
        item: &'a str,
        to: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.authorize_move(item)?;
            let seq = self.ordering();
            if *seq.backing() != Backing::List {
                return Err(StoreError::InvalidArgument(format!(
                    "{} is not list-backed",
                    seq.key()
                )));
            }
            let store = seq.store();
            let key = seq.key();

            if let Some(to) = to {
                if !seq.contains(to).await? {
                    return Err(StoreError::TargetNotFound(to.to_string()));
                }
                if to == item {
                    return Ok(());
                }
            }

            if store.lrem(key, 1, item.to_string()).await? == 0 {
                return Err(StoreError::ItemNotFound(item.to_string()));
            }

            match to {
                Some(to) => {
                    let inserted = store
                        .linsert(key, false, to.to_string(), item.to_string())
                        .await?;
                    if inserted < 0 {
                        // Target vanished between the check and the insert.
                        store.lpush(key, vec![Bytes::from(item.to_string())]).await?;
                        return Err(StoreError::TargetNotFound(to.to_string()));
                    }
                }
                None => {
                    store.lpush(key, vec![Bytes::from(item.to_string())]).await?;
                }
            }
            debug!(key = %key, item = %item, after = ?to, "Moved item");
            Ok(())
        })
    }
}

impl<T: Document> Orderable for Collection<T> {
    fn ordering(&self) -> &Sequence {
        &self.seq
    }

    fn authorize_move(&self, item: &str) -> Result<()> {
        self.authorize(Selector::Key(item))
    }
}
