//! Collections with a primary order and a lexical secondary index.
//!
//! Layout for a collection rooted at `base`:
//!
//! ```text
//! <base>            list   ids in manual order
//! <base>:lex        zset   lexical_member(sort field, id) at score 0
//! <base>:lex:rev    hash   id -> lexical member
//! <id>              string the tagged object
//! ```
//!
//! Create, rename and delete touch all four in one script, so at rest the
//! ids in the list and in the lexical index are the same set.

use super::expect_ok;
use crate::collection::{lexical_member, Collection, Sequence};
use crate::error::Result;
use crate::object::{Document, ObjectStore};
use crate::store::Script;
use bytes::Bytes;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Documents ordered by a text attribute.
pub trait Indexed: Document {
    fn sort_field(&self) -> &str;
}

// KEYS: object, primary list, lex zset, reverse hash
// ARGV: id, encoded object, lexical member
static CREATE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('HEXISTS', KEYS[4], ARGV[1]) == 1 then return 'already-exists' end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('RPUSH', KEYS[2], ARGV[1])
redis.call('ZADD', KEYS[3], 0, ARGV[3])
redis.call('HSET', KEYS[4], ARGV[1], ARGV[3])
return 'ok'
"#,
    )
});

// Same KEYS and ARGV as CREATE.
static RENAME: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local old = redis.call('HGET', KEYS[4], ARGV[1])
if not old then return 'member-missing' end
redis.call('ZREM', KEYS[3], old)
redis.call('ZADD', KEYS[3], 0, ARGV[3])
redis.call('HSET', KEYS[4], ARGV[1], ARGV[3])
redis.call('SET', KEYS[1], ARGV[2])
return 'ok'
"#,
    )
});

// KEYS: object, primary list, lex zset, reverse hash, then auxiliary keys
// ARGV: id
static DELETE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local old = redis.call('HGET', KEYS[4], ARGV[1])
if not old then return 'member-missing' end
redis.call('LREM', KEYS[2], 0, ARGV[1])
redis.call('ZREM', KEYS[3], old)
redis.call('HDEL', KEYS[4], ARGV[1])
redis.call('DEL', KEYS[1])
for i = 5, #KEYS do
    redis.call('DEL', KEYS[i])
end
return 'ok'
"#,
    )
});

/// The sorted set plus reverse map behind a lexical ordering.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    seq: Sequence,
}

impl LexicalIndex {
    pub fn key(&self) -> &str {
        self.seq.key()
    }

    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// Ids in sort-field order, ties broken by id.
    pub async fn ids(&self) -> Result<Vec<String>> {
        self.seq.all().await
    }

    pub async fn contains(&self, id: &str) -> Result<bool> {
        self.seq.contains(id).await
    }

    /// Ids whose sort field starts with `prefix`, case-insensitively.
    pub async fn search(&self, prefix: &str) -> Result<Vec<String>> {
        self.seq.search(prefix).await
    }
}

pub struct IndexedCollection<T> {
    objects: ObjectStore,
    base: String,
    rev_key: String,
    lex: LexicalIndex,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for IndexedCollection<T> {
    fn clone(&self) -> Self {
        IndexedCollection {
            objects: self.objects.clone(),
            base: self.base.clone(),
            rev_key: self.rev_key.clone(),
            lex: self.lex.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for IndexedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedCollection")
            .field("base", &self.base)
            .field("lex", &self.lex.key())
            .finish()
    }
}

impl<T: Indexed> IndexedCollection<T> {
    pub fn new(objects: ObjectStore, base: impl Into<String>) -> Self {
        let base = base.into();
        let lex_key = format!("{}:lex", base);
        let rev_key = format!("{}:lex:rev", base);
        let lex = LexicalIndex {
            seq: Sequence::lexical(objects.store().clone(), lex_key, rev_key.clone()),
        };
        IndexedCollection {
            objects,
            base,
            rev_key,
            lex,
            _marker: PhantomData,
        }
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lex
    }

    /// Manual order; supports `Orderable::move_item`.
    pub fn by_order(&self) -> Collection<T> {
        Collection::new(
            self.objects.clone(),
            Sequence::list(self.objects.store().clone(), self.base.clone()),
        )
    }

    pub fn by_sort_field(&self) -> Collection<T> {
        Collection::new(self.objects.clone(), self.lex.seq.clone())
    }

    fn keys(&self, id: &str) -> Vec<String> {
        vec![
            id.to_string(),
            self.base.clone(),
            self.lex.key().to_string(),
            self.rev_key.clone(),
        ]
    }

    fn args(&self, id: &str, obj: &T) -> Result<Vec<Bytes>> {
        Ok(vec![
            Bytes::from(id.to_string()),
            self.objects.encode(obj)?,
            Bytes::from(lexical_member(obj.sort_field(), id)),
        ])
    }

    /// Store `obj` under `id` and register it in both orders.
    pub async fn create(&self, id: &str, obj: &Arc<T>) -> Result<()> {
        let reply = self
            .objects
            .store()
            .run_script(&CREATE, self.keys(id), self.args(id, obj)?)
            .await?;
        expect_ok("create", reply)?;
        self.objects.cache_put(id, obj);
        debug!(base = %self.base, id = %id, "Created indexed entry");
        Ok(())
    }

    /// Replace the object under `id`, moving its lexical entry.
    pub async fn rename(&self, id: &str, obj: &Arc<T>) -> Result<()> {
        let reply = self
            .objects
            .store()
            .run_script(&RENAME, self.keys(id), self.args(id, obj)?)
            .await?;
        expect_ok("rename", reply)?;
        self.objects.cache_put(id, obj);
        debug!(base = %self.base, id = %id, "Renamed indexed entry");
        Ok(())
    }

    /// Remove `id` everywhere, along with `aux_keys` owned by the entry.
    pub async fn delete(&self, id: &str, aux_keys: &[String]) -> Result<()> {
        let mut keys = self.keys(id);
        keys.extend(aux_keys.iter().cloned());
        let reply = self
            .objects
            .store()
            .run_script(&DELETE, keys, vec![Bytes::from(id.to_string())])
            .await?;
        self.objects.evict(id);
        expect_ok("delete", reply)?;
        debug!(base = %self.base, id = %id, aux = aux_keys.len(), "Deleted indexed entry");
        Ok(())
    }

    pub async fn search(&self, prefix: &str) -> Result<Vec<Arc<T>>> {
        let ids = self.lex.search(prefix).await?;
        let fetched = self.objects.get_many::<T>(&ids).await?;
        Ok(fetched.into_iter().flatten().collect())
    }
}
