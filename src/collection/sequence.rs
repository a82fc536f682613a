//! Read-only views over store-held identifier sequences.
//!
//! | backing  | order                        | `index_of` / `contains` |
//! |----------|------------------------------|-------------------------|
//! | list     | insertion (LPUSH/RPUSH)      | full scan (LPOS)        |
//! | ranked   | score; negate for newest-first | ZRANK / ZSCORE        |
//! | lexical  | sort field, then id          | reverse map + ZRANK     |

use super::Slice;
use crate::error::Result;
use crate::keyspace::LexBound;
use crate::store::Store;
use bytes::Bytes;

/// Separates the sort field from the id in a lexical index member.
pub const LEXICAL_SEPARATOR: char = '\0';

/// Lexical index member for `id` ordered by `sort_field` (case-folded).
pub fn lexical_member(sort_field: &str, id: &str) -> String {
    format!("{}{}{}", sort_field.to_lowercase(), LEXICAL_SEPARATOR, id)
}

/// The id part of a lexical index member.
pub fn lexical_id(member: &str) -> &str {
    member
        .rsplit_once(LEXICAL_SEPARATOR)
        .map(|(_, id)| id)
        .unwrap_or(member)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    List,
    Ranked,
    /// Sorted set of `lexical_member`s, all at score 0, paired with a hash
    /// mapping id to member.
    Lexical { reverse_key: String },
}

#[derive(Debug, Clone)]
pub struct Sequence {
    store: Store,
    key: String,
    backing: Backing,
}

fn text(raw: Bytes) -> String {
    String::from_utf8_lossy(&raw).into_owned()
}

impl Sequence {
    pub fn list(store: Store, key: impl Into<String>) -> Self {
        Sequence {
            store,
            key: key.into(),
            backing: Backing::List,
        }
    }

    pub fn ranked(store: Store, key: impl Into<String>) -> Self {
        Sequence {
            store,
            key: key.into(),
            backing: Backing::Ranked,
        }
    }

    pub fn lexical(store: Store, key: impl Into<String>, reverse_key: impl Into<String>) -> Self {
        Sequence {
            store,
            key: key.into(),
            backing: Backing::Lexical {
                reverse_key: reverse_key.into(),
            },
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn decode(&self, raw: Bytes) -> String {
        let member = text(raw);
        match self.backing {
            Backing::Lexical { .. } => lexical_id(&member).to_string(),
            _ => member,
        }
    }

    pub async fn len(&self) -> Result<usize> {
        match self.backing {
            Backing::List => self.store.llen(&self.key).await,
            Backing::Ranked | Backing::Lexical { .. } => self.store.zcard(&self.key).await,
        }
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Identifier at `index`; negative indices count from the end.
    pub async fn get(&self, index: isize) -> Result<Option<String>> {
        let raw = match self.backing {
            Backing::List => self.store.lindex(&self.key, index).await?,
            Backing::Ranked | Backing::Lexical { .. } => self
                .store
                .zrange(&self.key, index, index)
                .await?
                .into_iter()
                .next(),
        };
        Ok(raw.map(|r| self.decode(r)))
    }

    /// Identifiers in the already-resolved `[start, stop)`.
    pub async fn range(&self, start: usize, stop: usize) -> Result<Vec<String>> {
        if start >= stop {
            return Ok(Vec::new());
        }
        let (first, last) = (start as isize, stop as isize - 1);
        let raw = match self.backing {
            Backing::List => self.store.lrange(&self.key, first, last).await?,
            Backing::Ranked | Backing::Lexical { .. } => {
                self.store.zrange(&self.key, first, last).await?
            }
        };
        Ok(raw.into_iter().map(|r| self.decode(r)).collect())
    }

    pub async fn slice(&self, slice: Slice) -> Result<Vec<String>> {
        let (start, stop) = slice.resolve(self.len().await?);
        self.range(start, stop).await
    }

    pub async fn all(&self) -> Result<Vec<String>> {
        let raw = match self.backing {
            Backing::List => self.store.lrange(&self.key, 0, -1).await?,
            Backing::Ranked | Backing::Lexical { .. } => self.store.zrange(&self.key, 0, -1).await?,
        };
        Ok(raw.into_iter().map(|r| self.decode(r)).collect())
    }

    pub async fn contains(&self, id: &str) -> Result<bool> {
        match &self.backing {
            Backing::List => Ok(self.store.lpos(&self.key, id.to_string()).await?.is_some()),
            Backing::Ranked => Ok(self.store.zscore(&self.key, id.to_string()).await?.is_some()),
            Backing::Lexical { reverse_key } => self.store.hexists(reverse_key, id.to_string()).await,
        }
    }

    pub async fn index_of(&self, id: &str) -> Result<Option<usize>> {
        match &self.backing {
            Backing::List => self.store.lpos(&self.key, id.to_string()).await,
            Backing::Ranked => self.store.zrank(&self.key, id.to_string()).await,
            Backing::Lexical { reverse_key } => {
                match self.store.hget(reverse_key, id.to_string()).await? {
                    Some(member) => self.store.zrank(&self.key, member).await,
                    None => Ok(None),
                }
            }
        }
    }

    /// Lexical backing only: ids whose sort field starts with `prefix`
    /// (case-folded). Other backings yield nothing.
    pub async fn search(&self, prefix: &str) -> Result<Vec<String>> {
        if !matches!(self.backing, Backing::Lexical { .. }) {
            return Ok(Vec::new());
        }
        let prefix = prefix.to_lowercase();
        let min = LexBound::Inclusive(Bytes::from(prefix.clone()));
        let max = match prefix_successor(&prefix) {
            Some(upper) => LexBound::Exclusive(Bytes::from(upper)),
            None => LexBound::PosInf,
        };
        let raw = self.store.zrangebylex(&self.key, min, max).await?;
        Ok(raw.into_iter().map(|r| self.decode(r)).collect())
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
fn prefix_successor(prefix: &str) -> Option<Vec<u8>> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.pop() {
        if last < u8::MAX {
            bytes.push(last + 1);
            return Some(bytes);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_lexical_member_round_trip() {
        let member = lexical_member("Groceries", "list:7");
        assert_eq!(member, "groceries\0list:7");
        assert_eq!(lexical_id(&member), "list:7");
        assert_eq!(lexical_id("plain"), "plain");
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor("ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(""), None);
    }

    #[tokio::test]
    async fn test_list_sequence() {
        let store = Store::memory();
        store.rpush("ids", vec![b("a"), b("b"), b("c")]).await.unwrap();
        let seq = Sequence::list(store, "ids");

        assert_eq!(seq.len().await.unwrap(), 3);
        assert_eq!(seq.get(-1).await.unwrap().as_deref(), Some("c"));
        assert_eq!(seq.get(9).await.unwrap(), None);
        assert_eq!(seq.slice(Slice::from(1..)).await.unwrap(), vec!["b", "c"]);
        assert_eq!(seq.index_of("b").await.unwrap(), Some(1));
        assert!(!seq.contains("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_ranked_sequence_newest_first() {
        let store = Store::memory();
        store.zadd("feed", vec![(-100.0, b("old"))]).await.unwrap();
        store.zadd("feed", vec![(-200.0, b("new"))]).await.unwrap();
        let seq = Sequence::ranked(store, "feed");

        assert_eq!(seq.all().await.unwrap(), vec!["new", "old"]);
        assert_eq!(seq.index_of("old").await.unwrap(), Some(1));
        assert!(seq.contains("new").await.unwrap());
        assert!(seq.search("n").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lexical_sequence_and_search() {
        let store = Store::memory();
        for (title, id) in [("Banana", "1"), ("apple", "2"), ("Apricot", "3")] {
            let member = lexical_member(title, id);
            store.zadd("by_title", vec![(0.0, b(&member))]).await.unwrap();
            store.hset("by_title:rev", vec![(b(id), b(&member))]).await.unwrap();
        }
        let seq = Sequence::lexical(store, "by_title", "by_title:rev");

        assert_eq!(seq.all().await.unwrap(), vec!["2", "3", "1"]);
        assert_eq!(seq.index_of("1").await.unwrap(), Some(2));
        assert!(seq.contains("3").await.unwrap());
        assert_eq!(seq.search("AP").await.unwrap(), vec!["2", "3"]);
        assert!(seq.search("cherry").await.unwrap().is_empty());
    }
}
