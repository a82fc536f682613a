//! Hash command implementations.
//!
//! Handles: HSET, HGET, HDEL, HEXISTS, HGETALL, HVALS

use super::Executor;
use crate::keyspace::data::{Hash, Value};
use crate::keyspace::reply::Reply;
use bytes::Bytes;

impl Executor {
    fn hash(&self, key: &str) -> Result<Option<&Hash>, Reply> {
        match self.data.get(key) {
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(Reply::wrong_type()),
            None => Ok(None),
        }
    }

    pub(super) fn execute_hset(&mut self, key: &str, pairs: &[(Bytes, Bytes)]) -> Reply {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(Hash::new()));
        let Value::Hash(hash) = entry else {
            return Reply::wrong_type();
        };

        let mut added = 0i64;
        for (field, value) in pairs {
            if hash.set(field.clone(), value.clone()) {
                added += 1;
            }
        }

        self.notify(key, "hset");
        Reply::Integer(added)
    }

    pub(super) fn execute_hget(&self, key: &str, field: &[u8]) -> Reply {
        match self.hash(key) {
            Ok(Some(h)) => Reply::Bulk(h.get(field).cloned()),
            Ok(None) => Reply::nil(),
            Err(e) => e,
        }
    }

    pub(super) fn execute_hdel(&mut self, key: &str, fields: &[Bytes]) -> Reply {
        let removed = match self.data.get_mut(key) {
            Some(Value::Hash(h)) => fields.iter().filter(|f| h.remove(f)).count(),
            Some(_) => return Reply::wrong_type(),
            None => return Reply::Integer(0),
        };

        if removed > 0 {
            self.notify(key, "hdel");
            self.reap_if_empty(key);
        }
        Reply::Integer(removed as i64)
    }

    pub(super) fn execute_hexists(&self, key: &str, field: &[u8]) -> Reply {
        match self.hash(key) {
            Ok(Some(h)) => Reply::Integer(h.contains(field) as i64),
            Ok(None) => Reply::Integer(0),
            Err(e) => e,
        }
    }

    pub(super) fn execute_hgetall(&self, key: &str) -> Reply {
        match self.hash(key) {
            Ok(Some(h)) => {
                let mut out = Vec::with_capacity(h.len() * 2);
                for (field, value) in h.iter() {
                    out.push(Reply::Bulk(Some(field.clone())));
                    out.push(Reply::Bulk(Some(value.clone())));
                }
                Reply::array(out)
            }
            Ok(None) => Reply::array(Vec::new()),
            Err(e) => e,
        }
    }

    pub(super) fn execute_hvals(&self, key: &str) -> Reply {
        match self.hash(key) {
            Ok(Some(h)) => Reply::array(h.values().map(|v| Reply::Bulk(Some(v.clone()))).collect()),
            Ok(None) => Reply::array(Vec::new()),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_hset_counts_new_fields() {
        let mut exec = Executor::new();
        assert_eq!(
            exec.execute_hset("h", &[(b("a"), b("1")), (b("b"), b("2"))]),
            Reply::Integer(2)
        );
        assert_eq!(exec.execute_hset("h", &[(b("a"), b("3"))]), Reply::Integer(0));
        assert_eq!(exec.execute_hget("h", b"a"), Reply::bulk("3"));
        assert_eq!(exec.execute_hexists("h", b"b"), Reply::Integer(1));
        assert_eq!(exec.execute_hexists("h", b"z"), Reply::Integer(0));
    }

    #[test]
    fn test_hgetall_pairs() {
        let mut exec = Executor::new();
        exec.execute_hset("h", &[(b("f"), b("v"))]);
        assert_eq!(
            exec.execute_hgetall("h"),
            Reply::array(vec![Reply::bulk("f"), Reply::bulk("v")])
        );
        assert_eq!(exec.execute_hvals("h"), Reply::array(vec![Reply::bulk("v")]));
        assert_eq!(exec.execute_hgetall("missing"), Reply::array(vec![]));
    }
}
