//! List command implementations.
//!
//! Handles: LPUSH, RPUSH, LINDEX, LRANGE, LLEN, LREM, LINSERT, LPOS
//!
//! # TigerStyle Invariants
//!
//! - LPUSH/RPUSH: result length = pre_length + pushed_count
//! - LREM: result length = pre_length - removed
//! - LINSERT: a missing key or pivot leaves the list untouched

use super::Executor;
use crate::keyspace::data::{List, Value};
use crate::keyspace::reply::Reply;
use bytes::Bytes;

impl Executor {
    fn list(&self, key: &str) -> Result<Option<&List>, Reply> {
        match self.data.get(key) {
            Some(Value::List(l)) => Ok(Some(l)),
            Some(_) => Err(Reply::wrong_type()),
            None => Ok(None),
        }
    }

    pub(super) fn execute_push(&mut self, key: &str, values: &[Bytes], front: bool) -> Reply {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(List::new()));
        let Value::List(list) = entry else {
            return Reply::wrong_type();
        };

        #[cfg(debug_assertions)]
        let pre_len = list.len();

        for value in values {
            if front {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        let new_len = list.len();

        // TigerStyle: Postcondition - length increased by pushed count
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            new_len,
            pre_len + values.len(),
            "Postcondition violated: push must grow the list by the pushed count"
        );

        self.notify(key, if front { "lpush" } else { "rpush" });
        Reply::Integer(new_len as i64)
    }

    pub(super) fn execute_lindex(&self, key: &str, index: isize) -> Reply {
        match self.list(key) {
            Ok(Some(l)) => Reply::Bulk(l.get(index).cloned()),
            Ok(None) => Reply::nil(),
            Err(e) => e,
        }
    }

    pub(super) fn execute_lrange(&self, key: &str, start: isize, stop: isize) -> Reply {
        match self.list(key) {
            Ok(Some(l)) => {
                let items = l.range(start, stop);
                Reply::array(items.into_iter().map(|b| Reply::Bulk(Some(b))).collect())
            }
            Ok(None) => Reply::array(Vec::new()),
            Err(e) => e,
        }
    }

    pub(super) fn execute_llen(&self, key: &str) -> Reply {
        match self.list(key) {
            Ok(Some(l)) => Reply::Integer(l.len() as i64),
            Ok(None) => Reply::Integer(0),
            Err(e) => e,
        }
    }

    pub(super) fn execute_lrem(&mut self, key: &str, count: isize, value: &[u8]) -> Reply {
        let removed = match self.data.get_mut(key) {
            Some(Value::List(l)) => l.remove(count, value),
            Some(_) => return Reply::wrong_type(),
            None => return Reply::Integer(0),
        };

        if removed > 0 {
            self.notify(key, "lrem");
            self.reap_if_empty(key);
        }
        Reply::Integer(removed as i64)
    }

    pub(super) fn execute_linsert(
        &mut self,
        key: &str,
        before: bool,
        pivot: &[u8],
        value: &Bytes,
    ) -> Reply {
        let inserted = match self.data.get_mut(key) {
            Some(Value::List(l)) => l.insert(before, pivot, value.clone()),
            Some(_) => return Reply::wrong_type(),
            None => return Reply::Integer(0),
        };

        match inserted {
            Some(len) => {
                self.notify(key, "linsert");
                Reply::Integer(len as i64)
            }
            None => Reply::Integer(-1),
        }
    }

    pub(super) fn execute_lpos(&self, key: &str, value: &[u8]) -> Reply {
        match self.list(key) {
            Ok(Some(l)) => match l.position(value) {
                Some(i) => Reply::Integer(i as i64),
                None => Reply::nil(),
            },
            Ok(None) => Reply::nil(),
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
    fn test_lpush_prepends_in_argument_order() {
        let mut exec = Executor::new();
        exec.execute_push("l", &[b("a"), b("b")], true);
        assert_eq!(
            exec.execute_lrange("l", 0, -1),
            Reply::array(vec![Reply::bulk("b"), Reply::bulk("a")])
        );
    }

    #[test]
    fn test_linsert_missing_pivot_and_key() {
        let mut exec = Executor::new();
        assert_eq!(exec.execute_linsert("l", false, b"a", &b("x")), Reply::Integer(0));
        exec.execute_push("l", &[b("a")], false);
        assert_eq!(exec.execute_linsert("l", false, b"z", &b("x")), Reply::Integer(-1));
        assert_eq!(exec.execute_linsert("l", false, b"a", &b("x")), Reply::Integer(2));
        assert_eq!(exec.execute_lpos("l", b"x"), Reply::Integer(1));
        assert_eq!(exec.execute_lpos("l", b"nope"), Reply::nil());
    }

    #[test]
    fn test_lindex_out_of_range_is_nil() {
        let mut exec = Executor::new();
        exec.execute_push("l", &[b("a")], false);
        assert_eq!(exec.execute_lindex("l", 5), Reply::nil());
        assert_eq!(exec.execute_lindex("l", -1), Reply::bulk("a"));
        assert_eq!(exec.execute_llen("missing"), Reply::Integer(0));
    }
}
