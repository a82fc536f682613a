//! Sorted set command implementations.
//!
//! Handles: ZADD, ZREM, ZRANGE [WITHSCORES], ZRANGEBYLEX, ZRANK, ZSCORE, ZCARD

use super::Executor;
use crate::keyspace::command::format_score;
use crate::keyspace::data::{LexBound, SortedSet, Value};
use crate::keyspace::reply::Reply;
use bytes::Bytes;

impl Executor {
    fn zset(&self, key: &str) -> Result<Option<&SortedSet>, Reply> {
        match self.data.get(key) {
            Some(Value::SortedSet(zs)) => Ok(Some(zs)),
            Some(_) => Err(Reply::wrong_type()),
            None => Ok(None),
        }
    }

    pub(super) fn execute_zadd(&mut self, key: &str, pairs: &[(f64, Bytes)]) -> Reply {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(SortedSet::new()));
        let Value::SortedSet(zs) = entry else {
            return Reply::wrong_type();
        };

        let mut added = 0i64;
        for (score, member) in pairs {
            if zs.add(member.clone(), *score) {
                added += 1;
            }
        }

        // TigerStyle: Postcondition
        debug_assert!(
            pairs.iter().all(|(_, m)| zs.score(m).is_some()),
            "Postcondition violated: every added member must be present"
        );

        self.notify(key, "zadd");
        Reply::Integer(added)
    }

    pub(super) fn execute_zrem(&mut self, key: &str, members: &[Bytes]) -> Reply {
        let removed = match self.data.get_mut(key) {
            Some(Value::SortedSet(zs)) => members.iter().filter(|m| zs.remove(m)).count(),
            Some(_) => return Reply::wrong_type(),
            None => return Reply::Integer(0),
        };

        if removed > 0 {
            self.notify(key, "zrem");
            self.reap_if_empty(key);
        }
        Reply::Integer(removed as i64)
    }

    pub(super) fn execute_zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        with_scores: bool,
    ) -> Reply {
        let zs = match self.zset(key) {
            Ok(Some(zs)) => zs,
            Ok(None) => return Reply::array(Vec::new()),
            Err(e) => return e,
        };

        let mut out = Vec::new();
        for (member, score) in zs.range(start, stop) {
            out.push(Reply::Bulk(Some(member)));
            if with_scores {
                out.push(Reply::bulk(format_score(score)));
            }
        }
        Reply::array(out)
    }

    pub(super) fn execute_zrangebylex(&self, key: &str, min: &LexBound, max: &LexBound) -> Reply {
        match self.zset(key) {
            Ok(Some(zs)) => Reply::array(
                zs.range_by_lex(min, max)
                    .into_iter()
                    .map(|m| Reply::Bulk(Some(m)))
                    .collect(),
            ),
            Ok(None) => Reply::array(Vec::new()),
            Err(e) => e,
        }
    }

    pub(super) fn execute_zrank(&self, key: &str, member: &[u8]) -> Reply {
        match self.zset(key) {
            Ok(Some(zs)) => match zs.rank(member) {
                Some(rank) => Reply::Integer(rank as i64),
                None => Reply::nil(),
            },
            Ok(None) => Reply::nil(),
            Err(e) => e,
        }
    }

    pub(super) fn execute_zscore(&self, key: &str, member: &[u8]) -> Reply {
        match self.zset(key) {
            Ok(Some(zs)) => match zs.score(member) {
                Some(score) => Reply::bulk(format_score(score)),
                None => Reply::nil(),
            },
            Ok(None) => Reply::nil(),
            Err(e) => e,
        }
    }

    pub(super) fn execute_zcard(&self, key: &str) -> Reply {
        match self.zset(key) {
            Ok(Some(zs)) => Reply::Integer(zs.len() as i64),
            Ok(None) => Reply::Integer(0),
            Err(e) => e,
        }
    }
}
