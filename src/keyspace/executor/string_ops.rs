//! String and key command implementations.
//!
//! Handles: GET, SET, DEL, EXISTS, MGET, MSET, INCR, FLUSHALL

use super::Executor;
use crate::keyspace::data::Value;
use crate::keyspace::reply::Reply;
use bytes::Bytes;

impl Executor {
    pub(super) fn execute_get(&self, key: &str) -> Reply {
        match self.data.get(key) {
            Some(Value::String(s)) => Reply::Bulk(Some(s.clone())),
            Some(_) => Reply::wrong_type(),
            None => Reply::nil(),
        }
    }

    pub(super) fn execute_set(&mut self, key: &str, value: &Bytes) -> Reply {
        self.data.insert(key.to_string(), Value::String(value.clone()));
        self.notify(key, "set");
        Reply::ok()
    }

    pub(super) fn execute_del(&mut self, keys: &[String]) -> Reply {
        let mut removed = 0i64;
        for key in keys {
            if self.data.remove(key).is_some() {
                removed += 1;
                self.notify(key, "del");
            }
        }

        // TigerStyle: Postcondition
        debug_assert!(
            keys.iter().all(|k| !self.data.contains_key(k)),
            "Postcondition violated: DEL must remove every named key"
        );

        Reply::Integer(removed)
    }

    pub(super) fn execute_exists(&self, keys: &[String]) -> Reply {
        let count = keys.iter().filter(|k| self.data.contains_key(*k)).count();
        Reply::Integer(count as i64)
    }

    pub(super) fn execute_mget(&self, keys: &[String]) -> Reply {
        let values = keys
            .iter()
            .map(|key| match self.data.get(key) {
                Some(Value::String(s)) => Reply::Bulk(Some(s.clone())),
                _ => Reply::nil(),
            })
            .collect();
        Reply::array(values)
    }

    pub(super) fn execute_mset(&mut self, pairs: &[(String, Bytes)]) -> Reply {
        for (key, value) in pairs {
            self.data.insert(key.clone(), Value::String(value.clone()));
            self.notify(key, "set");
        }
        Reply::ok()
    }

    pub(super) fn execute_incr(&mut self, key: &str) -> Reply {
        let current = match self.data.get(key) {
            Some(Value::String(s)) => match std::str::from_utf8(s)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
            {
                Some(n) => n,
                None => return Reply::err("ERR value is not an integer or out of range"),
            },
            Some(_) => return Reply::wrong_type(),
            None => 0,
        };

        let Some(next) = current.checked_add(1) else {
            return Reply::err("ERR increment or decrement would overflow");
        };
        self.data
            .insert(key.to_string(), Value::String(Bytes::from(next.to_string())));
        self.notify(key, "incrby");
        Reply::Integer(next)
    }

    pub(super) fn execute_flushall(&mut self) -> Reply {
        let keys: Vec<String> = self.data.keys().cloned().collect();
        self.data.clear();
        for key in keys {
            self.notify(&key, "del");
        }
        Reply::ok()
    }
}
