//! Server-side Lua scripts.

use crate::keyspace::ScriptCache;

/// Script source plus its SHA1, computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    source: String,
    sha1: String,
}

impl Script {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let sha1 = ScriptCache::sha1_hex(&source);
        Script { source, sha1 }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sha1(&self) -> &str {
        &self.sha1
    }
}
