//! Script command implementations.
//!
//! Handles: EVAL, EVALSHA, SCRIPT LOAD, SCRIPT EXISTS, SCRIPT FLUSH
//!
//! Each script runs in a fresh sandboxed Lua state with `KEYS`, `ARGV` and a
//! `redis` table bound to this executor. Reply conversion follows the Redis
//! rules: a nil bulk becomes `false`, status replies become `{ok = ...}`,
//! error replies become `{err = ...}`, and Lua numbers are truncated to
//! integers on the way out.

use super::Executor;
#[cfg(feature = "lua")]
use crate::keyspace::command::Command;
use crate::keyspace::reply::Reply;
use ahash::AHashMap;
use bytes::Bytes;
use sha1::{Digest, Sha1};

/// Script bodies keyed by lowercase hex SHA1.
#[derive(Debug, Default)]
pub struct ScriptCache {
    scripts: AHashMap<String, String>,
}

impl ScriptCache {
    pub fn new() -> Self {
        ScriptCache {
            scripts: AHashMap::new(),
        }
    }

    pub fn sha1_hex(script: &str) -> String {
        format!("{:x}", Sha1::digest(script.as_bytes()))
    }

    /// Cache a script and return its SHA1.
    pub fn cache_script(&mut self, script: &str) -> String {
        let sha1 = Self::sha1_hex(script);
        self.scripts
            .entry(sha1.clone())
            .or_insert_with(|| script.to_string());

        // TigerStyle: Postcondition
        debug_assert!(
            self.scripts.contains_key(&sha1),
            "Postcondition violated: cached script must be retrievable"
        );
        sha1
    }

    pub fn get_script(&self, sha1: &str) -> Option<&String> {
        self.scripts.get(sha1)
    }

    pub fn has_script(&self, sha1: &str) -> bool {
        self.scripts.contains_key(sha1)
    }

    pub fn flush(&mut self) {
        self.scripts.clear();
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl Executor {
    pub(super) fn execute_eval(&mut self, script: &str, keys: &[String], args: &[Bytes]) -> Reply {
        #[cfg(feature = "lua")]
        {
            self.script_cache.cache_script(script);
            self.execute_lua_script(script, keys, args)
        }
        #[cfg(not(feature = "lua"))]
        {
            let _ = (script, keys, args);
            Reply::err("ERR Lua scripting not compiled in")
        }
    }

    pub(super) fn execute_evalsha(&mut self, sha1: &str, keys: &[String], args: &[Bytes]) -> Reply {
        #[cfg(feature = "lua")]
        {
            match self.script_cache.get_script(sha1) {
                Some(script) => {
                    let script = script.clone();
                    self.execute_lua_script(&script, keys, args)
                }
                None => Reply::err("NOSCRIPT No matching script. Please use EVAL."),
            }
        }
        #[cfg(not(feature = "lua"))]
        {
            let _ = (sha1, keys, args);
            Reply::err("ERR Lua scripting not compiled in")
        }
    }

    pub(super) fn execute_script_load(&mut self, script: &str) -> Reply {
        #[cfg(feature = "lua")]
        {
            if let Err(e) = mlua::Lua::new().load(script).into_function() {
                return Reply::err(format!("ERR Error compiling script: {}", e));
            }
        }
        let sha1 = self.script_cache.cache_script(script);
        Reply::bulk(sha1)
    }

    pub(super) fn execute_script_exists(&self, sha1s: &[String]) -> Reply {
        Reply::array(
            sha1s
                .iter()
                .map(|sha1| Reply::Integer(self.script_cache.has_script(sha1) as i64))
                .collect(),
        )
    }

    pub(super) fn execute_script_flush(&mut self) -> Reply {
        self.script_cache.flush();
        Reply::ok()
    }

    /// Execute a Lua script with KEYS and ARGV
    #[cfg(feature = "lua")]
    pub(crate) fn execute_lua_script(
        &mut self,
        script: &str,
        keys: &[String],
        args: &[Bytes],
    ) -> Reply {
        use mlua::{Lua, MultiValue, Result as LuaResult, Value as LuaValue};
        use std::cell::RefCell;

        // TigerStyle: Preconditions
        debug_assert!(!self.in_script, "Precondition: scripts must not nest");

        let lua = Lua::new();

        // Sandbox: Remove dangerous/non-deterministic functions
        if let Err(e) = (|| -> LuaResult<()> {
            lua.globals().set("os", LuaValue::Nil)?;
            lua.globals().set("io", LuaValue::Nil)?;
            lua.globals().set("loadfile", LuaValue::Nil)?;
            lua.globals().set("dofile", LuaValue::Nil)?;
            lua.globals().set("debug", LuaValue::Nil)?;
            Ok(())
        })() {
            return Reply::err(format!("ERR Lua sandbox error: {}", e));
        }

        if let Err(e) = (|| -> LuaResult<()> {
            let keys_table = lua.create_table()?;
            for (i, key) in keys.iter().enumerate() {
                keys_table.set(i + 1, key.as_str())?;
            }
            lua.globals().set("KEYS", keys_table)?;

            let argv_table = lua.create_table()?;
            for (i, arg) in args.iter().enumerate() {
                argv_table.set(i + 1, lua.create_string(arg)?)?;
            }
            lua.globals().set("ARGV", argv_table)?;
            Ok(())
        })() {
            return Reply::err(format!("ERR Failed to bind KEYS/ARGV: {}", e));
        }

        self.in_script = true;
        let executor = RefCell::new(&mut *self);

        let result = lua.scope(|scope| {
            let executor_call = &executor;
            let call_fn = scope.create_function_mut(|lua, args: MultiValue| {
                let cmd = Self::command_from_lua(args)?;
                let reply = executor_call.borrow_mut().execute(&cmd);
                // redis.call propagates errors
                if let Reply::Error(e) = &reply {
                    return Err(mlua::Error::RuntimeError(e.clone()));
                }
                Self::reply_to_lua(lua, reply)
            })?;

            let executor_pcall = &executor;
            let pcall_fn = scope.create_function_mut(|lua, args: MultiValue| {
                let reply = match Self::command_from_lua(args) {
                    Ok(cmd) => executor_pcall.borrow_mut().execute(&cmd),
                    Err(e) => Reply::err(e.to_string()),
                };
                // redis.pcall returns errors as {err = "message"} tables
                Self::reply_to_lua(lua, reply)
            })?;

            let error_reply = scope.create_function(|lua, msg: String| {
                let t = lua.create_table()?;
                t.set("err", msg)?;
                Ok(t)
            })?;
            let status_reply = scope.create_function(|lua, msg: String| {
                let t = lua.create_table()?;
                t.set("ok", msg)?;
                Ok(t)
            })?;

            let redis_table = lua.create_table()?;
            redis_table.set("call", call_fn)?;
            redis_table.set("pcall", pcall_fn)?;
            redis_table.set("error_reply", error_reply)?;
            redis_table.set("status_reply", status_reply)?;
            lua.globals().set("redis", redis_table)?;

            let value = lua.load(script).set_name("@user_script").eval::<LuaValue>()?;
            Ok(Self::lua_to_reply(value))
        });

        self.in_script = false;

        match result {
            Ok(reply) => reply,
            Err(e) => Reply::err(format!("ERR Error running script: {}", e)),
        }
    }

    #[cfg(feature = "lua")]
    fn command_from_lua(args: mlua::MultiValue) -> mlua::Result<Command> {
        use mlua::Value as LuaValue;

        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                LuaValue::String(s) => parts.push(Bytes::copy_from_slice(&s.as_bytes())),
                LuaValue::Integer(i) => parts.push(Bytes::from(i.to_string())),
                LuaValue::Number(n) => {
                    parts.push(Bytes::from(crate::keyspace::command::format_score(n)))
                }
                _ => {
                    return Err(mlua::Error::RuntimeError(
                        "ERR Lua redis lib command arguments must be strings or integers"
                            .to_string(),
                    ))
                }
            }
        }
        if parts.is_empty() {
            return Err(mlua::Error::RuntimeError(
                "ERR Please specify at least one argument for this redis lib call".to_string(),
            ));
        }

        Command::parse(&parts).map_err(mlua::Error::RuntimeError)
    }

    #[cfg(feature = "lua")]
    fn reply_to_lua(lua: &mlua::Lua, reply: Reply) -> mlua::Result<mlua::Value> {
        use mlua::Value as LuaValue;

        Ok(match reply {
            Reply::Status(s) => {
                let t = lua.create_table()?;
                t.set("ok", s)?;
                LuaValue::Table(t)
            }
            Reply::Error(e) => {
                let t = lua.create_table()?;
                t.set("err", e)?;
                LuaValue::Table(t)
            }
            Reply::Integer(i) => LuaValue::Integer(i),
            Reply::Bulk(Some(bytes)) => LuaValue::String(lua.create_string(&bytes)?),
            Reply::Bulk(None) | Reply::Array(None) => LuaValue::Boolean(false),
            Reply::Array(Some(elements)) => {
                let t = lua.create_table()?;
                for (i, elem) in elements.into_iter().enumerate() {
                    t.set(i + 1, Self::reply_to_lua(lua, elem)?)?;
                }
                LuaValue::Table(t)
            }
        })
    }

    #[cfg(feature = "lua")]
    fn lua_to_reply(value: mlua::Value) -> Reply {
        use mlua::Value as LuaValue;

        match value {
            LuaValue::Nil => Reply::nil(),
            LuaValue::Boolean(true) => Reply::Integer(1),
            LuaValue::Boolean(false) => Reply::nil(),
            LuaValue::Integer(i) => Reply::Integer(i),
            LuaValue::Number(n) => Reply::Integer(n as i64),
            LuaValue::String(s) => Reply::Bulk(Some(Bytes::copy_from_slice(&s.as_bytes()))),
            LuaValue::Table(t) => {
                if let Ok(err) = t.get::<String>("err") {
                    return Reply::Error(err);
                }
                if let Ok(ok) = t.get::<String>("ok") {
                    return Reply::Status(ok);
                }

                // Array part up to the first nil
                let mut elements = Vec::new();
                let mut i = 1;
                loop {
                    match t.get::<LuaValue>(i) {
                        Ok(LuaValue::Nil) | Err(_) => break,
                        Ok(val) => {
                            elements.push(Self::lua_to_reply(val));
                            i += 1;
                        }
                    }
                }
                Reply::array(elements)
            }
            _ => Reply::nil(),
        }
    }
}
