//! Command enum and argv conversion.
//!
//! A `Command` is built either by the typed `Store` API or by parsing the argv
//! a Lua script hands to `redis.call`. [`Command::to_args`] renders the same
//! command back to argv for the network transport, so both paths speak the
//! exact wire vocabulary of a Redis server.

use super::data::LexBound;
use bytes::Bytes;

/// Supported commands.
///
/// # Categories
///
/// - **String / key**: GET, SET, DEL, EXISTS, MGET, MSET, INCR, FLUSHALL
/// - **List**: LPUSH, RPUSH, LINDEX, LRANGE, LLEN, LREM, LINSERT, LPOS
/// - **Sorted set**: ZADD, ZREM, ZRANGE [WITHSCORES], ZRANGEBYLEX, ZRANK, ZSCORE, ZCARD
/// - **Hash**: HSET, HGET, HDEL, HEXISTS, HGETALL, HVALS
/// - **Script**: EVAL, EVALSHA, SCRIPT LOAD/EXISTS/FLUSH
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Get(String),
    Set(String, Bytes),
    Del(Vec<String>),
    Exists(Vec<String>),
    MGet(Vec<String>),
    MSet(Vec<(String, Bytes)>),
    Incr(String),
    FlushAll,
    LPush(String, Vec<Bytes>),
    RPush(String, Vec<Bytes>),
    LIndex(String, isize),
    LRange(String, isize, isize),
    LLen(String),
    LRem(String, isize, Bytes),
    LInsert {
        key: String,
        before: bool,
        pivot: Bytes,
        value: Bytes,
    },
    LPos(String, Bytes),
    ZAdd(String, Vec<(f64, Bytes)>),
    ZRem(String, Vec<Bytes>),
    ZRange {
        key: String,
        start: isize,
        stop: isize,
        with_scores: bool,
    },
    ZRangeByLex {
        key: String,
        min: LexBound,
        max: LexBound,
    },
    ZRank(String, Bytes),
    ZScore(String, Bytes),
    ZCard(String),
    HSet(String, Vec<(Bytes, Bytes)>),
    HGet(String, Bytes),
    HDel(String, Vec<Bytes>),
    HExists(String, Bytes),
    HGetAll(String),
    HVals(String),
    Eval {
        script: String,
        keys: Vec<String>,
        args: Vec<Bytes>,
    },
    EvalSha {
        sha1: String,
        keys: Vec<String>,
        args: Vec<Bytes>,
    },
    ScriptLoad(String),
    ScriptExists(Vec<String>),
    ScriptFlush,
}

fn text(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

fn int(b: &[u8], what: &str) -> Result<isize, String> {
    text(b)
        .parse()
        .map_err(|_| format!("ERR {} is not an integer or out of range", what))
}

fn score(b: &[u8]) -> Result<f64, String> {
    let s = text(b);
    let parsed = match s.as_str() {
        "+inf" | "inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        other => other
            .parse::<f64>()
            .map_err(|_| "ERR value is not a valid float".to_string())?,
    };
    if parsed.is_nan() {
        return Err("ERR value is not a valid float".to_string());
    }
    Ok(parsed)
}

/// Redis renders integral doubles without a fractional part.
pub fn format_score(score: f64) -> String {
    if score.is_infinite() {
        if score > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if score.fract() == 0.0 && score.abs() < 1e17 {
        format!("{}", score as i64)
    } else {
        format!("{}", score)
    }
}

fn arity(name: &str, ok: bool) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(format!(
            "ERR wrong number of arguments for '{}' command",
            name.to_lowercase()
        ))
    }
}

fn numkeys_split(name: &str, args: &[Bytes]) -> Result<(Vec<String>, Vec<Bytes>), String> {
    arity(name, args.len() >= 2)?;
    let n = int(&args[1], "numkeys")?;
    if n < 0 || (n as usize) > args.len() - 2 {
        return Err("ERR Number of keys can't be greater than number of args".to_string());
    }
    let n = n as usize;
    let keys = args[2..2 + n].iter().map(|k| text(k)).collect();
    let rest = args[2 + n..].to_vec();
    Ok((keys, rest))
}

impl Command {
    /// Parse argv (command name first).
    pub fn parse(parts: &[Bytes]) -> Result<Command, String> {
        let Some((head, args)) = parts.split_first() else {
            return Err("ERR empty command".to_string());
        };
        let name = text(head).to_uppercase();

        match name.as_str() {
            "PING" => Ok(Command::Ping),
            "GET" => {
                arity(&name, args.len() == 1)?;
                Ok(Command::Get(text(&args[0])))
            }
            "SET" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::Set(text(&args[0]), args[1].clone()))
            }
            "DEL" => {
                arity(&name, !args.is_empty())?;
                Ok(Command::Del(args.iter().map(|a| text(a)).collect()))
            }
            "EXISTS" => {
                arity(&name, !args.is_empty())?;
                Ok(Command::Exists(args.iter().map(|a| text(a)).collect()))
            }
            "MGET" => {
                arity(&name, !args.is_empty())?;
                Ok(Command::MGet(args.iter().map(|a| text(a)).collect()))
            }
            "MSET" => {
                arity(&name, !args.is_empty() && args.len() % 2 == 0)?;
                Ok(Command::MSet(
                    args.chunks(2)
                        .map(|pair| (text(&pair[0]), pair[1].clone()))
                        .collect(),
                ))
            }
            "INCR" => {
                arity(&name, args.len() == 1)?;
                Ok(Command::Incr(text(&args[0])))
            }
            "FLUSHALL" => Ok(Command::FlushAll),
            "LPUSH" | "RPUSH" => {
                arity(&name, args.len() >= 2)?;
                let key = text(&args[0]);
                let values = args[1..].to_vec();
                if name == "LPUSH" {
                    Ok(Command::LPush(key, values))
                } else {
                    Ok(Command::RPush(key, values))
                }
            }
            "LINDEX" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::LIndex(text(&args[0]), int(&args[1], "index")?))
            }
            "LRANGE" => {
                arity(&name, args.len() == 3)?;
                Ok(Command::LRange(
                    text(&args[0]),
                    int(&args[1], "start")?,
                    int(&args[2], "stop")?,
                ))
            }
            "LLEN" => {
                arity(&name, args.len() == 1)?;
                Ok(Command::LLen(text(&args[0])))
            }
            "LREM" => {
                arity(&name, args.len() == 3)?;
                Ok(Command::LRem(
                    text(&args[0]),
                    int(&args[1], "count")?,
                    args[2].clone(),
                ))
            }
            "LINSERT" => {
                arity(&name, args.len() == 4)?;
                let before = match text(&args[1]).to_uppercase().as_str() {
                    "BEFORE" => true,
                    "AFTER" => false,
                    _ => return Err("ERR syntax error".to_string()),
                };
                Ok(Command::LInsert {
                    key: text(&args[0]),
                    before,
                    pivot: args[2].clone(),
                    value: args[3].clone(),
                })
            }
            "LPOS" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::LPos(text(&args[0]), args[1].clone()))
            }
            "ZADD" => {
                arity(&name, args.len() >= 3 && (args.len() - 1) % 2 == 0)?;
                let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
                for pair in args[1..].chunks(2) {
                    pairs.push((score(&pair[0])?, pair[1].clone()));
                }
                Ok(Command::ZAdd(text(&args[0]), pairs))
            }
            "ZREM" => {
                arity(&name, args.len() >= 2)?;
                Ok(Command::ZRem(text(&args[0]), args[1..].to_vec()))
            }
            "ZRANGE" => {
                arity(&name, args.len() == 3 || args.len() == 4)?;
                let with_scores = match args.get(3) {
                    Some(opt) if text(opt).eq_ignore_ascii_case("WITHSCORES") => true,
                    Some(_) => return Err("ERR syntax error".to_string()),
                    None => false,
                };
                Ok(Command::ZRange {
                    key: text(&args[0]),
                    start: int(&args[1], "start")?,
                    stop: int(&args[2], "stop")?,
                    with_scores,
                })
            }
            "ZRANGEBYLEX" => {
                arity(&name, args.len() == 3)?;
                Ok(Command::ZRangeByLex {
                    key: text(&args[0]),
                    min: LexBound::parse(&args[1])?,
                    max: LexBound::parse(&args[2])?,
                })
            }
            "ZRANK" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::ZRank(text(&args[0]), args[1].clone()))
            }
            "ZSCORE" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::ZScore(text(&args[0]), args[1].clone()))
            }
            "ZCARD" => {
                arity(&name, args.len() == 1)?;
                Ok(Command::ZCard(text(&args[0])))
            }
            "HSET" => {
                arity(&name, args.len() >= 3 && (args.len() - 1) % 2 == 0)?;
                Ok(Command::HSet(
                    text(&args[0]),
                    args[1..]
                        .chunks(2)
                        .map(|pair| (pair[0].clone(), pair[1].clone()))
                        .collect(),
                ))
            }
            "HGET" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::HGet(text(&args[0]), args[1].clone()))
            }
            "HDEL" => {
                arity(&name, args.len() >= 2)?;
                Ok(Command::HDel(text(&args[0]), args[1..].to_vec()))
            }
            "HEXISTS" => {
                arity(&name, args.len() == 2)?;
                Ok(Command::HExists(text(&args[0]), args[1].clone()))
            }
            "HGETALL" => {
                arity(&name, args.len() == 1)?;
                Ok(Command::HGetAll(text(&args[0])))
            }
            "HVALS" => {
                arity(&name, args.len() == 1)?;
                Ok(Command::HVals(text(&args[0])))
            }
            "EVAL" => {
                let (keys, rest) = numkeys_split(&name, args)?;
                Ok(Command::Eval {
                    script: text(&args[0]),
                    keys,
                    args: rest,
                })
            }
            "EVALSHA" => {
                let (keys, rest) = numkeys_split(&name, args)?;
                Ok(Command::EvalSha {
                    sha1: text(&args[0]).to_lowercase(),
                    keys,
                    args: rest,
                })
            }
            "SCRIPT" => {
                arity(&name, !args.is_empty())?;
                match text(&args[0]).to_uppercase().as_str() {
                    "LOAD" => {
                        arity("script|load", args.len() == 2)?;
                        Ok(Command::ScriptLoad(text(&args[1])))
                    }
                    "EXISTS" => {
                        arity("script|exists", args.len() >= 2)?;
                        Ok(Command::ScriptExists(
                            args[1..].iter().map(|a| text(a).to_lowercase()).collect(),
                        ))
                    }
                    "FLUSH" => Ok(Command::ScriptFlush),
                    other => Err(format!("ERR unknown subcommand '{}'", other)),
                }
            }
            _ => Err(format!("ERR unknown command '{}'", name)),
        }
    }

    /// Render back to argv.
    pub fn to_args(&self) -> Vec<Bytes> {
        fn s(v: &str) -> Bytes {
            Bytes::copy_from_slice(v.as_bytes())
        }
        fn n(v: isize) -> Bytes {
            Bytes::from(v.to_string())
        }
        fn keyed(name: &'static str, keys: &[String]) -> Vec<Bytes> {
            let mut out = vec![Bytes::from_static(name.as_bytes())];
            out.extend(keys.iter().map(|k| s(k)));
            out
        }
        fn script_args(
            name: &'static str,
            head: &str,
            keys: &[String],
            args: &[Bytes],
        ) -> Vec<Bytes> {
            let mut out = vec![Bytes::from_static(name.as_bytes()), s(head), n(keys.len() as isize)];
            out.extend(keys.iter().map(|k| s(k)));
            out.extend(args.iter().cloned());
            out
        }

        match self {
            Command::Ping => vec![Bytes::from_static(b"PING")],
            Command::Get(key) => vec![Bytes::from_static(b"GET"), s(key)],
            Command::Set(key, value) => vec![Bytes::from_static(b"SET"), s(key), value.clone()],
            Command::Del(keys) => keyed("DEL", keys),
            Command::Exists(keys) => keyed("EXISTS", keys),
            Command::MGet(keys) => keyed("MGET", keys),
            Command::MSet(pairs) => {
                let mut out = vec![Bytes::from_static(b"MSET")];
                for (k, v) in pairs {
                    out.push(s(k));
                    out.push(v.clone());
                }
                out
            }
            Command::Incr(key) => vec![Bytes::from_static(b"INCR"), s(key)],
            Command::FlushAll => vec![Bytes::from_static(b"FLUSHALL")],
            Command::LPush(key, values) | Command::RPush(key, values) => {
                let name: &'static [u8] = if matches!(self, Command::LPush(..)) {
                    b"LPUSH"
                } else {
                    b"RPUSH"
                };
                let mut out = vec![Bytes::from_static(name), s(key)];
                out.extend(values.iter().cloned());
                out
            }
            Command::LIndex(key, index) => vec![Bytes::from_static(b"LINDEX"), s(key), n(*index)],
            Command::LRange(key, start, stop) => {
                vec![Bytes::from_static(b"LRANGE"), s(key), n(*start), n(*stop)]
            }
            Command::LLen(key) => vec![Bytes::from_static(b"LLEN"), s(key)],
            Command::LRem(key, count, value) => {
                vec![Bytes::from_static(b"LREM"), s(key), n(*count), value.clone()]
            }
            Command::LInsert {
                key,
                before,
                pivot,
                value,
            } => vec![
                Bytes::from_static(b"LINSERT"),
                s(key),
                Bytes::from_static(if *before { &b"BEFORE"[..] } else { &b"AFTER"[..] }),
                pivot.clone(),
                value.clone(),
            ],
            Command::LPos(key, value) => vec![Bytes::from_static(b"LPOS"), s(key), value.clone()],
            Command::ZAdd(key, pairs) => {
                let mut out = vec![Bytes::from_static(b"ZADD"), s(key)];
                for (sc, member) in pairs {
                    out.push(Bytes::from(format_score(*sc)));
                    out.push(member.clone());
                }
                out
            }
            Command::ZRem(key, members) => {
                let mut out = vec![Bytes::from_static(b"ZREM"), s(key)];
                out.extend(members.iter().cloned());
                out
            }
            Command::ZRange {
                key,
                start,
                stop,
                with_scores,
            } => {
                let mut out = vec![Bytes::from_static(b"ZRANGE"), s(key), n(*start), n(*stop)];
                if *with_scores {
                    out.push(Bytes::from_static(b"WITHSCORES"));
                }
                out
            }
            Command::ZRangeByLex { key, min, max } => vec![
                Bytes::from_static(b"ZRANGEBYLEX"),
                s(key),
                min.encode(),
                max.encode(),
            ],
            Command::ZRank(key, member) => vec![Bytes::from_static(b"ZRANK"), s(key), member.clone()],
            Command::ZScore(key, member) => {
                vec![Bytes::from_static(b"ZSCORE"), s(key), member.clone()]
            }
            Command::ZCard(key) => vec![Bytes::from_static(b"ZCARD"), s(key)],
            Command::HSet(key, pairs) => {
                let mut out = vec![Bytes::from_static(b"HSET"), s(key)];
                for (f, v) in pairs {
                    out.push(f.clone());
                    out.push(v.clone());
                }
                out
            }
            Command::HGet(key, field) => vec![Bytes::from_static(b"HGET"), s(key), field.clone()],
            Command::HDel(key, fields) => {
                let mut out = vec![Bytes::from_static(b"HDEL"), s(key)];
                out.extend(fields.iter().cloned());
                out
            }
            Command::HExists(key, field) => {
                vec![Bytes::from_static(b"HEXISTS"), s(key), field.clone()]
            }
            Command::HGetAll(key) => vec![Bytes::from_static(b"HGETALL"), s(key)],
            Command::HVals(key) => vec![Bytes::from_static(b"HVALS"), s(key)],
            Command::Eval { script, keys, args } => script_args("EVAL", script, keys, args),
            Command::EvalSha { sha1, keys, args } => script_args("EVALSHA", sha1, keys, args),
            Command::ScriptLoad(script) => vec![
                Bytes::from_static(b"SCRIPT"),
                Bytes::from_static(b"LOAD"),
                s(script),
            ],
            Command::ScriptExists(shas) => {
                let mut out = vec![Bytes::from_static(b"SCRIPT"), Bytes::from_static(b"EXISTS")];
                out.extend(shas.iter().map(|sha| s(sha)));
                out
            }
            Command::ScriptFlush => vec![Bytes::from_static(b"SCRIPT"), Bytes::from_static(b"FLUSH")],
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Command::Eval { .. }
                | Command::EvalSha { .. }
                | Command::ScriptLoad(_)
                | Command::ScriptExists(_)
                | Command::ScriptFlush
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let cmd = Command::parse(&argv(&["zadd", "q", "1.5", "a", "-2", "b"])).unwrap();
        assert_eq!(
            cmd,
            Command::ZAdd(
                "q".to_string(),
                vec![
                    (1.5, Bytes::from_static(b"a")),
                    (-2.0, Bytes::from_static(b"b"))
                ]
            )
        );
    }

    #[test]
    fn test_parse_rejects_bad_arity() {
        assert!(Command::parse(&argv(&["GET"])).is_err());
        assert!(Command::parse(&argv(&["HSET", "h", "f"])).is_err());
        assert!(Command::parse(&argv(&["ZRANGE", "z", "0", "1", "BOGUS"])).is_err());
        assert!(Command::parse(&argv(&["NOPE"])).is_err());
        assert!(Command::parse(&[]).is_err());
    }

    #[test]
    fn test_parse_eval_splits_keys_and_args() {
        let cmd = Command::parse(&argv(&["EVAL", "return 1", "2", "k1", "k2", "a1"])).unwrap();
        match cmd {
            Command::Eval { script, keys, args } => {
                assert_eq!(script, "return 1");
                assert_eq!(keys, vec!["k1", "k2"]);
                assert_eq!(args, vec![Bytes::from_static(b"a1")]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Command::parse(&argv(&["EVAL", "return 1", "3", "k1"])).is_err());
    }

    #[test]
    fn test_to_args_reparses_to_same_command() {
        let commands = vec![
            Command::LInsert {
                key: "l".to_string(),
                before: false,
                pivot: Bytes::from_static(b"a"),
                value: Bytes::from_static(b"b"),
            },
            Command::ZRange {
                key: "z".to_string(),
                start: 0,
                stop: -1,
                with_scores: true,
            },
            Command::ZRangeByLex {
                key: "z".to_string(),
                min: LexBound::Inclusive(Bytes::from_static(b"ab")),
                max: LexBound::PosInf,
            },
            Command::EvalSha {
                sha1: "abc".to_string(),
                keys: vec!["k".to_string()],
                args: vec![Bytes::from_static(b"v")],
            },
        ];
        for cmd in commands {
            assert_eq!(Command::parse(&cmd.to_args()).unwrap(), cmd);
        }
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(1700000000000.0), "1700000000000");
        assert_eq!(format_score(-3.0), "-3");
        assert_eq!(format_score(1.5), "1.5");
        assert_eq!(format_score(f64::INFINITY), "inf");
    }
}
