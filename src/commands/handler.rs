//! Command Handler
//!
//! Turns a command name plus byte-string arguments into a call on the
//! [`Keyspace`] and wraps the outcome in a [`Reply`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                           Keyspace          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `cmd_*` validates arity and parses its arguments before touching
//! the keyspace, so a malformed command never mutates anything. Errors from
//! the keyspace become [`Reply::Error`] with the store's error message.
//!
//! ## Supported Commands
//!
//! ### Key Commands
//! - `DEL` / `UNLINK key [key ...]`, `EXISTS key [key ...]`, `TYPE key`
//! - `RENAME key newkey`, `RENAMENX key newkey`
//! - `EXPIRE` / `PEXPIRE key ttl`, `EXPIREAT` / `PEXPIREAT key timestamp`
//! - `TTL` / `PTTL key`, `PERSIST key`, `KEYS pattern`
//!
//! ### String Commands
//! - `SET key value [EX s | PX ms] [NX | XX] [KEEPTTL] [GET]`
//! - `SETEX`, `PSETEX`, `SETNX`, `GET`, `GETSET`, `GETDEL`, `MSET`, `MGET`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`, `INCRBYFLOAT`, `APPEND`, `STRLEN`
//!
//! ### Hash Commands
//! - `HSET` / `HMSET key field value [field value ...]`, `HSETNX`
//! - `HGET`, `HMGET`, `HGETALL`, `HKEYS`, `HVALS`, `HEXISTS`, `HLEN`, `HDEL`
//! - `HINCRBY`, `HINCRBYFLOAT`
//!
//! ### List Commands
//! - `LPUSH` / `RPUSH key value [value ...]`, `LPOP` / `RPOP key [count]`
//! - `LLEN`, `LRANGE`, `LINDEX`, `LINSERT key BEFORE|AFTER pivot value`
//! - `LREM`, `LSET`, `LTRIM`, `RPOPLPUSH`
//! - `BLPOP` / `BRPOP key [key ...] timeout` (seconds, `0` blocks forever)
//!
//! ### Set Commands
//! - `SADD`, `SREM`, `SMEMBERS`, `SISMEMBER`, `SCARD`, `SMOVE`
//! - `SPOP key [count]`, `SRANDMEMBER key [count]`
//! - `SUNION`, `SINTER`, `SDIFF` and their `*STORE` variants
//!
//! ### Sorted Set Commands
//! - `ZADD key [NX | XX] [CH] score member [score member ...]`
//! - `ZINCRBY`, `ZSCORE`, `ZCARD`, `ZRANK`, `ZREVRANK`, `ZREM`, `ZCOUNT`
//! - `ZRANGE` / `ZREVRANGE key start stop [WITHSCORES]`
//! - `ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]`
//! - `ZREVRANGEBYSCORE key max min [WITHSCORES] [LIMIT offset count]`
//! - `ZREMRANGEBYRANK`, `ZREMRANGEBYSCORE`
//!
//! ### Connection
//! - `PING [message]`

use crate::commands::reply::Reply;
use crate::error::{Result, StoreError};
use crate::storage::keyspace::{format_float, parse_int, MAX_TTL};
use crate::storage::{Keyspace, ScoreRange, SetCondition, SetOptions, Ttl, ZaddOptions};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::trace;

/// Dispatches commands to the keyspace.
///
/// Cheap to clone; clones share the same keyspace.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    keyspace: Arc<Keyspace>,
}

// ============================================================================
// Argument helpers
// ============================================================================

fn wrong_arity(name: &str) -> StoreError {
    StoreError::WrongArity(name.to_ascii_lowercase())
}

/// Fails unless `min <= args.len() <= max`.
fn arity(name: &str, args: &[Bytes], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn int_arg(arg: &[u8]) -> Result<i64> {
    parse_int(arg)
}

fn float_arg(arg: &[u8]) -> Result<f64> {
    crate::storage::sorted_set::parse_score(arg)
}

fn count_arg(arg: &[u8]) -> Result<usize> {
    usize::try_from(int_arg(arg)?).map_err(|_| StoreError::NotPositive)
}

fn keyword(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

/// Duration from a count of units, floored at zero.
fn duration_arg(arg: &[u8], unit: fn(u64) -> Duration) -> Result<Duration> {
    let n = int_arg(arg)?;
    Ok(unit(u64::try_from(n).unwrap_or(0)))
}

/// A strictly positive TTL for `SET EX` / `SETEX`.
fn positive_ttl(arg: &[u8], unit: fn(u64) -> Duration) -> Result<Duration> {
    let n = int_arg(arg)?;
    match u64::try_from(n) {
        Ok(n) if n > 0 => Ok(unit(n)),
        _ => Err(StoreError::Syntax),
    }
}

fn pairs(args: &[Bytes]) -> Vec<(Bytes, Bytes)> {
    args.chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

fn scored(items: Vec<(Bytes, f64)>, with_scores: bool) -> Reply {
    let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        out.push(Reply::Bulk(member));
        if with_scores {
            out.push(Reply::Bulk(format_float(score)));
        }
    }
    Reply::Array(out)
}

fn score_reply(score: Option<f64>) -> Reply {
    score.map_or(Reply::Nil, |s| Reply::Bulk(format_float(s)))
}

fn rank_reply(rank: Option<usize>) -> Reply {
    rank.map_or(Reply::Nil, Reply::from_len)
}

impl CommandHandler {
    /// Creates a new command handler over the given keyspace.
    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        Self { keyspace }
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    /// Executes a command. `args[0]` is the case-insensitive command name.
    ///
    /// Only `BLPOP` / `BRPOP` ever wait; everything else completes on the
    /// first poll.
    pub async fn execute(&self, args: &[Bytes]) -> Reply {
        let Some((name, rest)) = args.split_first() else {
            return Reply::error("ERR empty command");
        };
        let name = keyword(name);
        trace!(command = %name, args = rest.len(), "dispatching command");

        let result = match name.as_str() {
            "BLPOP" => self.cmd_blocking_pop(&name, rest, true).await,
            "BRPOP" => self.cmd_blocking_pop(&name, rest, false).await,
            _ => self.dispatch(&name, rest),
        };

        result.unwrap_or_else(Reply::from)
    }

    /// Dispatches a non-blocking command to its handler.
    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> Result<Reply> {
        match cmd {
            // Key commands
            "DEL" | "UNLINK" => self.cmd_del(cmd, args),
            "EXISTS" => self.cmd_exists(args),
            "TYPE" => self.cmd_type(args),
            "RENAME" => self.cmd_rename(cmd, args, true),
            "RENAMENX" => self.cmd_rename(cmd, args, false),
            "EXPIRE" => self.cmd_expire(cmd, args, Duration::from_secs),
            "PEXPIRE" => self.cmd_expire(cmd, args, Duration::from_millis),
            "EXPIREAT" => self.cmd_expireat(cmd, args, Duration::from_secs),
            "PEXPIREAT" => self.cmd_expireat(cmd, args, Duration::from_millis),
            "PERSIST" => self.cmd_persist(args),
            "TTL" => self.cmd_ttl(cmd, args, Ttl::as_secs),
            "PTTL" => self.cmd_ttl(cmd, args, Ttl::as_millis),
            "KEYS" => self.cmd_keys(args),

            // String commands
            "SET" => self.cmd_set(args),
            "SETEX" => self.cmd_setex(cmd, args, Duration::from_secs),
            "PSETEX" => self.cmd_setex(cmd, args, Duration::from_millis),
            "SETNX" => self.cmd_setnx(args),
            "GET" => self.cmd_get(args),
            "GETSET" => self.cmd_getset(args),
            "GETDEL" => self.cmd_getdel(args),
            "MSET" => self.cmd_mset(args),
            "MGET" => self.cmd_mget(args),
            "INCR" => self.cmd_incr(cmd, args, 1),
            "DECR" => self.cmd_incr(cmd, args, -1),
            "INCRBY" => self.cmd_incrby(cmd, args, false),
            "DECRBY" => self.cmd_incrby(cmd, args, true),
            "INCRBYFLOAT" => self.cmd_incrbyfloat(args),
            "APPEND" => self.cmd_append(args),
            "STRLEN" => self.cmd_strlen(args),

            // Hash commands
            "HSET" => self.cmd_hset(cmd, args, false),
            "HMSET" => self.cmd_hset(cmd, args, true),
            "HSETNX" => self.cmd_hsetnx(args),
            "HGET" => self.cmd_hget(args),
            "HMGET" => self.cmd_hmget(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HKEYS" => self.cmd_hkeys(args),
            "HVALS" => self.cmd_hvals(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HLEN" => self.cmd_hlen(args),
            "HDEL" => self.cmd_hdel(args),
            "HINCRBY" => self.cmd_hincrby(args),
            "HINCRBYFLOAT" => self.cmd_hincrbyfloat(args),

            // List commands
            "LPUSH" => self.cmd_push(cmd, args, true),
            "RPUSH" => self.cmd_push(cmd, args, false),
            "LPOP" => self.cmd_pop(cmd, args, true),
            "RPOP" => self.cmd_pop(cmd, args, false),
            "LLEN" => self.cmd_llen(args),
            "LRANGE" => self.cmd_lrange(args),
            "LINDEX" => self.cmd_lindex(args),
            "LINSERT" => self.cmd_linsert(args),
            "LREM" => self.cmd_lrem(args),
            "LSET" => self.cmd_lset(args),
            "LTRIM" => self.cmd_ltrim(args),
            "RPOPLPUSH" => self.cmd_rpoplpush(args),

            // Set commands
            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SISMEMBER" => self.cmd_sismember(args),
            "SCARD" => self.cmd_scard(args),
            "SPOP" => self.cmd_spop(args),
            "SRANDMEMBER" => self.cmd_srandmember(args),
            "SUNION" | "SINTER" | "SDIFF" => self.cmd_set_algebra(cmd, args),
            "SUNIONSTORE" | "SINTERSTORE" | "SDIFFSTORE" => self.cmd_set_algebra_store(cmd, args),
            "SMOVE" => self.cmd_smove(args),

            // Sorted set commands
            "ZADD" => self.cmd_zadd(args),
            "ZINCRBY" => self.cmd_zincrby(args),
            "ZSCORE" => self.cmd_zscore(args),
            "ZCARD" => self.cmd_zcard(args),
            "ZRANK" => self.cmd_zrank(cmd, args, false),
            "ZREVRANK" => self.cmd_zrank(cmd, args, true),
            "ZRANGE" => self.cmd_zrange(cmd, args, false),
            "ZREVRANGE" => self.cmd_zrange(cmd, args, true),
            "ZRANGEBYSCORE" => self.cmd_zrangebyscore(cmd, args, false),
            "ZREVRANGEBYSCORE" => self.cmd_zrangebyscore(cmd, args, true),
            "ZCOUNT" => self.cmd_zcount(args),
            "ZREM" => self.cmd_zrem(args),
            "ZREMRANGEBYRANK" => self.cmd_zremrangebyrank(args),
            "ZREMRANGEBYSCORE" => self.cmd_zremrangebyscore(args),

            // Connection
            "PING" => self.cmd_ping(args),

            _ => Err(StoreError::UnknownCommand(cmd.to_ascii_lowercase())),
        }
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// DEL key [key ...]
    fn cmd_del(&self, cmd: &str, args: &[Bytes]) -> Result<Reply> {
        arity(cmd, args, 1, usize::MAX)?;
        Ok(Reply::from_len(self.keyspace.delete(args)))
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> Result<Reply> {
        arity("exists", args, 1, usize::MAX)?;
        Ok(Reply::from_len(self.keyspace.exists(args)))
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Bytes]) -> Result<Reply> {
        arity("type", args, 1, 1)?;
        let name = self
            .keyspace
            .key_type(&args[0])
            .map_or("none", |kind| kind.as_str());
        Ok(Reply::bulk(name))
    }

    /// RENAME key newkey / RENAMENX key newkey
    fn cmd_rename(&self, cmd: &str, args: &[Bytes], overwrite: bool) -> Result<Reply> {
        arity(cmd, args, 2, 2)?;
        let renamed = self
            .keyspace
            .rename(&args[0], args[1].clone(), overwrite)?;
        Ok(if overwrite {
            Reply::ok()
        } else {
            Reply::boolean(renamed)
        })
    }

    /// EXPIRE key seconds / PEXPIRE key milliseconds
    fn cmd_expire(&self, cmd: &str, args: &[Bytes], unit: fn(u64) -> Duration) -> Result<Reply> {
        arity(cmd, args, 2, 2)?;
        let ttl = duration_arg(&args[1], unit)?;
        Ok(Reply::boolean(self.keyspace.expire(&args[0], ttl)))
    }

    /// EXPIREAT key unix-seconds / PEXPIREAT key unix-milliseconds
    fn cmd_expireat(&self, cmd: &str, args: &[Bytes], unit: fn(u64) -> Duration) -> Result<Reply> {
        arity(cmd, args, 2, 2)?;
        let since_epoch = duration_arg(&args[1], unit)?;
        let at = UNIX_EPOCH
            .checked_add(since_epoch)
            .ok_or(StoreError::NotAnInteger)?;
        Ok(Reply::boolean(self.keyspace.expire_at(&args[0], at)))
    }

    /// PERSIST key
    fn cmd_persist(&self, args: &[Bytes]) -> Result<Reply> {
        arity("persist", args, 1, 1)?;
        Ok(Reply::boolean(self.keyspace.persist(&args[0])))
    }

    /// TTL key / PTTL key
    fn cmd_ttl(&self, cmd: &str, args: &[Bytes], unit: fn(&Ttl) -> i64) -> Result<Reply> {
        arity(cmd, args, 1, 1)?;
        Ok(Reply::integer(unit(&self.keyspace.ttl(&args[0]))))
    }

    /// KEYS pattern
    fn cmd_keys(&self, args: &[Bytes]) -> Result<Reply> {
        arity("keys", args, 1, 1)?;
        let mut keys = self.keyspace.keys(&args[0]);
        keys.sort_unstable();
        Ok(Reply::from_bulks(keys))
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// SET key value [EX seconds | PX milliseconds] [NX | XX] [KEEPTTL] [GET]
    fn cmd_set(&self, args: &[Bytes]) -> Result<Reply> {
        arity("set", args, 2, usize::MAX)?;

        let mut options = SetOptions::default();
        let mut i = 2;
        while i < args.len() {
            match keyword(&args[i]).as_str() {
                unit @ ("EX" | "PX") => {
                    i += 1;
                    let arg = args.get(i).ok_or(StoreError::Syntax)?;
                    if options.ttl.is_some() || options.keep_ttl {
                        return Err(StoreError::Syntax);
                    }
                    let unit: fn(u64) -> Duration = if unit == "EX" {
                        Duration::from_secs
                    } else {
                        Duration::from_millis
                    };
                    options.ttl = Some(positive_ttl(arg, unit)?);
                }
                "NX" | "XX" if options.condition.is_some() => return Err(StoreError::Syntax),
                "NX" => options.condition = Some(SetCondition::IfAbsent),
                "XX" => options.condition = Some(SetCondition::IfPresent),
                "KEEPTTL" if options.ttl.is_some() => return Err(StoreError::Syntax),
                "KEEPTTL" => options.keep_ttl = true,
                "GET" => options.get = true,
                _ => return Err(StoreError::Syntax),
            }
            i += 1;
        }

        let get = options.get;
        let outcome = self
            .keyspace
            .set_with(args[0].clone(), args[1].clone(), options)?;

        Ok(match (get, outcome.written) {
            (true, _) => Reply::from_option(outcome.previous),
            (false, true) => Reply::ok(),
            (false, false) => Reply::nil(),
        })
    }

    /// SETEX key seconds value / PSETEX key milliseconds value
    fn cmd_setex(&self, cmd: &str, args: &[Bytes], unit: fn(u64) -> Duration) -> Result<Reply> {
        arity(cmd, args, 3, 3)?;
        let ttl = positive_ttl(&args[1], unit)?;
        self.keyspace
            .set(args[0].clone(), args[2].clone(), Some(ttl));
        Ok(Reply::ok())
    }

    /// SETNX key value
    fn cmd_setnx(&self, args: &[Bytes]) -> Result<Reply> {
        arity("setnx", args, 2, 2)?;
        Ok(Reply::boolean(
            self.keyspace.setnx(args[0].clone(), args[1].clone()),
        ))
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Result<Reply> {
        arity("get", args, 1, 1)?;
        Ok(Reply::from_option(self.keyspace.get(&args[0])?))
    }

    /// GETSET key value
    fn cmd_getset(&self, args: &[Bytes]) -> Result<Reply> {
        arity("getset", args, 2, 2)?;
        let previous = self.keyspace.getset(args[0].clone(), args[1].clone())?;
        Ok(Reply::from_option(previous))
    }

    /// GETDEL key
    fn cmd_getdel(&self, args: &[Bytes]) -> Result<Reply> {
        arity("getdel", args, 1, 1)?;
        Ok(Reply::from_option(self.keyspace.getdel(&args[0])?))
    }

    /// MSET key value [key value ...]
    fn cmd_mset(&self, args: &[Bytes]) -> Result<Reply> {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(wrong_arity("mset"));
        }
        self.keyspace.mset(pairs(args));
        Ok(Reply::ok())
    }

    /// MGET key [key ...]
    fn cmd_mget(&self, args: &[Bytes]) -> Result<Reply> {
        arity("mget", args, 1, usize::MAX)?;
        let values = self.keyspace.mget(args);
        Ok(Reply::array(
            values.into_iter().map(Reply::from_option).collect(),
        ))
    }

    /// INCR key / DECR key
    fn cmd_incr(&self, cmd: &str, args: &[Bytes], delta: i64) -> Result<Reply> {
        arity(cmd, args, 1, 1)?;
        Ok(Reply::integer(self.keyspace.incr_by(args[0].clone(), delta)?))
    }

    /// INCRBY key increment / DECRBY key decrement
    fn cmd_incrby(&self, cmd: &str, args: &[Bytes], negate: bool) -> Result<Reply> {
        arity(cmd, args, 2, 2)?;
        let delta = int_arg(&args[1])?;
        let value = if negate {
            self.keyspace.decr_by(args[0].clone(), delta)?
        } else {
            self.keyspace.incr_by(args[0].clone(), delta)?
        };
        Ok(Reply::integer(value))
    }

    /// INCRBYFLOAT key increment
    fn cmd_incrbyfloat(&self, args: &[Bytes]) -> Result<Reply> {
        arity("incrbyfloat", args, 2, 2)?;
        let delta = float_arg(&args[1])?;
        let value = self.keyspace.incr_by_float(args[0].clone(), delta)?;
        Ok(Reply::Bulk(format_float(value)))
    }

    /// APPEND key value
    fn cmd_append(&self, args: &[Bytes]) -> Result<Reply> {
        arity("append", args, 2, 2)?;
        Ok(Reply::from_len(
            self.keyspace.append(args[0].clone(), &args[1])?,
        ))
    }

    /// STRLEN key
    fn cmd_strlen(&self, args: &[Bytes]) -> Result<Reply> {
        arity("strlen", args, 1, 1)?;
        Ok(Reply::from_len(self.keyspace.strlen(&args[0])?))
    }

    // ========================================================================
    // Hash Commands
    // ========================================================================

    /// HSET key field value [field value ...] (HMSET replies OK)
    fn cmd_hset(&self, cmd: &str, args: &[Bytes], legacy: bool) -> Result<Reply> {
        if args.len() < 3 || args.len() % 2 != 1 {
            return Err(wrong_arity(cmd));
        }
        let added = self.keyspace.hset(args[0].clone(), pairs(&args[1..]))?;
        Ok(if legacy {
            Reply::ok()
        } else {
            Reply::from_len(added)
        })
    }

    /// HSETNX key field value
    fn cmd_hsetnx(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hsetnx", args, 3, 3)?;
        let set = self
            .keyspace
            .hsetnx(args[0].clone(), args[1].clone(), args[2].clone())?;
        Ok(Reply::boolean(set))
    }

    /// HGET key field
    fn cmd_hget(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hget", args, 2, 2)?;
        Ok(Reply::from_option(self.keyspace.hget(&args[0], &args[1])?))
    }

    /// HMGET key field [field ...]
    fn cmd_hmget(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hmget", args, 2, usize::MAX)?;
        let values = self.keyspace.hmget(&args[0], &args[1..])?;
        Ok(Reply::array(
            values.into_iter().map(Reply::from_option).collect(),
        ))
    }

    /// HGETALL key
    fn cmd_hgetall(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hgetall", args, 1, 1)?;
        let flat = self
            .keyspace
            .hgetall(&args[0])?
            .into_iter()
            .flat_map(|(field, value)| [field, value]);
        Ok(Reply::from_bulks(flat))
    }

    /// HKEYS key
    fn cmd_hkeys(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hkeys", args, 1, 1)?;
        Ok(Reply::from_bulks(self.keyspace.hkeys(&args[0])?))
    }

    /// HVALS key
    fn cmd_hvals(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hvals", args, 1, 1)?;
        Ok(Reply::from_bulks(self.keyspace.hvals(&args[0])?))
    }

    /// HEXISTS key field
    fn cmd_hexists(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hexists", args, 2, 2)?;
        Ok(Reply::boolean(self.keyspace.hexists(&args[0], &args[1])?))
    }

    /// HLEN key
    fn cmd_hlen(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hlen", args, 1, 1)?;
        Ok(Reply::from_len(self.keyspace.hlen(&args[0])?))
    }

    /// HDEL key field [field ...]
    fn cmd_hdel(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hdel", args, 2, usize::MAX)?;
        Ok(Reply::from_len(self.keyspace.hdel(&args[0], &args[1..])?))
    }

    /// HINCRBY key field increment
    fn cmd_hincrby(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hincrby", args, 3, 3)?;
        let delta = int_arg(&args[2])?;
        let value = self
            .keyspace
            .hincrby(args[0].clone(), args[1].clone(), delta)?;
        Ok(Reply::integer(value))
    }

    /// HINCRBYFLOAT key field increment
    fn cmd_hincrbyfloat(&self, args: &[Bytes]) -> Result<Reply> {
        arity("hincrbyfloat", args, 3, 3)?;
        let delta = float_arg(&args[2])?;
        let value = self
            .keyspace
            .hincrbyfloat(args[0].clone(), args[1].clone(), delta)?;
        Ok(Reply::Bulk(format_float(value)))
    }

    // ========================================================================
    // List Commands
    // ========================================================================

    /// LPUSH / RPUSH key value [value ...]
    fn cmd_push(&self, cmd: &str, args: &[Bytes], head: bool) -> Result<Reply> {
        arity(cmd, args, 2, usize::MAX)?;
        let values = args[1..].to_vec();
        let len = if head {
            self.keyspace.lpush(args[0].clone(), values)?
        } else {
            self.keyspace.rpush(args[0].clone(), values)?
        };
        Ok(Reply::from_len(len))
    }

    /// LPOP / RPOP key [count]
    fn cmd_pop(&self, cmd: &str, args: &[Bytes], head: bool) -> Result<Reply> {
        arity(cmd, args, 1, 2)?;
        match args.get(1) {
            None => {
                let item = if head {
                    self.keyspace.lpop(&args[0])?
                } else {
                    self.keyspace.rpop(&args[0])?
                };
                Ok(Reply::from_option(item))
            }
            Some(count) => {
                let count = count_arg(count)?;
                let items = if head {
                    self.keyspace.lpop_count(&args[0], count)?
                } else {
                    self.keyspace.rpop_count(&args[0], count)?
                };
                Ok(items.map_or(Reply::Nil, Reply::from_bulks))
            }
        }
    }

    /// LLEN key
    fn cmd_llen(&self, args: &[Bytes]) -> Result<Reply> {
        arity("llen", args, 1, 1)?;
        Ok(Reply::from_len(self.keyspace.llen(&args[0])?))
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Bytes]) -> Result<Reply> {
        arity("lrange", args, 3, 3)?;
        let start = int_arg(&args[1])?;
        let stop = int_arg(&args[2])?;
        Ok(Reply::from_bulks(self.keyspace.lrange(&args[0], start, stop)?))
    }

    /// LINDEX key index
    fn cmd_lindex(&self, args: &[Bytes]) -> Result<Reply> {
        arity("lindex", args, 2, 2)?;
        let index = int_arg(&args[1])?;
        Ok(Reply::from_option(self.keyspace.lindex(&args[0], index)?))
    }

    /// LINSERT key BEFORE|AFTER pivot value
    fn cmd_linsert(&self, args: &[Bytes]) -> Result<Reply> {
        arity("linsert", args, 4, 4)?;
        let before = match keyword(&args[1]).as_str() {
            "BEFORE" => true,
            "AFTER" => false,
            _ => return Err(StoreError::Syntax),
        };
        let len = self
            .keyspace
            .linsert(&args[0], before, &args[2], args[3].clone())?;
        Ok(Reply::integer(len))
    }

    /// LREM key count value
    fn cmd_lrem(&self, args: &[Bytes]) -> Result<Reply> {
        arity("lrem", args, 3, 3)?;
        let count = int_arg(&args[1])?;
        Ok(Reply::from_len(self.keyspace.lrem(&args[0], count, &args[2])?))
    }

    /// LSET key index value
    fn cmd_lset(&self, args: &[Bytes]) -> Result<Reply> {
        arity("lset", args, 3, 3)?;
        let index = int_arg(&args[1])?;
        self.keyspace.lset(&args[0], index, args[2].clone())?;
        Ok(Reply::ok())
    }

    /// LTRIM key start stop
    fn cmd_ltrim(&self, args: &[Bytes]) -> Result<Reply> {
        arity("ltrim", args, 3, 3)?;
        let start = int_arg(&args[1])?;
        let stop = int_arg(&args[2])?;
        self.keyspace.ltrim(&args[0], start, stop)?;
        Ok(Reply::ok())
    }

    /// RPOPLPUSH source destination
    fn cmd_rpoplpush(&self, args: &[Bytes]) -> Result<Reply> {
        arity("rpoplpush", args, 2, 2)?;
        let moved = self.keyspace.rpoplpush(&args[0], args[1].clone())?;
        Ok(Reply::from_option(moved))
    }

    /// BLPOP / BRPOP key [key ...] timeout
    async fn cmd_blocking_pop(&self, cmd: &str, args: &[Bytes], head: bool) -> Result<Reply> {
        arity(cmd, args, 2, usize::MAX)?;
        let (timeout, keys) = args.split_last().ok_or_else(|| wrong_arity(cmd))?;

        let secs = float_arg(timeout)?;
        let timeout = match Duration::try_from_secs_f64(secs) {
            Ok(d) if d.is_zero() => None,
            Ok(d) if d > MAX_TTL => return Err(StoreError::TimeoutOutOfRange),
            Ok(d) => Some(d),
            Err(_) if secs.is_finite() && secs > 0.0 => {
                return Err(StoreError::TimeoutOutOfRange)
            }
            Err(_) => return Err(StoreError::Syntax),
        };

        let hit = if head {
            self.keyspace.blpop(keys, timeout).await?
        } else {
            self.keyspace.brpop(keys, timeout).await?
        };
        Ok(match hit {
            Some((key, item)) => Reply::from_bulks([key, item]),
            None => Reply::nil(),
        })
    }

    // ========================================================================
    // Set Commands
    // ========================================================================

    /// SADD key member [member ...]
    fn cmd_sadd(&self, args: &[Bytes]) -> Result<Reply> {
        arity("sadd", args, 2, usize::MAX)?;
        let added = self.keyspace.sadd(args[0].clone(), args[1..].to_vec())?;
        Ok(Reply::from_len(added))
    }

    /// SREM key member [member ...]
    fn cmd_srem(&self, args: &[Bytes]) -> Result<Reply> {
        arity("srem", args, 2, usize::MAX)?;
        Ok(Reply::from_len(self.keyspace.srem(&args[0], &args[1..])?))
    }

    /// SMEMBERS key
    fn cmd_smembers(&self, args: &[Bytes]) -> Result<Reply> {
        arity("smembers", args, 1, 1)?;
        Ok(Reply::from_bulks(self.keyspace.smembers(&args[0])?))
    }

    /// SISMEMBER key member
    fn cmd_sismember(&self, args: &[Bytes]) -> Result<Reply> {
        arity("sismember", args, 2, 2)?;
        Ok(Reply::boolean(self.keyspace.sismember(&args[0], &args[1])?))
    }

    /// SCARD key
    fn cmd_scard(&self, args: &[Bytes]) -> Result<Reply> {
        arity("scard", args, 1, 1)?;
        Ok(Reply::from_len(self.keyspace.scard(&args[0])?))
    }

    /// SPOP key [count]
    fn cmd_spop(&self, args: &[Bytes]) -> Result<Reply> {
        arity("spop", args, 1, 2)?;
        match args.get(1) {
            None => Ok(Reply::from_option(self.keyspace.spop(&args[0])?)),
            Some(count) => {
                let count = count_arg(count)?;
                Ok(Reply::from_bulks(self.keyspace.spop_count(&args[0], count)?))
            }
        }
    }

    /// SRANDMEMBER key [count]
    fn cmd_srandmember(&self, args: &[Bytes]) -> Result<Reply> {
        arity("srandmember", args, 1, 2)?;
        match args.get(1) {
            None => Ok(Reply::from_option(self.keyspace.srandmember(&args[0])?)),
            Some(count) => {
                let count = int_arg(count)?;
                Ok(Reply::from_bulks(
                    self.keyspace.srandmember_count(&args[0], count)?,
                ))
            }
        }
    }

    /// SUNION / SINTER / SDIFF key [key ...]
    fn cmd_set_algebra(&self, cmd: &str, args: &[Bytes]) -> Result<Reply> {
        arity(cmd, args, 1, usize::MAX)?;
        let members = match cmd {
            "SUNION" => self.keyspace.sunion(args)?,
            "SINTER" => self.keyspace.sinter(args)?,
            _ => self.keyspace.sdiff(args)?,
        };
        Ok(Reply::from_bulks(members))
    }

    /// SUNIONSTORE / SINTERSTORE / SDIFFSTORE destination key [key ...]
    fn cmd_set_algebra_store(&self, cmd: &str, args: &[Bytes]) -> Result<Reply> {
        arity(cmd, args, 2, usize::MAX)?;
        let dst = args[0].clone();
        let keys = &args[1..];
        let len = match cmd {
            "SUNIONSTORE" => self.keyspace.sunionstore(dst, keys)?,
            "SINTERSTORE" => self.keyspace.sinterstore(dst, keys)?,
            _ => self.keyspace.sdiffstore(dst, keys)?,
        };
        Ok(Reply::from_len(len))
    }

    /// SMOVE source destination member
    fn cmd_smove(&self, args: &[Bytes]) -> Result<Reply> {
        arity("smove", args, 3, 3)?;
        let moved = self
            .keyspace
            .smove(&args[0], args[1].clone(), &args[2])?;
        Ok(Reply::boolean(moved))
    }

    // ========================================================================
    // Sorted Set Commands
    // ========================================================================

    /// ZADD key [NX | XX] [CH] score member [score member ...]
    fn cmd_zadd(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zadd", args, 3, usize::MAX)?;

        let mut options = ZaddOptions::default();
        let mut i = 1;
        while i < args.len() {
            match keyword(&args[i]).as_str() {
                "NX" | "XX" if options.condition.is_some() => return Err(StoreError::Syntax),
                "NX" => options.condition = Some(SetCondition::IfAbsent),
                "XX" => options.condition = Some(SetCondition::IfPresent),
                "CH" => options.changed = true,
                _ => break,
            }
            i += 1;
        }

        let rest = &args[i..];
        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(StoreError::Syntax);
        }
        let members = rest
            .chunks_exact(2)
            .map(|pair| Ok((float_arg(&pair[0])?, pair[1].clone())))
            .collect::<Result<Vec<_>>>()?;

        let count = self
            .keyspace
            .zadd_with(args[0].clone(), options, members)?;
        Ok(Reply::from_len(count))
    }

    /// ZINCRBY key increment member
    fn cmd_zincrby(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zincrby", args, 3, 3)?;
        let delta = float_arg(&args[1])?;
        let score = self
            .keyspace
            .zincrby(args[0].clone(), delta, args[2].clone())?;
        Ok(Reply::Bulk(format_float(score)))
    }

    /// ZSCORE key member
    fn cmd_zscore(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zscore", args, 2, 2)?;
        Ok(score_reply(self.keyspace.zscore(&args[0], &args[1])?))
    }

    /// ZCARD key
    fn cmd_zcard(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zcard", args, 1, 1)?;
        Ok(Reply::from_len(self.keyspace.zcard(&args[0])?))
    }

    /// ZRANK / ZREVRANK key member
    fn cmd_zrank(&self, cmd: &str, args: &[Bytes], reverse: bool) -> Result<Reply> {
        arity(cmd, args, 2, 2)?;
        let rank = if reverse {
            self.keyspace.zrevrank(&args[0], &args[1])?
        } else {
            self.keyspace.zrank(&args[0], &args[1])?
        };
        Ok(rank_reply(rank))
    }

    /// ZRANGE / ZREVRANGE key start stop [WITHSCORES]
    fn cmd_zrange(&self, cmd: &str, args: &[Bytes], reverse: bool) -> Result<Reply> {
        arity(cmd, args, 3, 4)?;
        let with_scores = match args.get(3) {
            None => false,
            Some(arg) if keyword(arg) == "WITHSCORES" => true,
            Some(_) => return Err(StoreError::Syntax),
        };
        let start = int_arg(&args[1])?;
        let stop = int_arg(&args[2])?;

        let items = if reverse {
            self.keyspace.zrevrange(&args[0], start, stop)?
        } else {
            self.keyspace.zrange(&args[0], start, stop)?
        };
        Ok(scored(items, with_scores))
    }

    /// ZRANGEBYSCORE key min max / ZREVRANGEBYSCORE key max min,
    /// then [WITHSCORES] [LIMIT offset count]
    fn cmd_zrangebyscore(&self, cmd: &str, args: &[Bytes], reverse: bool) -> Result<Reply> {
        arity(cmd, args, 3, usize::MAX)?;
        let range = if reverse {
            ScoreRange::parse(&args[2], &args[1])?
        } else {
            ScoreRange::parse(&args[1], &args[2])?
        };

        let mut with_scores = false;
        let mut limit = None;
        let mut i = 3;
        while i < args.len() {
            match keyword(&args[i]).as_str() {
                "WITHSCORES" => with_scores = true,
                "LIMIT" => {
                    let offset = args.get(i + 1).ok_or(StoreError::Syntax)?;
                    let count = args.get(i + 2).ok_or(StoreError::Syntax)?;
                    let offset = int_arg(offset)?;
                    let count = int_arg(count)?;
                    // A negative offset selects nothing; a negative count means "all"
                    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
                    let count = usize::try_from(count).unwrap_or(usize::MAX);
                    limit = Some((offset, count));
                    i += 2;
                }
                _ => return Err(StoreError::Syntax),
            }
            i += 1;
        }

        let items = if reverse {
            self.keyspace.zrevrangebyscore(&args[0], &range, limit)?
        } else {
            self.keyspace.zrangebyscore(&args[0], &range, limit)?
        };
        Ok(scored(items, with_scores))
    }

    /// ZCOUNT key min max
    fn cmd_zcount(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zcount", args, 3, 3)?;
        let range = ScoreRange::parse(&args[1], &args[2])?;
        Ok(Reply::from_len(self.keyspace.zcount(&args[0], &range)?))
    }

    /// ZREM key member [member ...]
    fn cmd_zrem(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zrem", args, 2, usize::MAX)?;
        Ok(Reply::from_len(self.keyspace.zrem(&args[0], &args[1..])?))
    }

    /// ZREMRANGEBYRANK key start stop
    fn cmd_zremrangebyrank(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zremrangebyrank", args, 3, 3)?;
        let start = int_arg(&args[1])?;
        let stop = int_arg(&args[2])?;
        Ok(Reply::from_len(
            self.keyspace.zremrangebyrank(&args[0], start, stop)?,
        ))
    }

    /// ZREMRANGEBYSCORE key min max
    fn cmd_zremrangebyscore(&self, args: &[Bytes]) -> Result<Reply> {
        arity("zremrangebyscore", args, 3, 3)?;
        let range = ScoreRange::parse(&args[1], &args[2])?;
        Ok(Reply::from_len(
            self.keyspace.zremrangebyscore(&args[0], &range)?,
        ))
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Result<Reply> {
        arity("ping", args, 0, 1)?;
        Ok(match args.first() {
            Some(message) => Reply::Bulk(message.clone()),
            None => Reply::bulk("PONG"),
        })
    }
}
