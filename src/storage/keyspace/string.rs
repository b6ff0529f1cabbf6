//! String engine: `SET`, `GET`, `INCRBY`, `APPEND` and friends.

use super::Keyspace;
use crate::error::{Result, StoreError};
use crate::storage::value::Value;
use bytes::{Bytes, BytesMut};
use std::time::Duration;

/// `NX` / `XX` condition for `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set if the key does not exist
    IfAbsent,
    /// Only set if the key already exists
    IfPresent,
}

/// Options accepted by [`Keyspace::set_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// New TTL (`EX` / `PX`)
    pub ttl: Option<Duration>,
    pub condition: Option<SetCondition>,
    /// Keep the existing TTL instead of clearing it (`KEEPTTL`)
    pub keep_ttl: bool,
    /// Return the previous value (`GET`)
    pub get: bool,
}

/// What [`Keyspace::set_with`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// False when the `NX` / `XX` condition blocked the write
    pub written: bool,
    /// The previous string value, only filled in when `get` was requested
    pub previous: Option<Bytes>,
}

/// Strict decimal integer: optional `-`, no `+`, no whitespace.
pub(crate) fn parse_int(text: &[u8]) -> Result<i64> {
    std::str::from_utf8(text)
        .ok()
        .filter(|s| !s.starts_with('+'))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(StoreError::NotAnInteger)
}

pub(crate) fn parse_float(text: &[u8]) -> Result<f64> {
    let value = std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or(StoreError::NotAFloat)?;
    if value.is_nan() {
        return Err(StoreError::NotAFloat);
    }
    Ok(value)
}

/// Shortest text that parses back to the same float (`115.8`, `3`).
pub(crate) fn format_float(value: f64) -> Bytes {
    Bytes::from(value.to_string())
}

impl Keyspace {
    /// Stores a string, replacing any previous value and TTL.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| self.deadline_after(ttl));
        self.write(&key.clone(), |shard| {
            shard.insert(key, Value::String(value), expires_at);
        });
    }

    /// `SET` with `NX` / `XX` / `KEEPTTL` / `GET`.
    ///
    /// With `get`, a non-string previous value is a `WrongType` error and
    /// nothing is written.
    pub fn set_with(&self, key: Bytes, value: Bytes, options: SetOptions) -> Result<SetOutcome> {
        let expires_at = options.ttl.map(|ttl| self.deadline_after(ttl));
        self.write(&key.clone(), |shard| {
            let previous = if options.get {
                shard.get_as(&key, Value::as_string)?.cloned()
            } else {
                None
            };

            let exists = shard.contains(&key);
            let blocked = match options.condition {
                Some(SetCondition::IfAbsent) => exists,
                Some(SetCondition::IfPresent) => !exists,
                None => false,
            };
            if blocked {
                return Ok(SetOutcome {
                    written: false,
                    previous,
                });
            }

            let expires_at = match (expires_at, options.keep_ttl) {
                (None, true) => shard.get(&key).and_then(|e| e.expires_at),
                (at, _) => at,
            };
            shard.insert(key, Value::String(value), expires_at);

            Ok(SetOutcome {
                written: true,
                previous,
            })
        })
    }

    /// Returns the string at `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.read_as(key, Value::as_string, Bytes::clone)
    }

    /// Sets a new value and returns the old one. Clears the TTL.
    pub fn getset(&self, key: Bytes, value: Bytes) -> Result<Option<Bytes>> {
        self.write(&key.clone(), |shard| {
            let previous = shard.get_as(&key, Value::as_string)?.cloned();
            shard.insert(key, Value::String(value), None);
            Ok(previous)
        })
    }

    /// Returns the string at `key` and deletes the key.
    pub fn getdel(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.write(key, |shard| {
            let value = shard.get_as(key, Value::as_string)?.cloned();
            if value.is_some() {
                shard.remove(key);
            }
            Ok(value)
        })
    }

    /// Sets `key` only if it does not exist. Returns whether it was set.
    pub fn setnx(&self, key: Bytes, value: Bytes) -> bool {
        self.write(&key.clone(), |shard| {
            if shard.contains(&key) {
                return false;
            }
            shard.insert(key, Value::String(value), None);
            true
        })
    }

    /// Sets several strings at once. Every pair lands or none does.
    pub fn mset(&self, pairs: Vec<(Bytes, Bytes)>) {
        let keys: Vec<Bytes> = pairs.iter().map(|(k, _)| k.clone()).collect();
        self.write_many(&keys, |set| {
            for (key, value) in pairs {
                set.shard(&key).insert(key.clone(), Value::String(value), None);
            }
        });
    }

    /// Returns the strings at `keys`, aligned with the input. Missing keys and
    /// keys of other kinds come back as `None`.
    pub fn mget(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        self.read_many(keys, |set| {
            keys.iter()
                .map(|key| {
                    set.get_as(key, Value::as_string)
                        .ok()
                        .flatten()
                        .cloned()
                })
                .collect()
        })
    }

    /// Adds `delta` to the integer stored at `key` (missing counts as 0).
    /// Keeps the TTL.
    pub fn incr_by(&self, key: Bytes, delta: i64) -> Result<i64> {
        self.write(&key.clone(), |shard| {
            let current = match shard.get_as(&key, Value::as_string)? {
                Some(text) => parse_int(text)?,
                None => 0,
            };
            let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
            shard.replace_value(key, Value::String(Bytes::from(next.to_string())));
            Ok(next)
        })
    }

    pub fn decr_by(&self, key: Bytes, delta: i64) -> Result<i64> {
        let delta = delta.checked_neg().ok_or(StoreError::Overflow)?;
        self.incr_by(key, delta)
    }

    /// Adds `delta` to the float stored at `key` (missing counts as 0).
    pub fn incr_by_float(&self, key: Bytes, delta: f64) -> Result<f64> {
        self.write(&key.clone(), |shard| {
            let current = match shard.get_as(&key, Value::as_string)? {
                Some(text) => parse_float(text)?,
                None => 0.0,
            };
            let next = current + delta;
            if !next.is_finite() {
                return Err(StoreError::NanResult);
            }
            shard.replace_value(key, Value::String(format_float(next)));
            Ok(next)
        })
    }

    /// Appends to the string at `key`, creating it if needed. Returns the new
    /// length.
    pub fn append(&self, key: Bytes, suffix: &[u8]) -> Result<usize> {
        self.write(&key.clone(), |shard| {
            let mut buf = match shard.get_as(&key, Value::as_string)? {
                Some(existing) => BytesMut::from(existing.as_ref()),
                None => BytesMut::new(),
            };
            buf.extend_from_slice(suffix);
            let len = buf.len();
            shard.replace_value(key, Value::String(buf.freeze()));
            Ok(len)
        })
    }

    pub fn strlen(&self, key: &[u8]) -> Result<usize> {
        Ok(self.read_as(key, Value::as_string, Bytes::len)?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::storage::keyspace::{Keyspace, KeyspaceConfig, SetCondition, SetOptions, Ttl};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_set_and_get() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key"), b("value"), None);
        assert_eq!(keyspace.get(b"key").unwrap(), Some(b("value")));
        assert_eq!(keyspace.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites_any_kind() {
        let keyspace = Keyspace::new();
        keyspace.rpush(b("key"), vec![b("a")]).unwrap();
        keyspace.set(b("key"), b("now a string"), None);
        assert_eq!(keyspace.get(b"key").unwrap(), Some(b("now a string")));
    }

    #[test]
    fn test_get_wrong_type() {
        let keyspace = Keyspace::new();
        keyspace.sadd(b("set"), vec![b("a")]).unwrap();
        assert_eq!(keyspace.get(b"set"), Err(StoreError::WrongType));
    }

    #[test]
    fn test_set_clears_ttl() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key"), b("v1"), Some(Duration::from_secs(10)));
        keyspace.set(b("key"), b("v2"), None);
        assert_eq!(keyspace.ttl(b"key"), Ttl::Persistent);
        assert_eq!(keyspace.volatile_len(), 0);
    }

    #[test]
    fn test_set_keepttl() {
        let clock = Arc::new(ManualClock::new());
        let keyspace = Keyspace::with_clock(KeyspaceConfig::default(), clock.clone());
        keyspace.set(b("key"), b("v1"), Some(Duration::from_secs(10)));

        let options = SetOptions {
            keep_ttl: true,
            ..Default::default()
        };
        keyspace.set_with(b("key"), b("v2"), options).unwrap();

        assert_eq!(keyspace.get(b"key").unwrap(), Some(b("v2")));
        assert_eq!(keyspace.ttl(b"key").as_secs(), 10);
    }

    #[test]
    fn test_set_conditions() {
        let keyspace = Keyspace::new();
        let nx = SetOptions {
            condition: Some(SetCondition::IfAbsent),
            ..Default::default()
        };
        let xx = SetOptions {
            condition: Some(SetCondition::IfPresent),
            ..Default::default()
        };

        assert!(!keyspace.set_with(b("key"), b("v"), xx.clone()).unwrap().written);
        assert!(keyspace.set_with(b("key"), b("v1"), nx.clone()).unwrap().written);
        assert!(!keyspace.set_with(b("key"), b("v2"), nx).unwrap().written);
        assert!(keyspace.set_with(b("key"), b("v3"), xx).unwrap().written);
        assert_eq!(keyspace.get(b"key").unwrap(), Some(b("v3")));
    }

    #[test]
    fn test_set_get_option() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key"), b("old"), None);
        let options = SetOptions {
            get: true,
            ..Default::default()
        };
        let outcome = keyspace.set_with(b("key"), b("new"), options.clone()).unwrap();
        assert_eq!(outcome.previous, Some(b("old")));

        keyspace.rpush(b("list"), vec![b("a")]).unwrap();
        assert_eq!(
            keyspace.set_with(b("list"), b("x"), options),
            Err(StoreError::WrongType)
        );
        assert_eq!(keyspace.llen(b"list").unwrap(), 1);
    }

    #[test]
    fn test_getset_and_getdel() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key"), b("one"), Some(Duration::from_secs(10)));

        assert_eq!(keyspace.getset(b("key"), b("two")).unwrap(), Some(b("one")));
        assert_eq!(keyspace.ttl(b"key"), Ttl::Persistent);

        assert_eq!(keyspace.getdel(b"key").unwrap(), Some(b("two")));
        assert_eq!(keyspace.exists(&[b("key")]), 0);
        assert_eq!(keyspace.getdel(b"key").unwrap(), None);
    }

    #[test]
    fn test_setnx() {
        let keyspace = Keyspace::new();
        assert!(keyspace.setnx(b("key"), b("first")));
        assert!(!keyspace.setnx(b("key"), b("second")));
        assert_eq!(keyspace.get(b"key").unwrap(), Some(b("first")));
    }

    #[test]
    fn test_mset_mget() {
        let keyspace = Keyspace::new();
        keyspace.mset(vec![(b("a"), b("1")), (b("b"), b("2"))]);
        keyspace.hset(b("h"), vec![(b("f"), b("v"))]).unwrap();

        assert_eq!(
            keyspace.mget(&[b("a"), b("missing"), b("b"), b("h")]),
            vec![Some(b("1")), None, Some(b("2")), None]
        );
    }

    #[test]
    fn test_incr_family() {
        let keyspace = Keyspace::new();
        assert_eq!(keyspace.incr_by(b("counter"), 1).unwrap(), 1);
        assert_eq!(keyspace.incr_by(b("counter"), 10).unwrap(), 11);
        assert_eq!(keyspace.decr_by(b("counter"), 5).unwrap(), 6);
        assert_eq!(keyspace.get(b"counter").unwrap(), Some(b("6")));

        keyspace.set(b("text"), b("abc"), None);
        assert_eq!(keyspace.incr_by(b("text"), 1), Err(StoreError::NotAnInteger));
        assert_eq!(keyspace.get(b"text").unwrap(), Some(b("abc")));

        keyspace.set(b("max"), Bytes::from(i64::MAX.to_string()), None);
        assert_eq!(keyspace.incr_by(b("max"), 1), Err(StoreError::Overflow));
        assert_eq!(keyspace.decr_by(b("x"), i64::MIN), Err(StoreError::Overflow));
    }

    #[test]
    fn test_incr_rejects_explicit_plus() {
        let keyspace = Keyspace::new();
        keyspace.set(b("n"), b("+5"), None);
        assert_eq!(keyspace.incr_by(b("n"), 1), Err(StoreError::NotAnInteger));
        assert_eq!(keyspace.get(b"n").unwrap(), Some(b("+5")));

        assert_eq!(super::parse_int(b"-5"), Ok(-5));
        assert_eq!(super::parse_int(b" 5"), Err(StoreError::NotAnInteger));
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let keyspace = Keyspace::new();
        keyspace.set(b("counter"), b("1"), Some(Duration::from_secs(100)));
        keyspace.incr_by(b("counter"), 1).unwrap();
        assert!(matches!(keyspace.ttl(b"counter"), Ttl::Remaining(_)));
    }

    #[test]
    fn test_incr_by_float() {
        let keyspace = Keyspace::new();
        keyspace.set(b("price"), b("10.5"), None);
        assert_eq!(keyspace.incr_by_float(b("price"), 0.1).unwrap(), 10.6);
        assert_eq!(keyspace.get(b"price").unwrap(), Some(b("10.6")));
        assert_eq!(
            keyspace.incr_by_float(b("price"), f64::INFINITY),
            Err(StoreError::NanResult)
        );
    }

    #[test]
    fn test_append_and_strlen() {
        let keyspace = Keyspace::new();
        assert_eq!(keyspace.append(b("greeting"), b"Hello").unwrap(), 5);
        assert_eq!(keyspace.append(b("greeting"), b", World").unwrap(), 12);
        assert_eq!(keyspace.get(b"greeting").unwrap(), Some(b("Hello, World")));
        assert_eq!(keyspace.strlen(b"greeting").unwrap(), 12);
        assert_eq!(keyspace.strlen(b"missing").unwrap(), 0);

        keyspace.rpush(b("list"), vec![b("a")]).unwrap();
        assert_eq!(keyspace.append(b("list"), b"x"), Err(StoreError::WrongType));
    }
}
