//! Thread-Safe Keyspace with Expiry Support
//!
//! The keyspace owns every entry in the store. It maps keys to an [`Entry`]
//! (a [`Value`] plus an optional deadline) and enforces type correctness for
//! the five type engines, which live in the submodules:
//!
//! - [`string`]: `SET`, `GET`, `INCRBY`, `APPEND`, ...
//! - [`hash`]: `HSET`, `HGET`, `HINCRBY`, ...
//! - [`list`]: `LPUSH`, `LRANGE`, `LTRIM`, `RPOPLPUSH`, `BLPOP`, ...
//! - [`set`]: `SADD`, `SPOP`, `SUNIONSTORE`, `SMOVE`, ...
//! - [`zset`]: `ZADD`, `ZRANK`, `ZRANGEBYSCORE`, ...
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ entries │ │ entries │ │ entries │ │ entries │           │
//! │  │ expiry  │ │ expiry  │ │ expiry  │ │ expiry  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards by hash, so commands on keys in
//! different shards never contend. Every command runs entirely under the
//! lock(s) of the shard(s) it touches, which makes it atomic with respect to
//! any other command on the same keys.
//!
//! Commands spanning several keys (`RENAME`, `RPOPLPUSH`, `SMOVE`,
//! `SUNIONSTORE`, ...) lock all involved shards up front, always in ascending
//! shard order, so two such commands can never deadlock each other.
//!
//! ## Expiry
//!
//! Reads take the shard's read lock and treat an expired key as absent. If
//! they find one, they retake the lock for writing and evict it. Writes purge
//! an expired key before looking at it. Either way, nobody ever observes a
//! value at or past its deadline.

mod hash;
mod list;
mod set;
mod string;
mod zset;

pub use string::{SetCondition, SetOptions, SetOutcome};
pub use zset::ZaddOptions;

pub(crate) use string::{format_float, parse_int};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::storage::expiry::ExpiryIndex;
use crate::storage::pattern::glob_match;
use crate::storage::value::{Value, ValueKind};
use crate::storage::waiters::Waiters;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace};

/// Default number of shards.
/// More shards = less lock contention, but more memory overhead.
pub const DEFAULT_SHARDS: usize = 64;

/// Longest TTL honoured; larger ones are clamped.
pub(crate) const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A stored value with its optional deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Remaining time to live, as reported by `TTL` / `PTTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key does not exist
    Missing,
    /// The key exists and never expires
    Persistent,
    /// The key expires after this long (always non-zero)
    Remaining(Duration),
}

impl Ttl {
    /// Marker for a key that does not exist.
    pub const MISSING_MARKER: i64 = -2;
    /// Marker for a key without an expiry.
    pub const PERSISTENT_MARKER: i64 = -1;

    /// Whole seconds remaining (rounded up), or one of the markers.
    pub fn as_secs(&self) -> i64 {
        match self {
            Ttl::Missing => Self::MISSING_MARKER,
            Ttl::Persistent => Self::PERSISTENT_MARKER,
            Ttl::Remaining(d) => ceil_div(d.as_nanos(), 1_000_000_000),
        }
    }

    /// Whole milliseconds remaining (rounded up), or one of the markers.
    pub fn as_millis(&self) -> i64 {
        match self {
            Ttl::Missing => Self::MISSING_MARKER,
            Ttl::Persistent => Self::PERSISTENT_MARKER,
            Ttl::Remaining(d) => ceil_div(d.as_nanos(), 1_000_000),
        }
    }
}

fn ceil_div(n: u128, d: u128) -> i64 {
    i64::try_from(n.div_ceil(d)).unwrap_or(i64::MAX)
}

/// Keyspace configuration.
#[derive(Debug, Clone)]
pub struct KeyspaceConfig {
    /// Number of independently locked shards (default: 64)
    pub shards: usize,

    /// Seed for SPOP / SRANDMEMBER sampling; `None` seeds from the OS
    pub rng_seed: Option<u64>,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            rng_seed: None,
        }
    }
}

/// One shard: its entries and their deadlines.
#[derive(Debug, Default)]
pub(crate) struct Shard {
    entries: HashMap<Bytes, Entry>,
    expiry: ExpiryIndex,
}

impl Shard {
    /// Evicts `key` if its deadline has passed. Returns `true` if evicted.
    fn purge_if_expired(&mut self, key: &[u8], now: Instant) -> bool {
        if self.expiry.check(key, now) {
            self.remove(key);
            true
        } else {
            false
        }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn kind_of(&self, key: &[u8]) -> Option<ValueKind> {
        self.entries.get(key).map(|e| e.value.kind())
    }

    /// Fails with `WrongType` if `key` exists with a kind other than `kind`.
    pub(crate) fn expect_kind(&self, key: &[u8], kind: ValueKind) -> Result<()> {
        match self.kind_of(key) {
            Some(found) if found != kind => Err(StoreError::WrongType),
            _ => Ok(()),
        }
    }

    /// Borrows the value under `key` through `project`.
    ///
    /// `Ok(None)` if the key is absent, `WrongType` if `project` rejects it.
    pub(crate) fn get_as<C: ?Sized>(
        &self,
        key: &[u8],
        project: fn(&Value) -> Option<&C>,
    ) -> Result<Option<&C>> {
        match self.entries.get(key) {
            Some(entry) => project(&entry.value)
                .map(Some)
                .ok_or(StoreError::WrongType),
            None => Ok(None),
        }
    }

    /// Mutable counterpart of [`Shard::get_as`].
    pub(crate) fn get_mut_as<C: ?Sized>(
        &mut self,
        key: &[u8],
        project: fn(&mut Value) -> Option<&mut C>,
    ) -> Result<Option<&mut C>> {
        match self.entries.get_mut(key) {
            Some(entry) => project(&mut entry.value)
                .map(Some)
                .ok_or(StoreError::WrongType),
            None => Ok(None),
        }
    }

    /// Like [`Shard::get_mut_as`] but creates an empty `kind` container first
    /// when the key is absent.
    ///
    /// Callers must either add to the container or call
    /// [`Shard::remove_if_empty`] afterwards.
    pub(crate) fn get_or_create_as<C: ?Sized>(
        &mut self,
        key: &Bytes,
        kind: ValueKind,
        project: fn(&mut Value) -> Option<&mut C>,
    ) -> Result<&mut C> {
        self.expect_kind(key, kind)?;
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::empty(kind)));
        project(&mut entry.value).ok_or(StoreError::WrongType)
    }

    /// Stores `value` under `key`, replacing any previous entry and deadline.
    pub(crate) fn insert(&mut self, key: Bytes, value: Value, expires_at: Option<Instant>) {
        match expires_at {
            Some(at) => self.expiry.arm(key.clone(), at),
            None => {
                self.expiry.persist(&key);
            }
        }
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Stores `value` under `key`, keeping the key's current deadline.
    pub(crate) fn replace_value(&mut self, key: Bytes, value: Value) {
        match self.entries.get_mut(&key) {
            Some(entry) => entry.value = value,
            None => {
                self.entries.insert(key, Entry::new(value));
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if entry.expires_at.is_some() {
            self.expiry.persist(key);
        }
        Some(entry)
    }

    /// Drops `key` if it holds an empty container.
    pub(crate) fn remove_if_empty(&mut self, key: &[u8]) -> bool {
        let empty = self
            .entries
            .get(key)
            .is_some_and(|e| e.value.is_empty_container());
        if empty {
            self.remove(key);
        }
        empty
    }

    fn set_deadline(&mut self, key: &[u8], at: Option<Instant>) -> bool {
        let Some((key, entry)) = self.entries.get_key_value(key) else {
            return false;
        };
        let key = key.clone();
        let had_deadline = entry.expires_at.is_some();
        match at {
            Some(at) => self.expiry.arm(key.clone(), at),
            None => {
                self.expiry.persist(&key);
            }
        }
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.expires_at = at;
        }
        at.is_some() || had_deadline
    }
}

/// Write guards over every shard a multi-key command touches.
pub(crate) struct ShardSet<'a> {
    keyspace: &'a Keyspace,
    /// Sorted by shard index
    guards: Vec<(usize, RwLockWriteGuard<'a, Shard>)>,
}

impl ShardSet<'_> {
    /// The shard holding `key`. The key must have been passed to
    /// [`Keyspace::write_many`].
    pub(crate) fn shard(&mut self, key: &[u8]) -> &mut Shard {
        let idx = self.keyspace.shard_index(key);
        let pos = self
            .guards
            .binary_search_by_key(&idx, |(i, _)| *i)
            .unwrap_or_else(|_| panic!("shard {} was not locked for this command", idx));
        &mut self.guards[pos].1
    }

    /// Shared view of the shard holding `key`.
    pub(crate) fn shard_ref(&self, key: &[u8]) -> &Shard {
        let idx = self.keyspace.shard_index(key);
        let pos = self
            .guards
            .binary_search_by_key(&idx, |(i, _)| *i)
            .unwrap_or_else(|_| panic!("shard {} was not locked for this command", idx));
        &self.guards[pos].1
    }
}

/// Read guards over every shard a multi-key read touches.
pub(crate) struct ReadSet<'a> {
    keyspace: &'a Keyspace,
    guards: Vec<(usize, RwLockReadGuard<'a, Shard>)>,
    now: Instant,
}

impl ReadSet<'_> {
    /// The live entry under `key`, if any.
    pub(crate) fn get(&self, key: &[u8]) -> Option<&Entry> {
        let idx = self.keyspace.shard_index(key);
        let pos = self.guards.binary_search_by_key(&idx, |(i, _)| *i).ok()?;
        self.guards[pos]
            .1
            .get(key)
            .filter(|e| !e.is_expired(self.now))
    }

    /// Typed counterpart of [`ReadSet::get`].
    pub(crate) fn get_as<C: ?Sized>(
        &self,
        key: &[u8],
        project: fn(&Value) -> Option<&C>,
    ) -> Result<Option<&C>> {
        match self.get(key) {
            Some(entry) => project(&entry.value)
                .map(Some)
                .ok_or(StoreError::WrongType),
            None => Ok(None),
        }
    }
}

/// Resolves an inclusive `[start, stop]` pair of possibly negative indices
/// against a sequence of `len` elements.
///
/// Out-of-range ends are clamped; `None` means the range selects nothing.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Resolves a single possibly negative index.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// The main storage engine for polykv.
///
/// Designed to be wrapped in an `Arc` and shared across tasks and threads;
/// every operation is thread-safe.
///
/// # Example
///
/// ```
/// use polykv::storage::Keyspace;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let keyspace = Keyspace::new();
///
/// keyspace.set(Bytes::from("name"), Bytes::from("Alice"), None);
/// assert_eq!(keyspace.get(b"name").unwrap(), Some(Bytes::from("Alice")));
///
/// keyspace.set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)));
/// ```
pub struct Keyspace {
    shards: Vec<RwLock<Shard>>,

    clock: Arc<dyn Clock>,

    /// Sampling source for SPOP / SRANDMEMBER
    rng: Mutex<StdRng>,

    /// Blocked BLPOP / BRPOP callers
    waiters: Waiters,

    /// Statistics: read commands served
    read_count: AtomicU64,

    /// Statistics: write commands served
    write_count: AtomicU64,

    /// Statistics: keys evicted by expiry (passive or active)
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("shards", &self.shards.len())
            .field("clock", &self.clock)
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates a keyspace with default settings and the system clock.
    pub fn new() -> Self {
        Self::with_config(KeyspaceConfig::default())
    }

    pub fn with_config(config: KeyspaceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a keyspace reading time from `clock`.
    pub fn with_clock(config: KeyspaceConfig, clock: Arc<dyn Clock>) -> Self {
        let shards = (0..config.shards.max(1))
            .map(|_| RwLock::new(Shard::default()))
            .collect();
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            shards,
            clock,
            rng: Mutex::new(rng),
            waiters: Waiters::new(),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ========================================================================
    // Locking
    // ========================================================================

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn read_shard(&self, idx: usize) -> RwLockReadGuard<'_, Shard> {
        self.shards[idx]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_shard(&self, idx: usize) -> RwLockWriteGuard<'_, Shard> {
        self.shards[idx]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the live value under `key` (`None` if absent or
    /// expired) while holding the shard's lock.
    ///
    /// This is the "lazy expiry" path: an expired key found here is evicted.
    pub(crate) fn view<T>(&self, key: &[u8], f: impl FnOnce(&Shard) -> T) -> T {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let idx = self.shard_index(key);
        let now = self.clock.now();

        // Fast path: read lock, key live or absent
        {
            let shard = self.read_shard(idx);
            if !shard.expiry.check(key, now) {
                return f(&shard);
            }
        }

        // Key is expired - need the write lock to remove it
        let mut shard = self.write_shard(idx);
        if shard.purge_if_expired(key, now) {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            trace!(key = ?key, "evicted expired key on read");
        }
        f(&shard)
    }

    /// Typed read: `Ok(None)` if the key is absent, `WrongType` if it holds
    /// something `project` rejects.
    pub(crate) fn read_as<C: ?Sized, T>(
        &self,
        key: &[u8],
        project: fn(&Value) -> Option<&C>,
        f: impl FnOnce(&C) -> T,
    ) -> Result<Option<T>> {
        self.view(key, |shard| Ok(shard.get_as(key, project)?.map(f)))
    }

    /// Runs `f` with exclusive access to the shard holding `key`, after
    /// evicting `key` if it has expired.
    pub(crate) fn write<T>(&self, key: &[u8], f: impl FnOnce(&mut Shard) -> T) -> T {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut shard = self.write_shard(self.shard_index(key));
        if shard.purge_if_expired(key, now) {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
        f(&mut shard)
    }

    /// Runs `f` with exclusive access to every shard holding one of `keys`,
    /// after evicting any of them that have expired.
    ///
    /// Locks are taken in ascending shard order.
    pub(crate) fn write_many<K, T>(&self, keys: &[K], f: impl FnOnce(&mut ShardSet<'_>) -> T) -> T
    where
        K: AsRef<[u8]>,
    {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        let mut indices: Vec<usize> = keys.iter().map(|k| self.shard_index(k.as_ref())).collect();
        indices.sort_unstable();
        indices.dedup();

        let guards = indices
            .into_iter()
            .map(|idx| (idx, self.write_shard(idx)))
            .collect();
        let mut set = ShardSet {
            keyspace: self,
            guards,
        };

        for key in keys {
            if set.shard(key.as_ref()).purge_if_expired(key.as_ref(), now) {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        f(&mut set)
    }

    /// Runs `f` with shared access to every shard holding one of `keys`.
    ///
    /// Used by multi-key reads (`SUNION`, `MGET`, ...) so they observe one
    /// consistent snapshot. Expired keys read as absent.
    pub(crate) fn read_many<K, T>(&self, keys: &[K], f: impl FnOnce(&ReadSet<'_>) -> T) -> T
    where
        K: AsRef<[u8]>,
    {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let mut indices: Vec<usize> = keys.iter().map(|k| self.shard_index(k.as_ref())).collect();
        indices.sort_unstable();
        indices.dedup();

        let guards = indices
            .into_iter()
            .map(|idx| (idx, self.read_shard(idx)))
            .collect();
        let set = ReadSet {
            keyspace: self,
            guards,
            now: self.clock.now(),
        };

        f(&set)
    }

    pub(crate) fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn waiters(&self) -> &Waiters {
        &self.waiters
    }

    /// Converts a relative TTL into a deadline.
    fn deadline_after(&self, ttl: Duration) -> Instant {
        let now = self.clock.now();
        now.checked_add(ttl).unwrap_or_else(|| now + MAX_TTL)
    }

    // ========================================================================
    // Key commands
    // ========================================================================

    /// Deletes keys. Returns how many existed.
    pub fn delete(&self, keys: &[Bytes]) -> usize {
        self.write_many(keys, |set| {
            keys.iter()
                .filter(|key| set.shard(key).remove(key).is_some())
                .count()
        })
    }

    /// Same as [`Keyspace::delete`]; values are dropped in place either way.
    pub fn unlink(&self, keys: &[Bytes]) -> usize {
        self.delete(keys)
    }

    /// Counts how many of `keys` exist. A key listed twice counts twice.
    pub fn exists(&self, keys: &[Bytes]) -> usize {
        keys.iter()
            .filter(|key| self.view(key, |shard| shard.contains(key)))
            .count()
    }

    /// Returns the kind of value stored at `key`.
    pub fn key_type(&self, key: &[u8]) -> Option<ValueKind> {
        self.view(key, |shard| shard.kind_of(key))
    }

    /// Moves the entry at `src` (value and TTL) to `dst`.
    ///
    /// Fails with `NoSuchKey` if `src` is missing. With `overwrite == false`
    /// and an existing `dst`, returns `Ok(false)` and changes nothing.
    pub fn rename(&self, src: &[u8], dst: Bytes, overwrite: bool) -> Result<bool> {
        let keys = [src, dst.as_ref()];
        self.write_many(&keys, |set| {
            if !set.shard(src).contains(src) {
                return Err(StoreError::NoSuchKey);
            }
            if src == dst.as_ref() {
                return Ok(overwrite);
            }
            if !overwrite && set.shard(&dst).contains(&dst) {
                return Ok(false);
            }
            let Some(entry) = set.shard(src).remove(src) else {
                return Err(StoreError::NoSuchKey);
            };
            let is_list = entry.value.kind() == ValueKind::List;
            set.shard(&dst).insert(dst.clone(), entry.value, entry.expires_at);
            if is_list {
                self.waiters.wake(&dst);
            }
            debug!(src = ?src, dst = ?dst, "renamed key");
            Ok(true)
        })
    }

    /// Arms a TTL on an existing key. A zero TTL deletes the key.
    ///
    /// Returns `false` if the key does not exist.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let deadline = self.deadline_after(ttl);
        self.write(key, |shard| {
            if !shard.contains(key) {
                return false;
            }
            if ttl.is_zero() {
                shard.remove(key);
            } else {
                shard.set_deadline(key, Some(deadline));
            }
            true
        })
    }

    /// Arms an absolute deadline given as wall-clock time. A deadline in the
    /// past deletes the key.
    pub fn expire_at(&self, key: &[u8], at: SystemTime) -> bool {
        let ttl = at.duration_since(self.clock.wall()).unwrap_or(Duration::ZERO);
        self.expire(key, ttl)
    }

    /// Removes the TTL from a key.
    ///
    /// Returns `true` only if the key existed and had a TTL.
    pub fn persist(&self, key: &[u8]) -> bool {
        self.write(key, |shard| {
            shard.get(key).is_some_and(|e| e.expires_at.is_some()) && shard.set_deadline(key, None)
        })
    }

    /// Remaining time to live for `key`.
    pub fn ttl(&self, key: &[u8]) -> Ttl {
        let now = self.clock.now();
        self.view(key, |shard| match shard.get(key) {
            None => Ttl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => Ttl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => Ttl::Remaining(at.saturating_duration_since(now)),
        })
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// **Warning**: This scans every shard and can be slow on large keyspaces.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let now = self.clock.now();
        let mut result = Vec::new();

        for idx in 0..self.shards.len() {
            let shard = self.read_shard(idx);
            for (key, entry) in shard.entries.iter() {
                if !entry.is_expired(now) && glob_match(pattern, key) {
                    result.push(key.clone());
                }
            }
        }

        result
    }

    /// Removes every key.
    pub fn flush(&self) {
        for idx in 0..self.shards.len() {
            let mut shard = self.write_shard(idx);
            shard.entries.clear();
            shard.expiry.clear();
        }
    }

    // ========================================================================
    // Sizing and active expiry
    // ========================================================================

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        (0..self.shards.len())
            .map(|idx| self.read_shard(idx).entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries carrying a TTL.
    pub fn volatile_len(&self) -> usize {
        (0..self.shards.len())
            .map(|idx| self.read_shard(idx).expiry.len())
            .sum()
    }

    /// Evicts every expired key, holding each shard lock for at most
    /// `batch_size` evictions at a time.
    ///
    /// Returns the number of keys evicted. Called by the background sweeper.
    pub fn sweep_expired(&self, batch_size: usize) -> usize {
        let batch_size = batch_size.max(1);
        let mut total = 0;

        for idx in 0..self.shards.len() {
            loop {
                let now = self.clock.now();
                let evicted = {
                    let mut shard = self.write_shard(idx);
                    let expired = shard.expiry.sweep(now, batch_size);
                    for key in &expired {
                        shard.entries.remove(key);
                    }
                    expired.len()
                };
                total += evicted;
                if evicted < batch_size {
                    break;
                }
            }
        }

        if total > 0 {
            self.expired_count.fetch_add(total as u64, Ordering::Relaxed);
        }
        total
    }

    /// Returns keyspace statistics.
    pub fn stats(&self) -> KeyspaceStats {
        let mut keys = 0;
        let mut volatile_keys = 0;
        let mut used_memory = 0;
        for idx in 0..self.shards.len() {
            let shard = self.read_shard(idx);
            keys += shard.entries.len();
            volatile_keys += shard.expiry.len();
            used_memory += shard
                .entries
                .iter()
                .map(|(k, e)| k.len() + e.value.memory_usage())
                .sum::<usize>();
        }

        KeyspaceStats {
            keys,
            volatile_keys,
            used_memory,
            reads: self.read_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Keyspace statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyspaceStats {
    /// Number of keys currently stored
    pub keys: usize,
    /// Keys carrying a TTL
    pub volatile_keys: usize,
    /// Approximate payload bytes (keys + values)
    pub used_memory: usize,
    /// Total read operations
    pub reads: u64,
    /// Total write operations
    pub writes: u64,
    /// Total keys removed by expiry
    pub expired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn keyspace_with_clock() -> (Keyspace, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let keyspace = Keyspace::with_clock(KeyspaceConfig::default(), clock.clone());
        (keyspace, clock)
    }

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_delete_counts_existing_only() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key1"), b("v1"), None);
        keyspace.set(b("key2"), b("v2"), None);

        assert_eq!(keyspace.delete(&[b("key1"), b("key2"), b("key3")]), 2);
        assert_eq!(keyspace.delete(&[b("key1")]), 0);
        assert!(keyspace.is_empty());
    }

    #[test]
    fn test_exists_batch() {
        let keyspace = Keyspace::new();
        keyspace.set(b("a"), b("1"), None);
        keyspace.rpush(b("b"), vec![b("x")]).unwrap();

        assert_eq!(keyspace.exists(&[b("a"), b("b"), b("c")]), 2);
        assert_eq!(keyspace.exists(&[b("a"), b("a")]), 2);
        assert_eq!(keyspace.exists(&[b("nonexistent")]), 0);
    }

    #[test]
    fn test_ttl_window_passive() {
        let (keyspace, clock) = keyspace_with_clock();
        keyspace.set(b("k"), b("v"), Some(Duration::from_secs(10)));

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(keyspace.exists(&[b("k")]), 1);

        clock.advance(Duration::from_millis(1));
        assert_eq!(keyspace.exists(&[b("k")]), 0);
        assert_eq!(keyspace.get(b"k").unwrap(), None);
        assert_eq!(keyspace.len(), 0);
    }

    #[test]
    fn test_ttl_window_active() {
        let (keyspace, clock) = keyspace_with_clock();
        keyspace.set(b("k"), b("v"), Some(Duration::from_secs(10)));
        keyspace.set(b("forever"), b("v"), None);

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(keyspace.sweep_expired(16), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(keyspace.sweep_expired(16), 1);
        assert_eq!(keyspace.len(), 1);
        assert_eq!(keyspace.stats().expired, 1);
    }

    #[test]
    fn test_ttl_markers() {
        let (keyspace, clock) = keyspace_with_clock();

        assert_eq!(keyspace.ttl(b"missing"), Ttl::Missing);
        assert_eq!(keyspace.ttl(b"missing").as_secs(), -2);

        keyspace.set(b("persistent"), b("v"), None);
        assert_eq!(keyspace.ttl(b"persistent"), Ttl::Persistent);
        assert_eq!(keyspace.ttl(b"persistent").as_millis(), -1);

        keyspace.set(b("expiring"), b("v"), Some(Duration::from_secs(100)));
        assert_eq!(keyspace.ttl(b"expiring").as_secs(), 100);

        clock.advance(Duration::from_millis(99_500));
        // Rounded up: never reports 0 while still alive
        assert_eq!(keyspace.ttl(b"expiring").as_secs(), 1);
        assert_eq!(keyspace.ttl(b"expiring").as_millis(), 500);

        clock.advance(Duration::from_millis(500));
        assert_eq!(keyspace.ttl(b"expiring"), Ttl::Missing);
    }

    #[test]
    fn test_expire_and_persist() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key"), b("value"), None);

        assert!(!keyspace.persist(b"key"));
        assert!(keyspace.expire(b"key", Duration::from_secs(60)));
        assert!(keyspace.ttl(b"key").as_secs() > 0);

        assert!(keyspace.persist(b"key"));
        assert_eq!(keyspace.ttl(b"key"), Ttl::Persistent);

        // Idempotent after the first call
        assert!(!keyspace.persist(b"key"));
        assert!(!keyspace.persist(b"key"));
        assert_eq!(keyspace.ttl(b"key"), Ttl::Persistent);
        assert_eq!(keyspace.volatile_len(), 0);

        assert!(!keyspace.expire(b"missing", Duration::from_secs(1)));
    }

    #[test]
    fn test_expire_zero_deletes() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key"), b("value"), None);
        assert!(keyspace.expire(b"key", Duration::ZERO));
        assert_eq!(keyspace.exists(&[b("key")]), 0);
    }

    #[test]
    fn test_expire_at() {
        let (keyspace, clock) = keyspace_with_clock();
        keyspace.set(b("key"), b("value"), None);

        let at = clock.wall() + Duration::from_secs(30);
        assert!(keyspace.expire_at(b"key", at));
        assert_eq!(keyspace.ttl(b"key").as_secs(), 30);

        clock.advance(Duration::from_secs(30));
        assert_eq!(keyspace.exists(&[b("key")]), 0);

        keyspace.set(b("old"), b("value"), None);
        let past = clock.wall() - Duration::from_secs(1);
        assert!(keyspace.expire_at(b"old", past));
        assert_eq!(keyspace.exists(&[b("old")]), 0);
    }

    #[test]
    fn test_rename_moves_value_and_ttl() {
        let (keyspace, _clock) = keyspace_with_clock();
        keyspace.set(b("old_name"), b("old_value"), Some(Duration::from_secs(50)));
        keyspace.set(b("new_name"), b("doomed"), None);

        assert!(keyspace.rename(b"old_name", b("new_name"), true).unwrap());

        assert_eq!(keyspace.get(b"new_name").unwrap(), Some(b("old_value")));
        assert_eq!(keyspace.exists(&[b("old_name")]), 0);
        assert_eq!(keyspace.ttl(b"new_name").as_secs(), 50);
        assert_eq!(keyspace.volatile_len(), 1);
    }

    #[test]
    fn test_rename_missing_source() {
        let keyspace = Keyspace::new();
        assert_eq!(
            keyspace.rename(b"nope", b("dst"), true),
            Err(StoreError::NoSuchKey)
        );
    }

    #[test]
    fn test_renamenx() {
        let keyspace = Keyspace::new();
        keyspace.set(b("source"), b("source_value"), None);
        keyspace.set(b("new_name"), b("taken"), None);

        assert!(!keyspace.rename(b"source", b("new_name"), false).unwrap());
        assert_eq!(keyspace.get(b"source").unwrap(), Some(b("source_value")));
        assert_eq!(keyspace.get(b"new_name").unwrap(), Some(b("taken")));

        assert!(keyspace.rename(b"source", b("unique_name"), false).unwrap());
        assert_eq!(keyspace.get(b"unique_name").unwrap(), Some(b("source_value")));
    }

    #[test]
    fn test_rename_destination_ttl_discarded() {
        let keyspace = Keyspace::new();
        keyspace.set(b("src"), b("v"), None);
        keyspace.set(b("dst"), b("old"), Some(Duration::from_secs(5)));

        keyspace.rename(b"src", b("dst"), true).unwrap();
        assert_eq!(keyspace.ttl(b"dst"), Ttl::Persistent);
        assert_eq!(keyspace.volatile_len(), 0);
    }

    #[test]
    fn test_key_type() {
        let keyspace = Keyspace::new();
        keyspace.set(b("s"), b("v"), None);
        keyspace.rpush(b("l"), vec![b("a")]).unwrap();
        keyspace.sadd(b("st"), vec![b("a")]).unwrap();
        keyspace.hset(b("h"), vec![(b("f"), b("v"))]).unwrap();
        keyspace.zadd(b("z"), vec![(1.0, b("m"))]).unwrap();

        assert_eq!(keyspace.key_type(b"s"), Some(ValueKind::String));
        assert_eq!(keyspace.key_type(b"l"), Some(ValueKind::List));
        assert_eq!(keyspace.key_type(b"st"), Some(ValueKind::Set));
        assert_eq!(keyspace.key_type(b"h"), Some(ValueKind::Hash));
        assert_eq!(keyspace.key_type(b"z"), Some(ValueKind::SortedSet));
        assert_eq!(keyspace.key_type(b"none"), None);
    }

    #[test]
    fn test_keys_pattern() {
        let keyspace = Keyspace::new();
        keyspace.set(b("hello"), b("1"), None);
        keyspace.set(b("hallo"), b("2"), None);
        keyspace.set(b("hxllo"), b("3"), None);
        keyspace.set(b("world"), b("4"), None);

        assert_eq!(keyspace.keys(b"*").len(), 4);
        assert_eq!(keyspace.keys(b"h*llo").len(), 3);

        let mut matched = keyspace.keys(b"h[ae]llo");
        matched.sort();
        assert_eq!(matched, vec![b("hallo"), b("hello")]);
    }

    #[test]
    fn test_keys_skips_expired() {
        let (keyspace, clock) = keyspace_with_clock();
        keyspace.set(b("a"), b("1"), Some(Duration::from_secs(1)));
        keyspace.set(b("b"), b("1"), None);
        clock.advance(Duration::from_secs(2));
        assert_eq!(keyspace.keys(b"*"), vec![b("b")]);
    }

    #[test]
    fn test_sweep_respects_batches() {
        let (keyspace, clock) = keyspace_with_clock();
        for i in 0..100 {
            keyspace.set(
                Bytes::from(format!("k{}", i)),
                b("v"),
                Some(Duration::from_secs(1)),
            );
        }
        clock.advance(Duration::from_secs(1));
        assert_eq!(keyspace.sweep_expired(3), 100);
        assert!(keyspace.is_empty());
    }

    #[test]
    fn test_flush() {
        let keyspace = Keyspace::new();
        keyspace.set(b("key1"), b("value1"), Some(Duration::from_secs(5)));
        keyspace.set(b("key2"), b("value2"), None);

        keyspace.flush();

        assert!(keyspace.is_empty());
        assert_eq!(keyspace.volatile_len(), 0);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let keyspace = Arc::new(Keyspace::new());
        let mut handles = vec![];

        for i in 0..10 {
            let keyspace = Arc::clone(&keyspace);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = Bytes::from(format!("key-{}-{}", i, j));
                    keyspace.set(key.clone(), Bytes::from("value"), None);
                    keyspace.get(&key).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(keyspace.len(), 1000);
    }

    #[test]
    fn test_concurrent_cross_shard_moves_do_not_deadlock() {
        use std::thread;

        let keyspace = Arc::new(Keyspace::new());
        keyspace
            .rpush(b("left"), (0..500).map(|i| Bytes::from(i.to_string())).collect())
            .unwrap();
        keyspace
            .rpush(b("right"), (500..1000).map(|i| Bytes::from(i.to_string())).collect())
            .unwrap();

        let a = {
            let keyspace = Arc::clone(&keyspace);
            thread::spawn(move || {
                for _ in 0..400 {
                    keyspace.rpoplpush(b"left", b("right")).unwrap();
                }
            })
        };
        let c = {
            let keyspace = Arc::clone(&keyspace);
            thread::spawn(move || {
                for _ in 0..400 {
                    keyspace.rpoplpush(b"right", b("left")).unwrap();
                }
            })
        };
        a.join().unwrap();
        c.join().unwrap();

        let total = keyspace.llen(b"left").unwrap() + keyspace.llen(b"right").unwrap();
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(0, -1, 5), Some((0, 4)));
        assert_eq!(normalize_range(1, 3, 5), Some((1, 3)));
        assert_eq!(normalize_range(-100, 100, 5), Some((0, 4)));
        assert_eq!(normalize_range(3, 1, 5), None);
        assert_eq!(normalize_range(5, 10, 5), None);
        assert_eq!(normalize_range(0, -6, 5), None);
        assert_eq!(normalize_range(0, -1, 0), None);
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }

    #[test]
    fn test_stats() {
        let keyspace = Keyspace::new();
        keyspace.set(b("a"), b("12345"), Some(Duration::from_secs(10)));
        keyspace.get(b"a").unwrap();

        let stats = keyspace.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.volatile_keys, 1);
        assert_eq!(stats.used_memory, 6);
        assert!(stats.reads >= 1);
        assert!(stats.writes >= 1);
    }
}
