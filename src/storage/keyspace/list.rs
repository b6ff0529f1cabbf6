//! List engine: double-ended sequences of strings.
//!
//! Indices are zero-based from the head; negative indices count back from
//! the tail (`-1` is the last element).
//!
//! `BLPOP` / `BRPOP` park on the keyspace's waiter queues and are woken by
//! any command that pushes onto one of their keys.

use super::{normalize_index, normalize_range, Keyspace};
use crate::error::{Result, StoreError};
use crate::storage::value::{Value, ValueKind};
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

impl Keyspace {
    fn push(&self, key: Bytes, values: Vec<Bytes>, end: End) -> Result<usize> {
        let len = self.write(&key.clone(), |shard| {
            let list = shard.get_or_create_as(&key, ValueKind::List, Value::as_list_mut)?;
            for value in values {
                match end {
                    End::Head => list.push_front(value),
                    End::Tail => list.push_back(value),
                }
            }
            let len = list.len();
            shard.remove_if_empty(&key);
            Ok(len)
        })?;

        if len > 0 {
            self.waiters().wake(&key);
        }
        Ok(len)
    }

    fn pop(&self, key: &[u8], end: End, count: usize) -> Result<Option<Vec<Bytes>>> {
        self.write(key, |shard| {
            let Some(list) = shard.get_mut_as(key, Value::as_list_mut)? else {
                return Ok(None);
            };
            let n = count.min(list.len());
            let popped: Vec<Bytes> = match end {
                End::Head => list.drain(..n).collect(),
                End::Tail => (0..n).filter_map(|_| list.pop_back()).collect(),
            };
            shard.remove_if_empty(key);
            Ok(Some(popped))
        })
    }

    /// Pushes values onto the head, one at a time, so `LPUSH k a b c` leaves
    /// `[c, b, a]`. Returns the new length.
    pub fn lpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize> {
        self.push(key, values, End::Head)
    }

    /// Pushes values onto the tail. Returns the new length.
    pub fn rpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize> {
        self.push(key, values, End::Tail)
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.pop(key, End::Head, 1)?.and_then(|mut v| v.pop()))
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.pop(key, End::Tail, 1)?.and_then(|mut v| v.pop()))
    }

    /// Pops up to `count` elements from the head. `None` if the key is
    /// missing.
    pub fn lpop_count(&self, key: &[u8], count: usize) -> Result<Option<Vec<Bytes>>> {
        self.pop(key, End::Head, count)
    }

    /// Pops up to `count` elements from the tail, tail first.
    pub fn rpop_count(&self, key: &[u8], count: usize) -> Result<Option<Vec<Bytes>>> {
        self.pop(key, End::Tail, count)
    }

    pub fn llen(&self, key: &[u8]) -> Result<usize> {
        Ok(self.read_as(key, Value::as_list, VecDeque::len)?.unwrap_or(0))
    }

    /// Elements from `start` to `stop`, inclusive. Out-of-range ends are
    /// clamped; a reversed range is empty.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>> {
        let items = self.read_as(key, Value::as_list, |list| {
            match normalize_range(start, stop, list.len()) {
                Some((start, stop)) => list.range(start..=stop).cloned().collect(),
                None => Vec::new(),
            }
        })?;
        Ok(items.unwrap_or_default())
    }

    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>> {
        let item = self.read_as(key, Value::as_list, |list| {
            normalize_index(index, list.len()).and_then(|i| list.get(i).cloned())
        })?;
        Ok(item.flatten())
    }

    /// Inserts `value` next to the first occurrence of `pivot`.
    ///
    /// Returns the new length, `-1` if the pivot is absent, `0` if the key
    /// is missing.
    pub fn linsert(&self, key: &[u8], before: bool, pivot: &[u8], value: Bytes) -> Result<i64> {
        self.write(key, |shard| {
            let Some(list) = shard.get_mut_as(key, Value::as_list_mut)? else {
                return Ok(0);
            };
            let Some(pos) = list.iter().position(|item| item.as_ref() == pivot) else {
                return Ok(-1);
            };
            let at = if before { pos } else { pos + 1 };
            list.insert(at, value);
            Ok(list.len() as i64)
        })
    }

    /// Removes occurrences of `value`: the first `count` from the head when
    /// `count > 0`, the last `|count|` from the tail when `count < 0`, all of
    /// them when `count == 0`.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize> {
        self.write(key, |shard| {
            let Some(list) = shard.get_mut_as(key, Value::as_list_mut)? else {
                return Ok(0);
            };

            let limit = match count {
                0 => usize::MAX,
                n => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
            };
            let mut positions: Vec<usize> = list
                .iter()
                .enumerate()
                .filter(|(_, item)| item.as_ref() == value)
                .map(|(i, _)| i)
                .collect();
            if count < 0 {
                positions.reverse();
            }
            positions.truncate(limit);
            positions.sort_unstable();

            for pos in positions.iter().rev() {
                list.remove(*pos);
            }
            shard.remove_if_empty(key);
            Ok(positions.len())
        })
    }

    /// Overwrites the element at `index`.
    pub fn lset(&self, key: &[u8], index: i64, value: Bytes) -> Result<()> {
        self.write(key, |shard| {
            let list = shard
                .get_mut_as(key, Value::as_list_mut)?
                .ok_or(StoreError::NoSuchKey)?;
            let idx = normalize_index(index, list.len()).ok_or(StoreError::IndexOutOfRange)?;
            list[idx] = value;
            Ok(())
        })
    }

    /// Keeps only the elements from `start` to `stop`, inclusive. An empty
    /// result deletes the key.
    pub fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<()> {
        self.write(key, |shard| {
            let Some(list) = shard.get_mut_as(key, Value::as_list_mut)? else {
                return Ok(());
            };
            match normalize_range(start, stop, list.len()) {
                Some((start, stop)) => {
                    list.truncate(stop + 1);
                    list.drain(..start);
                }
                None => list.clear(),
            }
            shard.remove_if_empty(key);
            Ok(())
        })
    }

    /// Atomically pops the tail of `src` and pushes it onto the head of
    /// `dst`. With `src == dst` this rotates the list.
    pub fn rpoplpush(&self, src: &[u8], dst: Bytes) -> Result<Option<Bytes>> {
        let keys = [src, dst.as_ref()];
        let moved = self.write_many(&keys, |set| {
            set.shard(&dst).expect_kind(&dst, ValueKind::List)?;

            let Some(list) = set.shard(src).get_mut_as(src, Value::as_list_mut)? else {
                return Ok(None);
            };
            let Some(item) = list.pop_back() else {
                return Ok(None);
            };

            set.shard(&dst)
                .get_or_create_as(&dst, ValueKind::List, Value::as_list_mut)?
                .push_front(item.clone());
            set.shard(src).remove_if_empty(src);
            Ok(Some(item))
        })?;

        if moved.is_some() {
            self.waiters().wake(&dst);
        }
        Ok(moved)
    }

    /// Pops the head of the first non-empty list among `keys`, waiting up to
    /// `timeout` for one to be pushed (`None` waits forever).
    ///
    /// Returns `(key, element)`, or `None` on timeout.
    pub async fn blpop(
        &self,
        keys: &[Bytes],
        timeout: Option<Duration>,
    ) -> Result<Option<(Bytes, Bytes)>> {
        self.blocking_pop(keys, timeout, End::Head).await
    }

    /// Tail-popping counterpart of [`Keyspace::blpop`].
    pub async fn brpop(
        &self,
        keys: &[Bytes],
        timeout: Option<Duration>,
    ) -> Result<Option<(Bytes, Bytes)>> {
        self.blocking_pop(keys, timeout, End::Tail).await
    }

    fn pop_first(&self, keys: &[Bytes], end: End) -> Result<Option<(Bytes, Bytes)>> {
        for key in keys {
            if let Some(item) = self.pop(key, end, 1)?.and_then(|mut v| v.pop()) {
                return Ok(Some((key.clone(), item)));
            }
        }
        Ok(None)
    }

    async fn blocking_pop(
        &self,
        keys: &[Bytes],
        timeout: Option<Duration>,
        end: End,
    ) -> Result<Option<(Bytes, Bytes)>> {
        // A deadline past what `Instant` can hold is the same as none.
        let deadline = timeout.and_then(|t| tokio::time::Instant::now().checked_add(t));

        // Register before the first attempt so a push racing with it still
        // leaves a wake-up permit behind.
        let guard = self.waiters().register(keys);

        loop {
            if let Some(hit) = self.pop_first(keys, end)? {
                return Ok(Some(hit));
            }

            let notified = guard.notified();
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        debug!(keys = keys.len(), "blocking pop timed out");
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
            debug!("blocking pop woken by push");
        }
    }
}
