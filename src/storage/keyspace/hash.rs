//! Hash engine: field/value maps under a single key.
//!
//! Listing commands (`HGETALL`, `HKEYS`, `HVALS`) return fields in byte
//! order so their output does not depend on hash iteration order.

use super::string::{format_float, parse_float, parse_int};
use super::Keyspace;
use crate::error::{Result, StoreError};
use crate::storage::value::{Value, ValueKind};
use bytes::Bytes;
use std::collections::HashMap;

fn sorted_pairs(hash: &HashMap<Bytes, Bytes>) -> Vec<(Bytes, Bytes)> {
    let mut pairs: Vec<(Bytes, Bytes)> = hash
        .iter()
        .map(|(f, v)| (f.clone(), v.clone()))
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    pairs
}

impl Keyspace {
    /// Sets fields. Returns how many fields were new.
    pub fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> Result<usize> {
        self.write(&key.clone(), |shard| {
            let hash = shard.get_or_create_as(&key, ValueKind::Hash, Value::as_hash_mut)?;
            let added = pairs
                .into_iter()
                .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                .count();
            shard.remove_if_empty(&key);
            Ok(added)
        })
    }

    /// Sets `field` only if it does not exist yet.
    pub fn hsetnx(&self, key: Bytes, field: Bytes, value: Bytes) -> Result<bool> {
        self.write(&key.clone(), |shard| {
            let hash = shard.get_or_create_as(&key, ValueKind::Hash, Value::as_hash_mut)?;
            if hash.contains_key(&field) {
                return Ok(false);
            }
            hash.insert(field, value);
            Ok(true)
        })
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>> {
        Ok(self
            .read_as(key, Value::as_hash, |hash| hash.get(field).cloned())?
            .flatten())
    }

    /// Returns values for `fields`, aligned with the input.
    pub fn hmget(&self, key: &[u8], fields: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        let values = self.read_as(key, Value::as_hash, |hash| {
            fields.iter().map(|f| hash.get(f).cloned()).collect()
        })?;
        Ok(values.unwrap_or_else(|| vec![None; fields.len()]))
    }

    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        Ok(self.read_as(key, Value::as_hash, sorted_pairs)?.unwrap_or_default())
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self.hgetall(key)?.into_iter().map(|(f, _)| f).collect())
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self.hgetall(key)?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        Ok(self
            .read_as(key, Value::as_hash, |hash| hash.contains_key(field))?
            .unwrap_or(false))
    }

    pub fn hlen(&self, key: &[u8]) -> Result<usize> {
        Ok(self.read_as(key, Value::as_hash, HashMap::len)?.unwrap_or(0))
    }

    /// Removes fields. Returns how many existed. Removing the last field
    /// deletes the key.
    pub fn hdel(&self, key: &[u8], fields: &[Bytes]) -> Result<usize> {
        self.write(key, |shard| {
            let Some(hash) = shard.get_mut_as(key, Value::as_hash_mut)? else {
                return Ok(0);
            };
            let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
            shard.remove_if_empty(key);
            Ok(removed)
        })
    }

    /// Adds `delta` to the integer in `field` (missing counts as 0).
    ///
    /// Fails with `NotAnInteger` if the field holds other text; the field is
    /// left untouched.
    pub fn hincrby(&self, key: Bytes, field: Bytes, delta: i64) -> Result<i64> {
        self.write(&key.clone(), |shard| {
            let current = match shard.get_as(&key, Value::as_hash)? {
                Some(hash) => hash.get(&field).map(|v| parse_int(v)).transpose()?,
                None => None,
            };
            let next = current
                .unwrap_or(0)
                .checked_add(delta)
                .ok_or(StoreError::Overflow)?;

            let hash = shard.get_or_create_as(&key, ValueKind::Hash, Value::as_hash_mut)?;
            hash.insert(field, Bytes::from(next.to_string()));
            Ok(next)
        })
    }

    /// Adds `delta` to the float in `field` (missing counts as 0).
    pub fn hincrbyfloat(&self, key: Bytes, field: Bytes, delta: f64) -> Result<f64> {
        self.write(&key.clone(), |shard| {
            let current = match shard.get_as(&key, Value::as_hash)? {
                Some(hash) => hash.get(&field).map(|v| parse_float(v)).transpose()?,
                None => None,
            };
            let next = current.unwrap_or(0.0) + delta;
            if !next.is_finite() {
                return Err(StoreError::NanResult);
            }

            let hash = shard.get_or_create_as(&key, ValueKind::Hash, Value::as_hash_mut)?;
            hash.insert(field, format_float(next));
            Ok(next)
        })
    }
}
