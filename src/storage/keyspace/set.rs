//! Set engine: unordered collections of unique strings.
//!
//! Commands returning several members sort them by bytes. Random sampling
//! (`SPOP`, `SRANDMEMBER`) draws from the sorted members too, so a seeded
//! keyspace reproduces its picks exactly.

use super::Keyspace;
use crate::error::Result;
use crate::storage::value::{Value, ValueKind};
use bytes::Bytes;
use rand::seq::SliceRandom;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Inter,
    Diff,
}

/// Applies `op` left to right. Missing sets count as empty.
fn combine(op: SetOp, sets: &[Option<&HashSet<Bytes>>]) -> HashSet<Bytes> {
    let empty = HashSet::new();
    let mut iter = sets.iter().map(|s| s.unwrap_or(&empty));
    let Some(first) = iter.next() else {
        return HashSet::new();
    };

    let mut acc = first.clone();
    match op {
        SetOp::Union => {
            for set in iter {
                acc.extend(set.iter().cloned());
            }
        }
        SetOp::Inter => {
            for set in iter {
                acc.retain(|m| set.contains(m));
            }
        }
        SetOp::Diff => {
            for set in iter {
                acc.retain(|m| !set.contains(m));
            }
        }
    }
    acc
}

fn sorted(members: impl IntoIterator<Item = Bytes>) -> Vec<Bytes> {
    let mut members: Vec<Bytes> = members.into_iter().collect();
    members.sort_unstable();
    members
}

impl Keyspace {
    /// Adds members. Returns how many were not already present.
    pub fn sadd(&self, key: Bytes, members: Vec<Bytes>) -> Result<usize> {
        self.write(&key.clone(), |shard| {
            let set = shard.get_or_create_as(&key, ValueKind::Set, Value::as_set_mut)?;
            let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
            shard.remove_if_empty(&key);
            Ok(added)
        })
    }

    /// Removes members. Returns how many were present.
    pub fn srem(&self, key: &[u8], members: &[Bytes]) -> Result<usize> {
        self.write(key, |shard| {
            let Some(set) = shard.get_mut_as(key, Value::as_set_mut)? else {
                return Ok(0);
            };
            let removed = members.iter().filter(|m| set.remove(*m)).count();
            shard.remove_if_empty(key);
            Ok(removed)
        })
    }

    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        let members = self.read_as(key, Value::as_set, |set| sorted(set.iter().cloned()))?;
        Ok(members.unwrap_or_default())
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        Ok(self
            .read_as(key, Value::as_set, |set| set.contains(member))?
            .unwrap_or(false))
    }

    pub fn scard(&self, key: &[u8]) -> Result<usize> {
        Ok(self.read_as(key, Value::as_set, HashSet::len)?.unwrap_or(0))
    }

    /// Removes and returns one random member.
    pub fn spop(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.spop_count(key, 1)?.pop())
    }

    /// Removes and returns up to `count` distinct random members.
    pub fn spop_count(&self, key: &[u8], count: usize) -> Result<Vec<Bytes>> {
        self.write(key, |shard| {
            let Some(set) = shard.get_mut_as(key, Value::as_set_mut)? else {
                return Ok(Vec::new());
            };
            let candidates = sorted(set.iter().cloned());
            let picked: Vec<Bytes> = candidates
                .choose_multiple(&mut *self.rng(), count)
                .cloned()
                .collect();
            for member in &picked {
                set.remove(member);
            }
            shard.remove_if_empty(key);
            Ok(picked)
        })
    }

    /// Returns one random member without removing it.
    pub fn srandmember(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.srandmember_count(key, 1)?.pop())
    }

    /// Returns random members without removing them.
    ///
    /// A positive `count` yields up to `count` distinct members; a negative
    /// one yields exactly `|count|` draws that may repeat.
    pub fn srandmember_count(&self, key: &[u8], count: i64) -> Result<Vec<Bytes>> {
        let picked = self.read_as(key, Value::as_set, |set| {
            let candidates = sorted(set.iter().cloned());
            let mut rng = self.rng();
            if count >= 0 {
                let n = usize::try_from(count).unwrap_or(usize::MAX);
                candidates
                    .choose_multiple(&mut *rng, n)
                    .cloned()
                    .collect()
            } else {
                (0..count.unsigned_abs())
                    .filter_map(|_| candidates.choose(&mut *rng).cloned())
                    .collect()
            }
        })?;
        Ok(picked.unwrap_or_default())
    }

    fn set_op(&self, op: SetOp, keys: &[Bytes]) -> Result<Vec<Bytes>> {
        self.read_many(keys, |view| {
            let sets = keys
                .iter()
                .map(|k| view.get_as(k, Value::as_set))
                .collect::<Result<Vec<_>>>()?;
            Ok(sorted(combine(op, &sets)))
        })
    }

    fn set_op_store(&self, op: SetOp, dst: Bytes, keys: &[Bytes]) -> Result<usize> {
        let mut locked: Vec<&[u8]> = keys.iter().map(|k| k.as_ref()).collect();
        locked.push(dst.as_ref());

        self.write_many(&locked, |set| {
            let result = {
                let sets = keys
                    .iter()
                    .map(|k| set.shard_ref(k).get_as(k, Value::as_set))
                    .collect::<Result<Vec<_>>>()?;
                combine(op, &sets)
            };

            let len = result.len();
            let shard = set.shard(&dst);
            if result.is_empty() {
                shard.remove(&dst);
            } else {
                shard.insert(dst.clone(), Value::Set(result), None);
            }
            Ok(len)
        })
    }

    /// Members in any of `keys`.
    pub fn sunion(&self, keys: &[Bytes]) -> Result<Vec<Bytes>> {
        self.set_op(SetOp::Union, keys)
    }

    /// Members in every one of `keys`.
    pub fn sinter(&self, keys: &[Bytes]) -> Result<Vec<Bytes>> {
        self.set_op(SetOp::Inter, keys)
    }

    /// Members of the first set that are in none of the others.
    pub fn sdiff(&self, keys: &[Bytes]) -> Result<Vec<Bytes>> {
        self.set_op(SetOp::Diff, keys)
    }

    /// Stores the union in `dst`, replacing it. Returns the cardinality.
    pub fn sunionstore(&self, dst: Bytes, keys: &[Bytes]) -> Result<usize> {
        self.set_op_store(SetOp::Union, dst, keys)
    }

    pub fn sinterstore(&self, dst: Bytes, keys: &[Bytes]) -> Result<usize> {
        self.set_op_store(SetOp::Inter, dst, keys)
    }

    pub fn sdiffstore(&self, dst: Bytes, keys: &[Bytes]) -> Result<usize> {
        self.set_op_store(SetOp::Diff, dst, keys)
    }

    /// Atomically moves `member` from `src` to `dst`.
    ///
    /// Returns `false` (and touches nothing) if `member` is not in `src`.
    pub fn smove(&self, src: &[u8], dst: Bytes, member: &[u8]) -> Result<bool> {
        let keys = [src, dst.as_ref()];
        self.write_many(&keys, |set| {
            set.shard(&dst).expect_kind(&dst, ValueKind::Set)?;

            let Some(source) = set.shard(src).get_mut_as(src, Value::as_set_mut)? else {
                return Ok(false);
            };
            if src == dst.as_ref() {
                return Ok(source.contains(member));
            }
            let Some(member) = source.take(member) else {
                return Ok(false);
            };

            set.shard(src).remove_if_empty(src);
            set.shard(&dst)
                .get_or_create_as(&dst, ValueKind::Set, Value::as_set_mut)?
                .insert(member);
            Ok(true)
        })
    }
}
