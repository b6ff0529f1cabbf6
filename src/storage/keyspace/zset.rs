//! Sorted set engine: members ordered by `(score, member)`.
//!
//! Range commands return `(member, score)` pairs; callers that only want
//! members drop the scores.

use super::string::SetCondition;
use super::{normalize_range, Keyspace};
use crate::error::{Result, StoreError};
use crate::storage::sorted_set::{Insertion, ScoreRange, SortedSet};
use crate::storage::value::{Value, ValueKind};
use bytes::Bytes;

/// Options accepted by [`Keyspace::zadd_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZaddOptions {
    /// `NX`: only add new members; `XX`: only update existing ones
    pub condition: Option<SetCondition>,
    /// `CH`: count updated members in the reply as well as added ones
    pub changed: bool,
}

fn owned(items: impl Iterator<Item = (Bytes, f64)>) -> Vec<(Bytes, f64)> {
    items.collect()
}

/// Applies `LIMIT offset count` to an iterator. `None` means no limit.
fn limited<I: Iterator>(iter: I, limit: Option<(usize, usize)>) -> impl Iterator<Item = I::Item> {
    let (offset, count) = limit.unwrap_or((0, usize::MAX));
    iter.skip(offset).take(count)
}

impl Keyspace {
    /// Adds members or updates their scores. Returns how many were added.
    pub fn zadd(&self, key: Bytes, pairs: Vec<(f64, Bytes)>) -> Result<usize> {
        self.zadd_with(key, ZaddOptions::default(), pairs)
    }

    /// `ZADD` with `NX` / `XX` / `CH`. NaN scores are rejected before any
    /// member is touched.
    pub fn zadd_with(
        &self,
        key: Bytes,
        options: ZaddOptions,
        pairs: Vec<(f64, Bytes)>,
    ) -> Result<usize> {
        if pairs.iter().any(|(score, _)| score.is_nan()) {
            return Err(StoreError::NotAFloat);
        }

        self.write(&key.clone(), |shard| {
            let zset = shard.get_or_create_as(&key, ValueKind::SortedSet, Value::as_sorted_set_mut)?;
            let mut added = 0;
            let mut updated = 0;

            for (score, member) in pairs {
                let exists = zset.score(&member).is_some();
                match options.condition {
                    Some(SetCondition::IfAbsent) if exists => continue,
                    Some(SetCondition::IfPresent) if !exists => continue,
                    _ => {}
                }
                match zset.insert(member, score) {
                    Insertion::Added => added += 1,
                    Insertion::Updated => updated += 1,
                    Insertion::Unchanged => {}
                }
            }

            shard.remove_if_empty(&key);
            Ok(if options.changed { added + updated } else { added })
        })
    }

    /// Adds `delta` to `member`'s score, creating it at `delta` if absent.
    pub fn zincrby(&self, key: Bytes, delta: f64, member: Bytes) -> Result<f64> {
        if delta.is_nan() {
            return Err(StoreError::NotAFloat);
        }
        self.write(&key.clone(), |shard| {
            let current = shard
                .get_as(&key, Value::as_sorted_set)?
                .and_then(|zset| zset.score(&member))
                .unwrap_or(0.0);
            let next = current + delta;
            if next.is_nan() {
                return Err(StoreError::NanResult);
            }
            shard
                .get_or_create_as(&key, ValueKind::SortedSet, Value::as_sorted_set_mut)?
                .insert(member, next);
            Ok(next)
        })
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        Ok(self
            .read_as(key, Value::as_sorted_set, |zset| zset.score(member))?
            .flatten())
    }

    pub fn zcard(&self, key: &[u8]) -> Result<usize> {
        Ok(self
            .read_as(key, Value::as_sorted_set, SortedSet::len)?
            .unwrap_or(0))
    }

    /// Zero-based rank in ascending order.
    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>> {
        Ok(self
            .read_as(key, Value::as_sorted_set, |zset| zset.rank(member))?
            .flatten())
    }

    /// Zero-based rank in descending order.
    pub fn zrevrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>> {
        Ok(self
            .read_as(key, Value::as_sorted_set, |zset| {
                zset.rank(member).map(|rank| zset.len() - 1 - rank)
            })?
            .flatten())
    }

    /// Members ranked `start..=stop` in ascending order, with scores.
    pub fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<(Bytes, f64)>> {
        let items = self.read_as(key, Value::as_sorted_set, |zset| {
            match normalize_range(start, stop, zset.len()) {
                Some((start, stop)) => zset.slice(start, stop),
                None => Vec::new(),
            }
        })?;
        Ok(items.unwrap_or_default())
    }

    /// Members ranked `start..=stop` counting from the highest score.
    pub fn zrevrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<(Bytes, f64)>> {
        let items = self.read_as(key, Value::as_sorted_set, |zset| {
            match normalize_range(start, stop, zset.len()) {
                Some((start, stop)) => owned(
                    zset.iter()
                        .rev()
                        .skip(start)
                        .take(stop - start + 1)
                        .map(|(m, s)| (m.clone(), s)),
                ),
                None => Vec::new(),
            }
        })?;
        Ok(items.unwrap_or_default())
    }

    /// Number of members with a score inside `range`.
    pub fn zcount(&self, key: &[u8], range: &ScoreRange) -> Result<usize> {
        Ok(self
            .read_as(key, Value::as_sorted_set, |zset| zset.count_in(range))?
            .unwrap_or(0))
    }

    /// Members with a score inside `range`, ascending, after applying
    /// `LIMIT offset count`.
    pub fn zrangebyscore(
        &self,
        key: &[u8],
        range: &ScoreRange,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(Bytes, f64)>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.read_as(key, Value::as_sorted_set, |zset| {
            owned(limited(
                zset.range_by_score(range).map(|(m, s)| (m.clone(), s)),
                limit,
            ))
        })?;
        Ok(items.unwrap_or_default())
    }

    /// Members with a score inside `range`, descending, after applying
    /// `LIMIT offset count`.
    pub fn zrevrangebyscore(
        &self,
        key: &[u8],
        range: &ScoreRange,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(Bytes, f64)>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.read_as(key, Value::as_sorted_set, |zset| {
            let mut hits = owned(zset.range_by_score(range).map(|(m, s)| (m.clone(), s)));
            hits.reverse();
            owned(limited(hits.into_iter(), limit))
        })?;
        Ok(items.unwrap_or_default())
    }

    /// Removes members. Returns how many existed.
    pub fn zrem(&self, key: &[u8], members: &[Bytes]) -> Result<usize> {
        self.write(key, |shard| {
            let Some(zset) = shard.get_mut_as(key, Value::as_sorted_set_mut)? else {
                return Ok(0);
            };
            let removed = members.iter().filter(|m| zset.remove(m)).count();
            shard.remove_if_empty(key);
            Ok(removed)
        })
    }

    /// Removes members ranked `start..=stop` (ascending).
    pub fn zremrangebyrank(&self, key: &[u8], start: i64, stop: i64) -> Result<usize> {
        self.write(key, |shard| {
            let Some(zset) = shard.get_mut_as(key, Value::as_sorted_set_mut)? else {
                return Ok(0);
            };
            let removed = match normalize_range(start, stop, zset.len()) {
                Some((start, stop)) => zset.remove_slice(start, stop),
                None => 0,
            };
            shard.remove_if_empty(key);
            Ok(removed)
        })
    }

    /// Removes members with a score inside `range`.
    pub fn zremrangebyscore(&self, key: &[u8], range: &ScoreRange) -> Result<usize> {
        self.write(key, |shard| {
            let Some(zset) = shard.get_mut_as(key, Value::as_sorted_set_mut)? else {
                return Ok(0);
            };
            let removed = zset.remove_by_score(range);
            shard.remove_if_empty(key);
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::storage::keyspace::{Keyspace, SetCondition, ZaddOptions};
    use crate::storage::sorted_set::ScoreRange;
    use bytes::Bytes;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn members(items: Vec<(Bytes, f64)>) -> Vec<Bytes> {
        items.into_iter().map(|(m, _)| m).collect()
    }

    fn bs(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| b(s)).collect()
    }

    fn leaderboard(keyspace: &Keyspace) {
        keyspace
            .zadd(
                b("leaderboard"),
                vec![
                    (100.0, b("player1")),
                    (150.0, b("player2")),
                    (75.0, b("player3")),
                    (200.0, b("player4")),
                    (125.0, b("player5")),
                ],
            )
            .unwrap();
    }

    fn range(min: &str, max: &str) -> ScoreRange {
        ScoreRange::parse(min.as_bytes(), max.as_bytes()).unwrap()
    }

    #[test]
    fn test_zadd_and_rank() {
        let keyspace = Keyspace::new();
        assert_eq!(keyspace.zadd(b("k"), vec![(1.0, b("a")), (2.0, b("b"))]).unwrap(), 2);
        assert_eq!(keyspace.zrank(b"k", b"b").unwrap(), Some(1));

        assert_eq!(keyspace.zincrby(b("k"), 5.0, b("a")).unwrap(), 6.0);
        assert_eq!(keyspace.zrank(b"k", b"a").unwrap(), Some(1));
        assert_eq!(keyspace.zrank(b"k", b"b").unwrap(), Some(0));
        assert_eq!(keyspace.zrank(b"k", b"zz").unwrap(), None);
    }

    #[test]
    fn test_zadd_updates_existing() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);
        assert_eq!(keyspace.zadd(b("leaderboard"), vec![(300.0, b("player3"))]).unwrap(), 0);
        assert_eq!(keyspace.zscore(b"leaderboard", b"player3").unwrap(), Some(300.0));
        assert_eq!(keyspace.zcard(b"leaderboard").unwrap(), 5);
    }

    #[test]
    fn test_zadd_options() {
        let keyspace = Keyspace::new();
        keyspace.zadd(b("k"), vec![(1.0, b("a"))]).unwrap();

        let nx = ZaddOptions {
            condition: Some(SetCondition::IfAbsent),
            ..Default::default()
        };
        assert_eq!(
            keyspace
                .zadd_with(b("k"), nx, vec![(9.0, b("a")), (2.0, b("b"))])
                .unwrap(),
            1
        );
        assert_eq!(keyspace.zscore(b"k", b"a").unwrap(), Some(1.0));

        let xx_ch = ZaddOptions {
            condition: Some(SetCondition::IfPresent),
            changed: true,
        };
        assert_eq!(
            keyspace
                .zadd_with(b("k"), xx_ch, vec![(5.0, b("a")), (3.0, b("c"))])
                .unwrap(),
            1
        );
        assert_eq!(keyspace.zscore(b"k", b"c").unwrap(), None);

        assert_eq!(
            keyspace.zadd_with(b("missing"), xx_ch, vec![(1.0, b("a"))]).unwrap(),
            0
        );
        assert_eq!(keyspace.exists(&[b("missing")]), 0);
    }

    #[test]
    fn test_zadd_rejects_nan() {
        let keyspace = Keyspace::new();
        assert_eq!(
            keyspace.zadd(b("k"), vec![(1.0, b("a")), (f64::NAN, b("b"))]),
            Err(StoreError::NotAFloat)
        );
        assert_eq!(keyspace.exists(&[b("k")]), 0);
    }

    #[test]
    fn test_zincrby_nan_result() {
        let keyspace = Keyspace::new();
        keyspace.zadd(b("k"), vec![(f64::INFINITY, b("a"))]).unwrap();
        assert_eq!(
            keyspace.zincrby(b("k"), f64::NEG_INFINITY, b("a")),
            Err(StoreError::NanResult)
        );
        assert_eq!(keyspace.zscore(b"k", b"a").unwrap(), Some(f64::INFINITY));
    }

    #[test]
    fn test_zincrby_creates_member() {
        let keyspace = Keyspace::new();
        assert_eq!(keyspace.zincrby(b("k"), 2.5, b("m")).unwrap(), 2.5);
        assert_eq!(keyspace.zcard(b"k").unwrap(), 1);
    }

    #[test]
    fn test_zrange_and_zrevrange() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);

        assert_eq!(
            members(keyspace.zrange(b"leaderboard", 0, -1).unwrap()),
            bs(&["player3", "player1", "player5", "player2", "player4"])
        );
        assert_eq!(
            keyspace.zrevrange(b"leaderboard", 0, 2).unwrap(),
            vec![
                (b("player4"), 200.0),
                (b("player2"), 150.0),
                (b("player5"), 125.0),
            ]
        );
        assert!(keyspace.zrange(b"leaderboard", 10, 20).unwrap().is_empty());
        assert!(keyspace.zrange(b"missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_zrevrank() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);
        assert_eq!(keyspace.zrevrank(b"leaderboard", b"player4").unwrap(), Some(0));
        assert_eq!(keyspace.zrevrank(b"leaderboard", b"player3").unwrap(), Some(4));
    }

    #[test]
    fn test_zcount_and_rangebyscore() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);

        assert_eq!(keyspace.zcount(b"leaderboard", &range("100", "+inf")).unwrap(), 4);
        assert_eq!(keyspace.zcount(b"leaderboard", &range("(100", "(200")).unwrap(), 2);

        assert_eq!(
            members(
                keyspace
                    .zrangebyscore(b"leaderboard", &range("100", "150"), None)
                    .unwrap()
            ),
            bs(&["player1", "player5", "player2"])
        );
        assert_eq!(
            members(
                keyspace
                    .zrangebyscore(b"leaderboard", &range("-inf", "+inf"), Some((1, 2)))
                    .unwrap()
            ),
            bs(&["player1", "player5"])
        );
        assert_eq!(
            members(
                keyspace
                    .zrevrangebyscore(b"leaderboard", &range("100", "200"), Some((0, 2)))
                    .unwrap()
            ),
            bs(&["player4", "player2"])
        );
        assert!(keyspace
            .zrangebyscore(b"leaderboard", &range("300", "100"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_zrem() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);
        assert_eq!(
            keyspace
                .zrem(b"leaderboard", &bs(&["player1", "nobody"]))
                .unwrap(),
            1
        );
        assert_eq!(keyspace.zcard(b"leaderboard").unwrap(), 4);
    }

    #[test]
    fn test_zremrangebyrank() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);
        assert_eq!(keyspace.zremrangebyrank(b"leaderboard", 0, 1).unwrap(), 2);
        assert_eq!(
            members(keyspace.zrange(b"leaderboard", 0, -1).unwrap()),
            bs(&["player5", "player2", "player4"])
        );
    }

    #[test]
    fn test_zremrangebyscore_empties_key() {
        let keyspace = Keyspace::new();
        leaderboard(&keyspace);
        assert_eq!(
            keyspace
                .zremrangebyscore(b"leaderboard", &range("-inf", "(100"))
                .unwrap(),
            1
        );
        assert_eq!(
            keyspace
                .zremrangebyscore(b"leaderboard", &range("-inf", "+inf"))
                .unwrap(),
            4
        );
        assert_eq!(keyspace.exists(&[b("leaderboard")]), 0);
    }

    #[test]
    fn test_zset_wrong_type() {
        let keyspace = Keyspace::new();
        keyspace.set(b("s"), b("v"), None);
        assert_eq!(keyspace.zadd(b("s"), vec![(1.0, b("a"))]), Err(StoreError::WrongType));
        assert_eq!(keyspace.zincrby(b("s"), 1.0, b("a")), Err(StoreError::WrongType));
        assert_eq!(keyspace.zrank(b"s", b"a"), Err(StoreError::WrongType));
    }
}
