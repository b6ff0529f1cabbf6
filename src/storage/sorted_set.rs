//! Sorted Set
//!
//! Members are kept in two structures that are always updated together:
//!
//! ```text
//! scores:  HashMap<member, score>            O(1) ZSCORE / membership
//! ordered: BTreeSet<(score, member)>         ordered iteration, ranges, ranks
//! ```
//!
//! The BTreeSet key is the pair `(score, member)`, which gives the total order
//! the rank and range commands need: score ascending, ties broken by member
//! bytes. `OrderedFloat` supplies `Ord` for the score; NaN is rejected before
//! it ever reaches the set.

use crate::error::{Result, StoreError};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Outcome of inserting a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The member was new
    Added,
    /// The member existed with a different score
    Updated,
    /// The member existed with the same score
    Unchanged,
}

/// A set of unique members ordered by `(score, member)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    scores: HashMap<Bytes, f64>,
    ordered: BTreeSet<(OrderedFloat<f64>, Bytes)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Inserts or re-scores a member. The score must not be NaN.
    pub fn insert(&mut self, member: Bytes, score: f64) -> Insertion {
        debug_assert!(!score.is_nan());
        match self.scores.insert(member.clone(), score) {
            Some(old) if old == score => Insertion::Unchanged,
            Some(old) => {
                self.ordered.remove(&(OrderedFloat(old), member.clone()));
                self.ordered.insert((OrderedFloat(score), member));
                Insertion::Updated
            }
            None => {
                self.ordered.insert((OrderedFloat(score), member));
                Insertion::Added
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.ordered.remove(&(OrderedFloat(score), member));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Zero-based position in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let (member, score) = self.scores.get_key_value(member)?;
        Some(
            self.ordered
                .range(..(OrderedFloat(*score), member.clone()))
                .count(),
        )
    }

    /// Iterates members in ascending `(score, member)` order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Bytes, f64)> + '_ {
        self.ordered.iter().map(|(score, member)| (member, score.0))
    }

    /// Members whose positions fall in `[start, stop]` (already normalized),
    /// in ascending order.
    pub fn slice(&self, start: usize, stop: usize) -> Vec<(Bytes, f64)> {
        self.iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(m, s)| (m.clone(), s))
            .collect()
    }

    /// Iterates members inside a score range, ascending.
    pub fn range_by_score<'a>(
        &'a self,
        range: &'a ScoreRange,
    ) -> impl Iterator<Item = (&'a Bytes, f64)> + 'a {
        // Bytes::new() sorts before every member, so this bound starts at the
        // first member holding the minimum score.
        let lower = Bound::Included((OrderedFloat(range.min.value), Bytes::new()));
        self.ordered
            .range((lower, Bound::Unbounded))
            .map(|(score, member)| (member, score.0))
            .skip_while(move |(_, score)| !range.min.admits_from_below(*score))
            .take_while(move |(_, score)| range.max.admits_from_above(*score))
    }

    pub fn count_in(&self, range: &ScoreRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        self.range_by_score(range).count()
    }

    /// Removes members at positions `[start, stop]` (already normalized).
    pub fn remove_slice(&mut self, start: usize, stop: usize) -> usize {
        let doomed: Vec<Bytes> = self
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(m, _)| m.clone())
            .collect();
        for member in &doomed {
            self.remove(member);
        }
        doomed.len()
    }

    pub fn remove_by_score(&mut self, range: &ScoreRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        let doomed: Vec<Bytes> = self
            .range_by_score(range)
            .map(|(m, _)| m.clone())
            .collect();
        for member in &doomed {
            self.remove(member);
        }
        doomed.len()
    }
}

/// One end of a score interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn inclusive(value: f64) -> Self {
        Self {
            value,
            exclusive: false,
        }
    }

    pub fn exclusive(value: f64) -> Self {
        Self {
            value,
            exclusive: true,
        }
    }

    /// Parses `1.5`, `(1.5`, `-inf`, `+inf`, `inf`.
    pub fn parse(text: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(text).map_err(|_| StoreError::InvalidScoreRange)?;
        let (exclusive, number) = match text.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let value = parse_score(number.as_bytes()).map_err(|_| StoreError::InvalidScoreRange)?;
        Ok(Self { value, exclusive })
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

/// A `[min, max]` score window, each end optionally exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: ScoreBound,
    pub max: ScoreBound,
}

impl ScoreRange {
    pub fn new(min: ScoreBound, max: ScoreBound) -> Self {
        Self { min, max }
    }

    /// The whole real line.
    pub fn all() -> Self {
        Self::new(
            ScoreBound::inclusive(f64::NEG_INFINITY),
            ScoreBound::inclusive(f64::INFINITY),
        )
    }

    pub fn parse(min: &[u8], max: &[u8]) -> Result<Self> {
        Ok(Self::new(ScoreBound::parse(min)?, ScoreBound::parse(max)?))
    }

    pub fn contains(&self, score: f64) -> bool {
        self.min.admits_from_below(score) && self.max.admits_from_above(score)
    }

    /// True when no score can satisfy both ends.
    pub fn is_empty(&self) -> bool {
        self.min.value > self.max.value
            || (self.min.value == self.max.value && (self.min.exclusive || self.max.exclusive))
    }
}

/// Parses a score, accepting `inf`, `+inf` and `-inf` in any case.
pub fn parse_score(text: &[u8]) -> Result<f64> {
    let text = std::str::from_utf8(text).map_err(|_| StoreError::NotAFloat)?;
    let value = match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        other => other.parse::<f64>().map_err(|_| StoreError::NotAFloat)?,
    };
    if value.is_nan() {
        return Err(StoreError::NotAFloat);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(pairs: &[(&'static str, f64)]) -> SortedSet {
        let mut z = SortedSet::new();
        for (m, s) in pairs {
            z.insert(Bytes::from(*m), *s);
        }
        z
    }

    fn members(items: Vec<(Bytes, f64)>) -> Vec<Bytes> {
        items.into_iter().map(|(m, _)| m).collect()
    }

    #[test]
    fn test_insert_outcomes() {
        let mut z = SortedSet::new();
        assert_eq!(z.insert(Bytes::from("a"), 1.0), Insertion::Added);
        assert_eq!(z.insert(Bytes::from("a"), 1.0), Insertion::Unchanged);
        assert_eq!(z.insert(Bytes::from("a"), 2.0), Insertion::Updated);
        assert_eq!(z.len(), 1);
        assert_eq!(z.score(b"a"), Some(2.0));
    }

    #[test]
    fn test_ties_order_by_member() {
        let z = zset(&[("c", 1.0), ("a", 1.0), ("b", 1.0), ("z", 0.5)]);
        let order: Vec<&Bytes> = z.iter().map(|(m, _)| m).collect();
        assert_eq!(order, vec!["z", "a", "b", "c"]);
        assert_eq!(z.rank(b"a"), Some(1));
        assert_eq!(z.rank(b"c"), Some(3));
        assert_eq!(z.rank(b"missing"), None);
    }

    #[test]
    fn test_rescore_moves_member() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0)]);
        z.insert(Bytes::from("a"), 6.0);
        assert_eq!(z.rank(b"a"), Some(1));
        assert_eq!(z.rank(b"b"), Some(0));
    }

    #[test]
    fn test_score_bound_parse() {
        assert_eq!(ScoreBound::parse(b"1.5").unwrap(), ScoreBound::inclusive(1.5));
        assert_eq!(ScoreBound::parse(b"(100").unwrap(), ScoreBound::exclusive(100.0));
        assert_eq!(
            ScoreBound::parse(b"-inf").unwrap(),
            ScoreBound::inclusive(f64::NEG_INFINITY)
        );
        assert_eq!(
            ScoreBound::parse(b"+inf").unwrap(),
            ScoreBound::inclusive(f64::INFINITY)
        );
        assert_eq!(
            ScoreBound::parse(b"abc"),
            Err(StoreError::InvalidScoreRange)
        );
        assert_eq!(ScoreBound::parse(b"(nan"), Err(StoreError::InvalidScoreRange));
    }

    #[test]
    fn test_range_by_score_bounds() {
        let z = zset(&[("p1", 100.0), ("p2", 150.0), ("p3", 75.0), ("p5", 125.0)]);

        let inclusive = ScoreRange::parse(b"100", b"150").unwrap();
        let hits: Vec<&Bytes> = z.range_by_score(&inclusive).map(|(m, _)| m).collect();
        assert_eq!(hits, vec!["p1", "p5", "p2"]);

        let exclusive = ScoreRange::parse(b"(100", b"(150").unwrap();
        assert_eq!(z.count_in(&exclusive), 1);

        let below = ScoreRange::parse(b"-inf", b"(100").unwrap();
        assert_eq!(z.count_in(&below), 1);

        let reversed = ScoreRange::parse(b"200", b"100").unwrap();
        assert!(reversed.is_empty());
        assert_eq!(z.count_in(&reversed), 0);
    }

    #[test]
    fn test_remove_slice_and_score() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        assert_eq!(z.remove_slice(0, 1), 2);
        assert_eq!(members(z.slice(0, 1)), vec!["c", "d"]);

        let range = ScoreRange::parse(b"(3", b"+inf").unwrap();
        assert_eq!(z.remove_by_score(&range), 1);
        assert_eq!(z.len(), 1);
        assert_eq!(z.score(b"c"), Some(3.0));
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(b"4.5").unwrap(), 4.5);
        assert_eq!(parse_score(b"INF").unwrap(), f64::INFINITY);
        assert!(parse_score(b"nan").is_err());
        assert!(parse_score(b"x1").is_err());
    }
}
