//! Property tests for keyspace invariants.

use bytes::Bytes;
use polykv::clock::ManualClock;
use polykv::storage::{Keyspace, KeyspaceConfig};
use polykv::ErrorKind;
use proptest::collection::{hash_set, vec};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

fn member() -> impl Strategy<Value = Bytes> {
    "[a-z]{1,6}".prop_map(Bytes::from)
}

fn members(max: usize) -> impl Strategy<Value = Vec<Bytes>> {
    vec(member(), 0..max)
}

proptest! {
    #[test]
    fn ttl_window_is_half_open(ttl_ms in 1u64..10_000, probe_ms in 0u64..20_000) {
        let clock = Arc::new(ManualClock::new());
        let keyspace = Keyspace::with_clock(KeyspaceConfig::default(), clock.clone());
        let key = Bytes::from("k");

        keyspace.set(key.clone(), Bytes::from("v"), Some(Duration::from_millis(ttl_ms)));
        clock.advance(Duration::from_millis(probe_ms));

        let alive = keyspace.exists(std::slice::from_ref(&key)) == 1;
        prop_assert_eq!(alive, probe_ms < ttl_ms);
    }

    #[test]
    fn active_sweep_agrees_with_lazy_check(ttls in vec(1u64..100, 1..50), probe in 0u64..120) {
        let clock = Arc::new(ManualClock::new());
        let keyspace = Keyspace::with_clock(KeyspaceConfig::default(), clock.clone());

        for (i, ttl) in ttls.iter().enumerate() {
            let key = Bytes::from(format!("k{i}"));
            keyspace.set(key, Bytes::from("v"), Some(Duration::from_secs(*ttl)));
        }
        clock.advance(Duration::from_secs(probe));

        let survivors = ttls.iter().filter(|ttl| probe < **ttl).count();
        while keyspace.sweep_expired(8) > 0 {}
        prop_assert_eq!(keyspace.len(), survivors);
    }

    #[test]
    fn rename_moves_value(value in "[ -~]{0,32}", dst in "[a-z]{1,4}") {
        let keyspace = Keyspace::new();
        let src = Bytes::from("src");
        let dst = Bytes::from(dst);
        keyspace.set(src.clone(), Bytes::from(value.clone()), None);

        prop_assert!(keyspace.rename(&src, dst.clone(), true).unwrap());
        prop_assert_eq!(keyspace.get(&dst).unwrap(), Some(Bytes::from(value)));
        if src != dst {
            prop_assert_eq!(keyspace.exists(&[src]), 0);
        }
    }

    #[test]
    fn lpush_reverses_arguments(values in vec(member(), 1..20)) {
        let keyspace = Keyspace::new();
        keyspace.lpush(Bytes::from("list"), values.clone()).unwrap();

        let mut expected = values;
        expected.reverse();
        prop_assert_eq!(keyspace.lrange(b"list", 0, -1).unwrap(), expected);
    }

    #[test]
    fn sadd_counts_distinct_members(values in members(30)) {
        let keyspace = Keyspace::new();
        let distinct: BTreeSet<_> = values.iter().cloned().collect();

        let added = if values.is_empty() {
            0
        } else {
            keyspace.sadd(Bytes::from("set"), values).unwrap()
        };
        prop_assert_eq!(added, distinct.len());
        prop_assert_eq!(keyspace.scard(b"set").unwrap(), distinct.len());
    }

    #[test]
    fn zrank_follows_score_then_member(
        scores in vec((-1000i32..1000, member()), 1..40),
        delta in -50i32..50,
    ) {
        let keyspace = Keyspace::new();
        let key = Bytes::from("z");
        let pairs: Vec<(f64, Bytes)> = scores.iter().map(|(s, m)| (f64::from(*s), m.clone())).collect();
        keyspace.zadd(key.clone(), pairs.clone()).unwrap();

        // Later duplicates overwrite earlier scores
        let mut model: BTreeMap<Bytes, f64> = BTreeMap::new();
        for (score, member) in pairs {
            model.insert(member, score);
        }
        let bumped = model.keys().next().cloned().unwrap();
        let new_score = keyspace.zincrby(key.clone(), f64::from(delta), bumped.clone()).unwrap();
        *model.get_mut(&bumped).unwrap() += f64::from(delta);
        prop_assert_eq!(new_score, model[&bumped]);

        let mut ordered: Vec<(f64, Bytes)> = model.into_iter().map(|(m, s)| (s, m)).collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        for (rank, (_, member)) in ordered.iter().enumerate() {
            prop_assert_eq!(keyspace.zrank(&key, member).unwrap(), Some(rank));
            prop_assert_eq!(
                keyspace.zrevrank(&key, member).unwrap(),
                Some(ordered.len() - 1 - rank)
            );
        }
    }

    #[test]
    fn hincrby_on_text_leaves_field_alone(text in "[a-z]{1,8}", delta in any::<i64>()) {
        let keyspace = Keyspace::new();
        let key = Bytes::from("h");
        let field = Bytes::from("f");
        keyspace.hset(key.clone(), vec![(field.clone(), Bytes::from(text.clone()))]).unwrap();

        let err = keyspace.hincrby(key.clone(), field.clone(), delta).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Type);
        prop_assert_eq!(keyspace.hget(&key, &field).unwrap(), Some(Bytes::from(text)));
    }

    #[test]
    fn sunionstore_matches_union(
        a in hash_set(member(), 1..15),
        b in hash_set(member(), 1..15),
    ) {
        let keyspace = Keyspace::new();
        keyspace.sadd(Bytes::from("a"), a.iter().cloned().collect()).unwrap();
        keyspace.sadd(Bytes::from("b"), b.iter().cloned().collect()).unwrap();

        let stored = keyspace
            .sunionstore(Bytes::from("dst"), &[Bytes::from("a"), Bytes::from("b")])
            .unwrap();

        let union: BTreeSet<Bytes> = a.union(&b).cloned().collect();
        prop_assert_eq!(stored, union.len());
        let members: BTreeSet<Bytes> = keyspace.smembers(b"dst").unwrap().into_iter().collect();
        prop_assert_eq!(members, union);
    }

    #[test]
    fn ltrim_keeps_inclusive_window(len in 1usize..20, start in -25i64..25, stop in -25i64..25) {
        let keyspace = Keyspace::new();
        let values: Vec<Bytes> = (0..len).map(|i| Bytes::from(i.to_string())).collect();
        keyspace.rpush(Bytes::from("l"), values.clone()).unwrap();

        let expected = keyspace.lrange(b"l", start, stop).unwrap();
        keyspace.ltrim(b"l", start, stop).unwrap();

        prop_assert_eq!(keyspace.lrange(b"l", 0, -1).unwrap(), expected.clone());
        prop_assert_eq!(keyspace.exists(&[Bytes::from("l")]), usize::from(!expected.is_empty()));
    }

    #[test]
    fn persist_succeeds_once(ttl in 1u64..1_000, repeats in 1usize..5) {
        let keyspace = Keyspace::new();
        let key = Bytes::from("k");
        keyspace.set(key.clone(), Bytes::from("v"), Some(Duration::from_secs(ttl)));

        prop_assert!(keyspace.persist(&key));
        for _ in 0..repeats {
            prop_assert!(!keyspace.persist(&key));
        }
    }
}
