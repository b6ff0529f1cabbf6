//! Storage Module
//!
//! The keyspace and everything it is built from: the tagged [`Value`], the
//! sorted-set structure, per-shard expiry indexes, the background sweeper and
//! the waiter queues behind blocking list pops.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ entries │ │ entries │ │ entries │ │ shards  │           │
//! │  │ expiry  │ │ expiry  │ │ expiry  │ │         │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │        string · hash · list · set · zset engines            │
//! └─────────────────────────────────────────────────────────────┘
//!            ▲                               ▲
//!            │                               │
//!  ┌─────────┴─────────┐           ┌─────────┴─────────┐
//!  │   ExpirySweeper   │           │      Waiters      │
//!  │ (Background Task) │           │  (BLPOP / BRPOP)  │
//!  └───────────────────┘           └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use polykv::storage::Keyspace;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let keyspace = Keyspace::new();
//!
//! keyspace.set(Bytes::from("name"), Bytes::from("alice"), None);
//! assert_eq!(keyspace.get(b"name").unwrap(), Some(Bytes::from("alice")));
//!
//! keyspace.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! assert_eq!(keyspace.ttl(b"session").as_secs(), 3600);
//!
//! keyspace.rpush(Bytes::from("queue"), vec![Bytes::from("a"), Bytes::from("b")]).unwrap();
//! assert_eq!(keyspace.llen(b"queue").unwrap(), 2);
//! ```

pub mod expiry;
pub mod keyspace;
pub mod pattern;
pub mod sorted_set;
pub mod value;
pub mod waiters;

pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpiryIndex, ExpirySweeper};
pub use keyspace::{
    Entry, Keyspace, KeyspaceConfig, KeyspaceStats, SetCondition, SetOptions, SetOutcome, Ttl,
    ZaddOptions, DEFAULT_SHARDS,
};
pub use pattern::glob_match;
pub use sorted_set::{Insertion, ScoreBound, ScoreRange, SortedSet};
pub use value::{Value, ValueKind};
pub use waiters::{WaitGuard, Waiters};
