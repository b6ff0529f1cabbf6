//! # polykv - An In-Memory Multi-Type Key-Value Store
//!
//! polykv keeps strings, hashes, lists, sets and sorted sets in one sharded
//! keyspace, with per-key expiry and Redis-style command semantics. It is a
//! library: callers use the typed [`Keyspace`] API directly, or the
//! command-shaped [`CommandHandler`] that a network adapter would sit on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               polykv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────────────────┐  │
//! │  │  [name,     │───>│  Command    │───>│          Keyspace           │  │
//! │  │   args...]  │    │  Handler    │    │  ┌────────┐ ┌────────┐      │  │
//! │  └─────────────┘    └──────┬──────┘    │  │Shard 0 │ │...N    │      │  │
//! │                            │           │  │RwLock  │ │shards  │      │  │
//! │                            ▼           │  └────────┘ └────────┘      │  │
//! │                          Reply         └─────────────────────────────┘  │
//! │                                                       ▲                 │
//! │                     ┌─────────────────────────────────┴───────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use polykv::{CommandHandler, Keyspace, Reply};
//! use polykv::storage::start_expiry_sweeper;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let keyspace = Arc::new(Keyspace::new());
//! let _sweeper = start_expiry_sweeper(Arc::clone(&keyspace));
//!
//! let handler = CommandHandler::new(Arc::clone(&keyspace));
//! let args: Vec<Bytes> = ["LPUSH", "jobs", "a", "b", "c"]
//!     .iter()
//!     .map(|s| Bytes::from(*s))
//!     .collect();
//! assert_eq!(handler.execute(&args).await, Reply::Integer(3));
//!
//! let order = keyspace.lrange(b"jobs", 0, -1).unwrap();
//! assert_eq!(order, vec![Bytes::from("c"), Bytes::from("b"), Bytes::from("a")]);
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`clock`]: time sources (real and manual) behind every TTL decision
//! - [`error`]: [`StoreError`] and its [`ErrorKind`] classification
//! - [`storage`]: the keyspace, type engines, expiry and blocking-pop waiters
//! - [`commands`]: the dispatcher and its [`Reply`] type
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! The keyspace is split into 64 shards, each behind its own `RwLock`.
//! Commands touching several keys (`RENAME`, `SMOVE`, `RPOPLPUSH`, the
//! `*STORE` family) lock every shard they need in ascending order, so they
//! are atomic and cannot deadlock against each other.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: every access checks the deadline first
//! 2. **Active**: a background task drains each shard's expiry index
//!
//! so memory is reclaimed even for keys that are never touched again.

pub mod clock;
pub mod commands;
pub mod error;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{CommandHandler, Reply};
pub use error::{ErrorKind, Result, StoreError};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, Keyspace, KeyspaceConfig};

/// Version of polykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
