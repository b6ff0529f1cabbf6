//! Expiry Index and Background Sweeper
//!
//! Keys with a TTL are expired in two ways:
//!
//! 1. **Passive**: every keyspace access checks the key's deadline first and
//!    treats an expired key as absent (removing it when it holds a write lock).
//! 2. **Active**: the [`ExpirySweeper`] periodically evicts expired keys that
//!    nobody touches again, so abandoned TTL'd keys do not pin memory forever.
//!
//! ## The index
//!
//! Each shard owns an [`ExpiryIndex`]: a map from key to deadline plus a
//! `BTreeSet` ordered by deadline. A sweep walks the ordered set from the
//! front, so it only ever visits keys that are actually due, and stops after a
//! caller-supplied batch limit. That bound is what keeps the sweeper from
//! holding a shard lock for an unbounded time.
//!
//! ## Adaptive frequency
//!
//! If many keys are expiring, the sweeper runs more frequently.
//! If few keys are expiring, it backs off to save CPU.

use crate::storage::Keyspace;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Deadlines for the keys of one shard.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    deadlines: HashMap<Bytes, Instant>,
    by_deadline: BTreeSet<(Instant, Bytes)>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the deadline for `key`.
    pub fn arm(&mut self, key: Bytes, at: Instant) {
        if let Some(old) = self.deadlines.insert(key.clone(), at) {
            self.by_deadline.remove(&(old, key.clone()));
        }
        self.by_deadline.insert((at, key));
    }

    /// Removes the deadline for `key`.
    ///
    /// Returns `true` iff a deadline existed.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        match self.deadlines.remove_entry(key) {
            Some((key, at)) => {
                self.by_deadline.remove(&(at, key));
                true
            }
            None => false,
        }
    }

    pub fn deadline(&self, key: &[u8]) -> Option<Instant> {
        self.deadlines.get(key).copied()
    }

    /// Returns `true` if `key` has a deadline at or before `now`.
    #[inline]
    pub fn check(&self, key: &[u8], now: Instant) -> bool {
        self.deadlines.get(key).is_some_and(|at| now >= *at)
    }

    /// Removes and returns up to `limit` keys whose deadline has passed,
    /// earliest first.
    pub fn sweep(&mut self, now: Instant, limit: usize) -> Vec<Bytes> {
        let mut expired = Vec::new();
        while expired.len() < limit {
            let due = match self.by_deadline.first() {
                Some((at, _)) => *at <= now,
                None => false,
            };
            if !due {
                break;
            }
            if let Some((_, key)) = self.by_deadline.pop_first() {
                self.deadlines.remove(&key);
                expired.push(key);
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.by_deadline.clear();
    }
}

/// Sweeper cadence and batch limits.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting pause between passes (default: 100ms)
    pub base_interval: Duration,

    /// Shortest pause the sweeper speeds up to (default: 10ms)
    pub min_interval: Duration,

    /// Longest pause the sweeper backs off to (default: 1s)
    pub max_interval: Duration,

    /// Halve the pause when a pass evicts more than this share of volatile keys
    pub speedup_threshold: f64,

    /// Double the pause when a pass evicts nothing and the share is below this
    pub slowdown_threshold: f64,

    /// Maximum keys evicted per shard lock acquisition (default: 128)
    pub batch_size: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(1_000),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
            batch_size: 128,
        }
    }
}

impl ExpiryConfig {
    /// The pause to use after a pass that evicted `expired` of `volatile`
    /// keys, given the pause that preceded it.
    pub fn next_interval(&self, current: Duration, expired: usize, volatile: usize) -> Duration {
        if volatile == 0 {
            return current;
        }
        let rate = expired as f64 / volatile as f64;
        if rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else if expired == 0 && rate < self.slowdown_threshold {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// Handle to the background sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    stop_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use polykv::storage::{ExpiryConfig, ExpirySweeper, Keyspace};
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let keyspace = Arc::new(Keyspace::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&keyspace), ExpiryConfig::default());
    /// drop(sweeper); // stops the task
    /// # }
    /// ```
    pub fn start(keyspace: Arc<Keyspace>, config: ExpiryConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        info!(
            batch_size = config.batch_size,
            interval_ms = config.base_interval.as_millis(),
            "Starting expiry sweeper"
        );
        tokio::spawn(run_sweeper(keyspace, config, stop_rx));
        Self { stop_tx }
    }

    /// Signals the task to exit. Also called on drop.
    pub fn stop(&self) {
        if self.stop_tx.send(true).is_ok() {
            info!("Stopping expiry sweeper");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_sweeper(
    keyspace: Arc<Keyspace>,
    config: ExpiryConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("expiry sweeper exiting");
                    return;
                }
            }
        }

        let volatile = keyspace.volatile_len();
        let expired = keyspace.sweep_expired(config.batch_size);

        let next = config.next_interval(interval, expired, volatile);
        if next < interval {
            debug!(expired, volatile, interval_ms = next.as_millis(), "sweeper speeding up");
        } else if next > interval {
            trace!(interval_ms = next.as_millis(), "sweeper backing off");
        }
        interval = next;

        if expired > 0 {
            debug!(expired, remaining = keyspace.len(), "swept expired keys");
        }
    }
}

/// Spawns a sweeper with [`ExpiryConfig::default`].
pub fn start_expiry_sweeper(keyspace: Arc<Keyspace>) -> ExpirySweeper {
    ExpirySweeper::start(keyspace, ExpiryConfig::default())
}
