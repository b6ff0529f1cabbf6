//! Time Sources
//!
//! The keyspace never calls `Instant::now()` directly. Every TTL computation and
//! expiry check goes through a [`Clock`], so tests can drive expiration
//! deterministically with a [`ManualClock`] instead of sleeping.
//!
//! Two readings are exposed:
//! - a monotonic [`Instant`], used for deadlines and remaining-TTL math
//! - a wall-clock [`SystemTime`], used only to translate absolute Unix
//!   timestamps (`EXPIREAT`) into deadlines

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// A source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic "now" used for expiry deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock "now" used to interpret absolute timestamps.
    fn wall(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Both readings start at the moment of construction and advance together.
///
/// # Example
///
/// ```
/// use polykv::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let t0 = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - t0, Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    wall_base: SystemTime,
    /// Offset from the base, in nanoseconds
    offset_nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at the current time.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            wall_base: SystemTime::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn wall(&self) -> SystemTime {
        self.wall_base + self.offset()
    }
}
