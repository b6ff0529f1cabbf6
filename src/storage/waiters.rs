//! Per-Key Waiter Queues for Blocking Pops
//!
//! A blocked `BLPOP`/`BRPOP` call registers one [`Notify`] under every key it
//! waits on. A push to a key wakes the waiters registered under *that* key
//! only; pushes elsewhere never disturb them.
//!
//! `Notify::notify_one` stores a permit when nobody is currently awaiting, so
//! a waiter that registers *before* checking the list cannot miss a push that
//! lands between the check and the await.
//!
//! Registration is tied to a [`WaitGuard`]. Dropping the guard (the pop
//! returned, timed out, or its future was cancelled) removes the waiter from
//! every queue immediately. No keyspace lock is ever held while parked.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Waiters {
    next_id: AtomicU64,
    queues: Mutex<HashMap<Bytes, Vec<(u64, Arc<Notify>)>>>,
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a new waiter on each of `keys`.
    pub fn register(&self, keys: &[Bytes]) -> WaitGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());

        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            queues
                .entry(key.clone())
                .or_default()
                .push((id, Arc::clone(&notify)));
        }

        WaitGuard {
            waiters: self,
            id,
            keys: keys.to_vec(),
            notify,
        }
    }

    /// Wakes every waiter parked on `key`.
    pub fn wake(&self, key: &[u8]) {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(queue) = queues.get(key) {
            for (_, notify) in queue {
                notify.notify_one();
            }
        }
    }

    /// Number of waiters parked on `key`.
    pub fn waiting_on(&self, key: &[u8]) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(key).map_or(0, Vec::len)
    }

    fn deregister(&self, id: u64, keys: &[Bytes]) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if let Some(queue) = queues.get_mut(key) {
                queue.retain(|(waiter, _)| *waiter != id);
                if queue.is_empty() {
                    queues.remove(key);
                }
            }
        }
    }
}

/// A registered waiter. Deregisters on drop.
#[derive(Debug)]
pub struct WaitGuard<'a> {
    waiters: &'a Waiters,
    id: u64,
    keys: Vec<Bytes>,
    notify: Arc<Notify>,
}

impl WaitGuard<'_> {
    /// Resolves on the next push to any registered key (or immediately if one
    /// already happened since the last wake-up).
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.waiters.deregister(self.id, &self.keys);
    }
}
