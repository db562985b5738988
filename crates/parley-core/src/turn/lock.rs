//! Per-thread mutual exclusion.
//!
//! At most one turn runs per thread; turns on different threads never
//! contend. Each thread gets its own async mutex, held weakly by the map so
//! entries for idle threads can be dropped.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map size above which dead entries are swept before inserting.
const PRUNE_THRESHOLD: usize = 256;

/// Holding this guard grants exclusive access to one thread's history.
pub type ThreadGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct ThreadLocks {
    locks: DashMap<String, Weak<Mutex<()>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other turn holds `thread_id`, then take it.
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard {
        self.lock_for(thread_id).lock_owned().await
    }

    /// Take `thread_id` only if it is free.
    pub fn try_acquire(&self, thread_id: &str) -> Option<ThreadGuard> {
        self.lock_for(thread_id).try_lock_owned().ok()
    }

    /// Number of tracked threads, including ones whose lock is no longer held.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.locks.retain(|_, lock| lock.strong_count() > 0);
        }

        let mut slot = self
            .locks
            .entry(thread_id.to_string())
            .or_insert_with(Weak::new);
        match slot.upgrade() {
            Some(lock) => lock,
            None => {
                let lock = Arc::new(Mutex::new(()));
                *slot = Arc::downgrade(&lock);
                lock
            }
        }
    }
}
