//! Condition-variable counter for awaiting progress across threads.
//!
//! The MPSC queue itself has no wait semantics: a harness that pushes N
//! items and wants to block until a consumer has observed all N pairs the
//! queue with a [`WaitCounter`] incremented once per observed item.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::trace::debug;

/// Thread-safe counter with "wait until count reaches N" semantics.
pub struct WaitCounter {
    count: Mutex<u32>,
    condvar: Condvar,
}

impl WaitCounter {
    /// Creates a counter starting at `init`.
    #[must_use]
    pub fn new(init: u32) -> Self {
        Self {
            count: Mutex::new(init),
            condvar: Condvar::new(),
        }
    }

    // A panicking holder cannot leave the count inconsistent; recover from
    // poisoning instead of propagating it.
    fn lock(&self) -> MutexGuard<'_, u32> {
        self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current count.
    #[must_use]
    pub fn get(&self) -> u32 {
        *self.lock()
    }

    /// Increments the count and wakes all waiters.
    pub fn increment(&self) {
        {
            let mut count = self.lock();
            *count += 1;
        }
        self.condvar.notify_all();
    }

    /// Blocks until the count reaches `target` or `timeout` elapses.
    ///
    /// Returns true if the target was reached before the deadline. On false
    /// the count may still have advanced; callers can re-check [`get`].
    ///
    /// [`get`]: WaitCounter::get
    pub fn wait_until_at_least(&self, target: u32, timeout: Duration) -> bool {
        let guard = self.lock();
        let (count, result) = self
            .condvar
            .wait_timeout_while(guard, timeout, |count| *count < target)
            .unwrap_or_else(|e| e.into_inner());
        if result.timed_out() && *count < target {
            debug!(count = *count, want = target, "wait_until_at_least timed out");
            return false;
        }
        true
    }
}

impl Default for WaitCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
