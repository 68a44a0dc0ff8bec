//! Lock-free MPSC queue for in-process (inter-thread) communication.
//!
//! An unbounded queue using heap-allocated linked entries with atomic list
//! heads.
//!
//! # Overview
//!
//! - [`Producer`] - Write end (cloneable, any number of producers)
//! - [`Consumer`] - Read end (single consumer per queue)
//! - Lock-free: no mutexes or syscalls, and `push` never waits on another
//!   thread
//!
//! # Example
//!
//! ```
//! use handoff::sync::mpsc;
//!
//! let (producer, consumer) = mpsc::channel::<u64>();
//!
//! // Producer threads (clone freely)
//! producer.push(42);
//!
//! // Consumer thread
//! assert_eq!(consumer.pop(), Some(42));
//! ```
//!
//! # Ordering
//!
//! Pop order is the order in which pushes linked their entries into the
//! queue: each producer's own sequence of pushes is preserved, while the
//! relative order of two racing producers is whichever order their pushes
//! happened to land in.
//!
//! # Blocking
//!
//! The core queue has no wait semantics; [`Consumer::pop_blocking`] layers a
//! spin-until-deadline on top. A harness that wants to block until N items
//! have been observed can pair the queue with
//! [`crate::sync::counter::WaitCounter`].

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use minstant::Instant;

use crate::mpsc::list::Queue;
use crate::trace::trace;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the MPSC queue.
///
/// Clone one per producer thread; any number may push concurrently.
pub struct Producer<T: Send> {
    queue: Arc<Queue<T>>,
}

// Manual impl: cloning the handle must not require T: Clone.
impl<T: Send> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

/// Read end of the MPSC queue.
///
/// Only one consumer exists per queue: `Consumer` is not `Clone`, and it is
/// [`Send`] but **not** [`Sync`], so the single-consumer contract of the
/// core algorithm is enforced by the type system rather than at runtime.
pub struct Consumer<T: Send> {
    queue: Arc<Queue<T>>,
    _unsync: PhantomUnsync,
}

/// Creates a new unbounded MPSC channel.
///
/// Returns a `(Producer, Consumer)` pair. Clone the producer for each
/// pushing thread; the consumer can be sent to (but not shared between)
/// threads.
///
/// # Example
///
/// ```
/// use handoff::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel::<String>();
///
/// tx.push("hello".to_string());
/// assert_eq!(rx.pop(), Some("hello".to_string()));
/// ```
#[must_use]
pub fn channel<T: Send>() -> (Producer<T>, Consumer<T>) {
    let queue = Arc::new(Queue::new());

    let producer = Producer {
        queue: Arc::clone(&queue),
    };

    let consumer = Consumer {
        queue,
        _unsync: PhantomData,
    };

    (producer, consumer)
}

impl<T: Send> Producer<T> {
    /// Pushes an item onto the queue (lock-free, never fails).
    ///
    /// The queue is unbounded: a push always succeeds from the caller's
    /// point of view, retrying its CAS internally only under contention.
    #[inline]
    pub fn push(&self, item: T) {
        self.queue.push(item);
    }

    /// Returns true if the queue was observed empty.
    ///
    /// Advisory only: the answer can race with in-flight operations on
    /// other threads. Never use it to conclude an item is absent.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T: Send> Consumer<T> {
    /// Attempts to pop the oldest item from the queue (never blocks).
    ///
    /// Returns `None` if nothing was pending.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: Consumer is !Sync and !Clone, so this thread is the only
        // one that can reach the consumer side of the queue.
        unsafe { self.queue.pop() }
    }

    /// Spins until an item is available, then pops.
    ///
    /// Returns `None` on timeout.
    #[inline]
    #[must_use]
    pub fn pop_blocking(&self, timeout: Timeout) -> Option<T> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if let Some(dl) = deadline
                && Instant::now() > dl
            {
                trace!("pop_blocking timed out with queue empty");
                return None;
            }
            std::hint::spin_loop();
        }
    }

    /// Returns true if the queue was observed empty.
    ///
    /// Advisory only, same caveats as [`Producer::is_empty`].
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
