//! Core lock-free MPSC linked-list queue algorithm.
//!
//! This module provides an unbounded lock-free MPSC (Multi-Producer
//! Single-Consumer) queue built from two singly linked lists of heap
//! entries.
//!
//! # Algorithm
//!
//! - `push_head` is contested: producers prepend entries with a CAS retry
//!   loop (the classic Treiber stack push)
//! - The consumer drains by swapping `push_head` with null, capturing the
//!   whole pending batch in one step
//! - The captured newest-first chain is reversed in place onto the
//!   consumer-private `pop_head`, so batches drain oldest-first and pop
//!   order equals push-linkage order across refills
//!
//! # Memory ordering
//!
//! The publishing CAS is `Release` and the draining swap is `Acquire`, so
//! the consumer observes fully initialized entry contents, not just the
//! updated pointer. Producers never dereference the head they observe, so
//! the push-side load and the CAS failure ordering are `Relaxed`, as is
//! everything on the single-threaded `pop_head`.
//!
//! # Safety
//!
//! The producer side is lock-free for any number of concurrent producers:
//! on every contended round at least one CAS succeeds. The consumer side
//! requires exactly one consumer (single consumer invariant). Entries are
//! freed only by the consumer, which owns them exclusively once they are
//! off the push list, so no reclamation scheme is needed.

use std::ptr;

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, Ordering};

/// One heap entry owning a queued value.
///
/// `next` is a plain pointer: it is only written while the entry is
/// unpublished (producer-private) or after it has been claimed by the
/// consumer (consumer-private).
struct Entry<T> {
    value: T,
    next: *mut Entry<T>,
}

/// Unbounded lock-free MPSC queue.
///
/// This is the shared core used by the [`crate::sync::mpsc`] handle pair.
pub(crate) struct Queue<T> {
    /// Most recently pushed entry not yet claimed by the consumer.
    /// The only field touched by more than one thread.
    push_head: AtomicPtr<Entry<T>>,

    /// Next entry the consumer will return. Consumer-private; atomic only so
    /// stores are well-defined publications to that same thread.
    pop_head: AtomicPtr<Entry<T>>,
}

impl<T> Queue<T> {
    /// Creates a new empty queue.
    pub(crate) fn new() -> Self {
        Self {
            push_head: AtomicPtr::new(ptr::null_mut()),
            pop_head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Returns true if both lists were observed empty.
    ///
    /// Advisory only: the two loads are not coordinated, so the answer can
    /// race with an in-flight push or pop. Never use it to establish that no
    /// element exists, only as a hint.
    #[inline]
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.push_head.load(Ordering::Relaxed).is_null()
            && self.pop_head.load(Ordering::Relaxed).is_null()
    }

    /// Pushes an item onto the queue.
    ///
    /// Lock-free and safe to call from any number of threads concurrently.
    /// Never blocks and never fails: the CAS loop retries until this entry
    /// is linked, and on every contended round some producer succeeds.
    #[inline]
    pub(crate) fn push(&self, value: T) {
        let entry = Box::into_raw(Box::new(Entry {
            value,
            next: ptr::null_mut(),
        }));

        let mut head = self.push_head.load(Ordering::Relaxed);
        loop {
            // SAFETY: entry is not yet published, so no other thread can
            // observe it; we have exclusive access to its next field.
            unsafe {
                (*entry).next = head;
            }

            // Release on success publishes the entry's contents along with
            // the pointer. The failure load is Relaxed: we only store the
            // observed head, never dereference it.
            match self.push_head.compare_exchange_weak(
                head,
                entry,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Attempts to pop the oldest item from the queue.
    ///
    /// Returns `None` if the queue had nothing pending. Never blocks.
    ///
    /// # Safety
    ///
    /// Caller must ensure only one thread calls this method (single consumer
    /// invariant). The pop list and the entries on it are unsynchronized
    /// consumer state.
    #[inline]
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let popped = self.pop_head.load(Ordering::Relaxed);
        if !popped.is_null() {
            // SAFETY: entries on the pop list are owned exclusively by the
            // consumer; nothing else can reach this pointer.
            let entry = unsafe { Box::from_raw(popped) };
            self.pop_head.store(entry.next, Ordering::Relaxed);
            return Some(entry.value);
        }

        // Claim the entire pending batch in one step and reset the push
        // list for producers to build anew. Acquire pairs with the Release
        // CAS in push, making every captured entry's contents visible.
        let mut grabbed = self.push_head.swap(ptr::null_mut(), Ordering::Acquire);
        if grabbed.is_null() {
            return None;
        }

        // The captured chain is newest-first. Reverse the links in place;
        // the loop ends at the oldest entry, whose next is null because it
        // was pushed onto an empty push list.
        let mut reversed: *mut Entry<T> = ptr::null_mut();
        // SAFETY: the swap transferred exclusive ownership of every entry
        // reachable from `grabbed` to this thread.
        unsafe {
            while !(*grabbed).next.is_null() {
                let next = (*grabbed).next;
                (*grabbed).next = reversed;
                reversed = grabbed;
                grabbed = next;
            }
        }

        self.pop_head.store(reversed, Ordering::Relaxed);

        // SAFETY: `grabbed` is the oldest captured entry; it is linked into
        // neither list and owned exclusively by the consumer.
        let entry = unsafe { Box::from_raw(grabbed) };
        Some(entry.value)
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        // Exclusive access: no producer or consumer can be live here.
        for head in [
            self.push_head.load(Ordering::Relaxed),
            self.pop_head.load(Ordering::Relaxed),
        ] {
            let mut cursor = head;
            while !cursor.is_null() {
                // SAFETY: every entry still linked belongs to the queue and
                // is freed exactly once here.
                let entry = unsafe { Box::from_raw(cursor) };
                cursor = entry.next;
            }
        }
    }
}

// SAFETY: Queue is Send/Sync for Send payloads because cross-thread access
// is mediated entirely by the push_head atomic; every other location is
// producer-private (unpublished entries) or consumer-private (pop list).
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}


/// Loom tests exhaustively check all interleavings of the core operations.
///
/// Run with: `RUSTFLAGS="--cfg loom" cargo test --release`
#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_push_push() {
        loom::model(|| {
            let queue = Arc::new(Queue::new());

            let q1 = Arc::clone(&queue);
            let q2 = Arc::clone(&queue);

            let h1 = thread::spawn(move || q1.push(1));
            let h2 = thread::spawn(move || q2.push(2));

            h1.join().unwrap();
            h2.join().unwrap();

            let mut values = vec![];
            while let Some(v) = unsafe { queue.pop() } {
                values.push(v);
            }
            values.sort_unstable();
            assert_eq!(values, vec![1, 2]);
        });
    }

    #[test]
    fn loom_push_races_drain() {
        loom::model(|| {
            let queue = Arc::new(Queue::new());
            queue.push(1);

            let producer_queue = Arc::clone(&queue);
            let producer = thread::spawn(move || producer_queue.push(2));

            // Single consumer on this thread, racing the producer. The
            // first pop must yield 1 (it is already linked); 2 surfaces
            // either in the same batch or a later one.
            let first = unsafe { queue.pop() };
            assert_eq!(first, Some(1));

            producer.join().unwrap();

            assert_eq!(unsafe { queue.pop() }, Some(2));
            assert_eq!(unsafe { queue.pop() }, None);
        });
    }

    #[test]
    fn loom_no_lost_entries() {
        loom::model(|| {
            let queue = Arc::new(Queue::new());

            let q1 = Arc::clone(&queue);
            let q2 = Arc::clone(&queue);

            let h1 = thread::spawn(move || {
                q1.push(1);
                q1.push(2);
            });
            let h2 = thread::spawn(move || {
                q2.push(3);
                q2.push(4);
            });

            h1.join().unwrap();
            h2.join().unwrap();

            let mut values = vec![];
            while let Some(v) = unsafe { queue.pop() } {
                values.push(v);
            }
            values.sort_unstable();
            assert_eq!(values, vec![1, 2, 3, 4], "Lost entries");
        });
    }

    #[test]
    fn loom_per_producer_order() {
        loom::model(|| {
            let queue = Arc::new(Queue::new());

            let q1 = Arc::clone(&queue);
            let q2 = Arc::clone(&queue);

            let h1 = thread::spawn(move || {
                q1.push(10);
                q1.push(11);
            });
            let h2 = thread::spawn(move || {
                q2.push(20);
                q2.push(21);
            });

            h1.join().unwrap();
            h2.join().unwrap();

            let mut values = vec![];
            while let Some(v) = unsafe { queue.pop() } {
                values.push(v);
            }

            let tens: Vec<_> = values.iter().filter(|v| **v < 20).collect();
            let twenties: Vec<_> = values.iter().filter(|v| **v >= 20).collect();
            assert_eq!(tens, vec![&10, &11]);
            assert_eq!(twenties, vec![&20, &21]);
        });
    }
}
