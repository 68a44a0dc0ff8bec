//! Multi-threaded integration tests for the MPSC handoff queue.
//!
//! These tests verify the cross-thread contract:
//! 1. No item is lost and none is duplicated across concurrent producers
//! 2. Each producer's own push order is preserved in pop order
//! 3. A harness can await drain through a WaitCounter
//!
//! # Running with tracing
//!
//! To see full debug output, run with the tracing feature and no capture:
//! ```bash
//! cargo test --features tracing -- --nocapture
//! ```
//!
//! You can control the log level via RUST_LOG:
//! ```bash
//! RUST_LOG=handoff=debug cargo test --features tracing -- --nocapture
//! ```

#![cfg(not(loom))]

use std::collections::HashMap;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use handoff::sync::counter::WaitCounter;
use handoff::sync::mpsc::{self, Consumer, Timeout};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        handoff::init_tracing();
    });
}

/// Tag encoding: producer id in the high half, per-producer sequence in the
/// low half.
fn tag(producer: u64, seq: u64) -> u64 {
    (producer << 32) | seq
}

/// Splits popped tags back into per-producer sequences.
fn sequences_by_producer(items: &[u64]) -> HashMap<u64, Vec<u64>> {
    let mut map: HashMap<u64, Vec<u64>> = HashMap::new();
    for item in items {
        map.entry(item >> 32).or_default().push(item & 0xFFFF_FFFF);
    }
    map
}

/// Drains exactly `total` items, failing the test if the queue stalls.
fn drain(consumer: &Consumer<u64>, total: usize) -> Vec<u64> {
    let mut received = Vec::with_capacity(total);
    while received.len() < total {
        let item = consumer
            .pop_blocking(Timeout::Duration(Duration::from_secs(5)))
            .expect("queue stalled before all items were observed");
        received.push(item);
    }
    received
}

#[test]
fn no_loss_no_duplication_across_producers() {
    init_test_tracing();

    const PRODUCERS: u64 = 8;
    const ITEMS: u64 = 5_000;

    let (producer, consumer) = mpsc::channel::<u64>();
    let barrier = Arc::new(Barrier::new(PRODUCERS as usize));

    let mut handles = vec![];
    for p in 0..PRODUCERS {
        let producer = producer.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..ITEMS {
                producer.push(tag(p, i));
            }
        }));
    }

    let total = (PRODUCERS * ITEMS) as usize;
    let drainer = thread::spawn(move || drain(&consumer, total));

    for h in handles {
        h.join().unwrap();
    }
    let received = drainer.join().unwrap();

    assert_eq!(received.len(), total);

    let by_producer = sequences_by_producer(&received);
    assert_eq!(by_producer.len(), PRODUCERS as usize);
    for (p, seqs) in by_producer {
        // Exactly ITEMS distinct tags per producer, in push order: any loss,
        // duplication, or reordering breaks the 0..ITEMS sequence.
        let expected: Vec<u64> = (0..ITEMS).collect();
        assert_eq!(seqs, expected, "Producer {p} items lost or reordered");
    }
}

#[test]
fn per_producer_order_survives_interleaving() {
    init_test_tracing();

    const ITEMS: u64 = 20_000;

    let (producer, consumer) = mpsc::channel::<u64>();

    // Two producers racing with the consumer, so batches are captured at
    // arbitrary boundaries.
    let mut handles = vec![];
    for p in 0..2 {
        let producer = producer.clone();
        handles.push(thread::spawn(move || {
            for i in 0..ITEMS {
                producer.push(tag(p, i));
            }
        }));
    }

    let received = drain(&consumer, 2 * ITEMS as usize);

    for h in handles {
        h.join().unwrap();
    }

    for (p, seqs) in sequences_by_producer(&received) {
        for (i, window) in seqs.windows(2).enumerate() {
            assert!(
                window[0] < window[1],
                "Producer {p} reordered at index {i}: {} after {}",
                window[1],
                window[0]
            );
        }
    }
}

#[test]
fn counter_gates_drain() {
    init_test_tracing();

    const PRODUCERS: u64 = 4;
    const ITEMS: u64 = 1_000;

    let (producer, consumer) = mpsc::channel::<u64>();
    let counter = Arc::new(WaitCounter::default());
    let total = (PRODUCERS * ITEMS) as u32;

    let mut handles = vec![];
    for p in 0..PRODUCERS {
        let producer = producer.clone();
        handles.push(thread::spawn(move || {
            for i in 0..ITEMS {
                producer.push(tag(p, i));
            }
        }));
    }

    let drain_counter = Arc::clone(&counter);
    let drainer = thread::spawn(move || {
        for _ in 0..total {
            consumer
                .pop_blocking(Timeout::Duration(Duration::from_secs(5)))
                .expect("queue stalled");
            drain_counter.increment();
        }
    });

    // Block until the consumer has observed every pushed item.
    assert!(
        counter.wait_until_at_least(total, Duration::from_secs(30)),
        "consumer did not observe all items in time"
    );
    assert_eq!(counter.get(), total);

    for h in handles {
        h.join().unwrap();
    }
    drainer.join().unwrap();
}

#[test]
fn continuous_stress() {
    init_test_tracing();

    const PRODUCERS: u64 = 4;
    const RUN_FOR: Duration = Duration::from_millis(200);

    let (producer, consumer) = mpsc::channel::<u64>();
    let stop = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));

    let mut handles = vec![];
    for p in 0..PRODUCERS {
        let producer = producer.clone();
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut pushed = 0u64;
            while !stop.load(Ordering::Relaxed) {
                producer.push(tag(p, pushed));
                pushed += 1;
            }
            pushed
        }));
    }

    let drain_done = Arc::clone(&done);
    let drainer = thread::spawn(move || {
        let mut received = Vec::new();
        loop {
            match consumer.pop() {
                Some(item) => received.push(item),
                // Producers are joined before `done` is set, so a None
                // observed afterwards means the queue is truly drained.
                None if drain_done.load(Ordering::Acquire) => break,
                None => thread::yield_now(),
            }
        }
        received
    });

    thread::sleep(RUN_FOR);
    stop.store(true, Ordering::Relaxed);

    let mut pushed_totals = HashMap::new();
    for (p, h) in handles.into_iter().enumerate() {
        pushed_totals.insert(p as u64, h.join().unwrap());
    }
    done.store(true, Ordering::Release);

    let received = drainer.join().unwrap();
    let expected: u64 = pushed_totals.values().sum();
    assert_eq!(received.len() as u64, expected);

    for (p, seqs) in sequences_by_producer(&received) {
        let pushed = pushed_totals[&p];
        let expected: Vec<u64> = (0..pushed).collect();
        assert_eq!(seqs, expected, "Producer {p} items lost or reordered");
    }
}
