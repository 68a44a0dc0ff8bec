//! Unbounded lock-free MPSC queue for handing work items from many producer
//! threads to exactly one consumer thread.

pub mod mpsc;

// The handle layer and tracing use std primitives directly; loom model
// checking only exercises the core algorithm.
#[cfg(not(loom))]
pub mod sync;
#[cfg(not(loom))]
pub mod trace;

#[cfg(not(loom))]
pub use trace::init_tracing;
