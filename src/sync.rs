//! Synchronization primitives for in-process communication.
//!
//! This module provides the producer/consumer handle pair over the core
//! MPSC queue, plus a condition-variable counter that harnesses can use to
//! wait for a consumer to observe a number of items.

pub mod counter;
pub mod mpsc;
