//! Core MPSC (Multi-Producer Single-Consumer) queue primitives.
//!
//! This module contains an unbounded lock-free MPSC linked-list queue.
//! Any number of producers may push concurrently; exactly one consumer
//! drains in FIFO order.
//!
//! Used by:
//! - [`crate::sync::mpsc`] - In-process producer/consumer handle pairs

pub(crate) mod list;
