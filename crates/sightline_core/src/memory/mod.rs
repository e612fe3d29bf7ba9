//! # Memory Management
//!
//! Handle-based storage for object graphs.
//!
//! ## Design Philosophy
//!
//! Objects never point at each other. They hold `PoolHandle`s, which stay
//! valid until the slot is freed and are rejected afterwards thanks to a
//! per-slot generation counter.

mod pool;

pub use pool::{Pool, PoolHandle};
