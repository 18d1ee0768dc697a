//! Buffer management: a fixed set of page frames with LRU replacement.

pub mod pool;

pub use pool::{BufferPool, FrameId};
