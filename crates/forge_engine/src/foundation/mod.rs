//! Foundation layer: memory management and logging

pub mod logging;
pub mod memory;

pub use memory::{Arena, ArenaSlot, MemoryPool, Page, PageId, PoolError};
