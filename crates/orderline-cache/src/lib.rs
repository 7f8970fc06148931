//! Orderline Cache
//!
//! In-memory, read-through order cache:
//! - Per-entry TTL with lazy expiry on read
//! - Background reaper that physically removes expired entries
//! - Crash-safe snapshot save and load

pub mod cache;
pub mod entry;
pub mod reaper;

pub use cache::OrderCache;
pub use entry::{CacheEntry, Ttl};
pub use reaper::ReaperHandle;
