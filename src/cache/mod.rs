//! Timestamped cache over the key-value store.
//!
//! This module provides the expiry-aware layer that every other component reads through:
//! - Wraps values as `{data, timestamp}` JSON entries
//! - Applies per-category expiry policies (see [`keys::CachePolicy`])
//! - Deletes expired entries lazily on read
//! - Never fails the caller: storage errors degrade to a cache miss

pub mod keys;
mod traits;
mod ttl;

pub use keys::CachePolicy;
pub use traits::{CacheEntry, CacheResult, CacheSource, Clock, Lookup, SystemClock};
pub use ttl::TtlCache;
