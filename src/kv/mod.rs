//! Persistent key-value store shared by every component.
//!
//! The store has no ownership semantics of its own. Each component is scoped to a
//! key namespace (see [`crate::cache::keys`]) and only touches keys under it.

mod sqlite;
mod storage;

pub use sqlite::SqliteStore;
pub use storage::{KeyValueStore, NoopStore};
