//! Favorites set for the current session.
//!
//! Favorites live in memory, are backed up to the key-value store under
//! [`crate::cache::keys::FAVORITES_KEY`], and when authenticated are reconciled with the
//! remote store (remote wins, then local backfills what the remote is missing).

mod store;
mod stored;

pub use store::{FavoriteFeedback, FavoritesPreferences, FavoritesState, FavoritesStore, SyncReport};
pub use stored::StoredFavorites;
