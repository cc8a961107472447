//! Key namespaces and per-category expiry policy.
//!
//! ```text
//! @cache:list:all            → CacheEntry<Vec<VenueSummary>>  (unfiltered listing)
//! @cache:list:watermark      → CacheEntry<String>             (server latestUpdatedAt)
//! @cache:detail:{idOrSlug}   → CacheEntry<VenueDetail>
//! @cache:recent:views        → CacheEntry<Vec<VenueSummary>>
//! @cache:recent:searches     → CacheEntry<Vec<String>>
//! @favorites:items           → string[] (legacy) | FavoriteItem[] (current), no envelope
//! ```
//!
//! Everything under [`CACHE_PREFIX`] is derived data and may be bulk-cleared.
//! Favorites are user data and live outside it.

use chrono::Duration;

use crate::config::CacheConfig;

pub const CACHE_PREFIX: &str = "@cache:";

pub const VENUE_LIST_KEY: &str = "@cache:list:all";
pub const VENUE_WATERMARK_KEY: &str = "@cache:list:watermark";
pub const VENUE_DETAIL_PREFIX: &str = "@cache:detail:";
pub const RECENT_VIEWS_KEY: &str = "@cache:recent:views";
pub const SEARCH_HISTORY_KEY: &str = "@cache:recent:searches";

pub const FAVORITES_PREFIX: &str = "@favorites:";
pub const FAVORITES_KEY: &str = "@favorites:items";

pub fn venue_detail_key(id_or_slug: &str) -> String {
  format!("{}{}", VENUE_DETAIL_PREFIX, id_or_slug)
}

/// Expiry per cache category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
  pub venue_list: Duration,
  pub venue_detail: Duration,
  pub recent_views: Duration,
  pub search_history: Duration,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      venue_list: Duration::minutes(30),
      venue_detail: Duration::minutes(60),
      recent_views: Duration::days(7),
      search_history: Duration::days(30),
    }
  }
}

impl From<&CacheConfig> for CachePolicy {
  fn from(config: &CacheConfig) -> Self {
    Self {
      venue_list: Duration::minutes(config.venue_list_ttl_minutes),
      venue_detail: Duration::minutes(config.venue_detail_ttl_minutes),
      recent_views: Duration::days(config.recent_views_ttl_days),
      search_history: Duration::days(config.search_history_ttl_days),
    }
  }
}
