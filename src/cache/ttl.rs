//! TTL cache that wraps the key-value store with timestamped entries.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::keys::CACHE_PREFIX;
use super::traits::{CacheEntry, Clock, Lookup, SystemClock};
use crate::kv::KeyValueStore;

/// Expiry-aware cache over a shared [`KeyValueStore`].
///
/// No method returns an error: a failed write is logged and dropped, and a failed or
/// unparsable read behaves like a miss.
#[derive(Clone)]
pub struct TtlCache {
  store: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
}

impl TtlCache {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self::with_clock(store, Arc::new(SystemClock))
  }

  pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  pub fn store(&self) -> &Arc<dyn KeyValueStore> {
    &self.store
  }

  /// Stamp `data` with the current time and overwrite whatever was under `key`.
  pub async fn set<T: Serialize + Sync + ?Sized>(&self, key: &str, data: &T) {
    let raw = match serde_json::to_string(&CacheEntry::new(data, self.clock.now_ms())) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, error = %e, "failed to serialize cache entry");
        return;
      }
    };

    if let Err(e) = self.store.set_item(key, &raw).await {
      warn!(key, error = %e, "cache write failed");
    }
  }

  /// Read the entry under `key` if it is still within `expiry`.
  ///
  /// Expired entries are deleted as a side effect.
  pub async fn get<T: DeserializeOwned>(&self, key: &str, expiry: Duration) -> Option<T> {
    match self.lookup(key, expiry).await {
      Lookup::Fresh(entry) => Some(entry.data),
      Lookup::Stale(_) => {
        debug!(key, "cache entry expired");
        self.remove(key).await;
        None
      }
      Lookup::Missing => None,
    }
  }

  /// Classify the entry under `key` without deleting anything.
  ///
  /// Used by readers that want to fall back to a stale copy when the network fails.
  pub async fn lookup<T: DeserializeOwned>(&self, key: &str, expiry: Duration) -> Lookup<T> {
    match self.peek(key).await {
      Some(entry) if entry.is_valid(self.clock.now_ms(), expiry) => Lookup::Fresh(entry),
      Some(entry) => Lookup::Stale(entry),
      None => Lookup::Missing,
    }
  }

  /// Read the entry under `key` regardless of its age.
  pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let raw = match self.store.get_item(key).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    match serde_json::from_str::<CacheEntry<T>>(&raw) {
      Ok(entry) => Some(entry),
      Err(e) => {
        debug!(key, error = %e, "discarding unparsable cache entry");
        None
      }
    }
  }

  pub async fn remove(&self, key: &str) {
    if let Err(e) = self.store.remove_item(key).await {
      warn!(key, error = %e, "cache delete failed");
    }
  }

  /// Remove every key that starts with `prefix`. Returns how many keys were removed.
  pub async fn clear_all(&self, prefix: &str) -> usize {
    let keys = match self.store.get_all_keys().await {
      Ok(keys) => keys,
      Err(e) => {
        warn!(prefix, error = %e, "failed to enumerate cache keys");
        return 0;
      }
    };

    let matching: Vec<String> = keys.into_iter().filter(|k| k.starts_with(prefix)).collect();
    if matching.is_empty() {
      return 0;
    }

    match self.store.multi_remove(&matching).await {
      Ok(()) => {
        info!(prefix, removed = matching.len(), "cleared cache namespace");
        matching.len()
      }
      Err(e) => {
        warn!(prefix, error = %e, "failed to clear cache namespace");
        0
      }
    }
  }

  /// "Clear my data": drop every derived cache entry. Favorites are untouched.
  pub async fn clear_cached_data(&self) -> usize {
    self.clear_all(CACHE_PREFIX).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::keys::{venue_detail_key, FAVORITES_KEY, VENUE_DETAIL_PREFIX};
  use crate::kv::SqliteStore;
  use crate::testing::{BrokenStore, ManualClock};

  fn cache_with_clock() -> (TtlCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    (TtlCache::with_clock(store, clock.clone()), clock)
  }

  #[tokio::test]
  async fn test_entry_serializes_as_data_and_timestamp() {
    let (cache, _clock) = cache_with_clock();
    cache.set("@cache:x", &vec![1, 2]).await;

    let raw = cache.store().get_item("@cache:x").await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["data"], serde_json::json!([1, 2]));
    assert_eq!(value["timestamp"], serde_json::json!(1_000_000));
  }

  #[tokio::test]
  async fn test_expiry_boundary() {
    let expiry = Duration::minutes(30);
    let (cache, clock) = cache_with_clock();

    cache.set("@cache:k", &"v").await;
    clock.advance(expiry.num_milliseconds() - 1);
    assert_eq!(cache.get::<String>("@cache:k", expiry).await.as_deref(), Some("v"));

    clock.advance(1);
    assert_eq!(cache.get::<String>("@cache:k", expiry).await.as_deref(), Some("v"));

    clock.advance(1);
    assert_eq!(cache.get::<String>("@cache:k", expiry).await, None);
  }

  #[tokio::test]
  async fn test_expired_read_deletes_key() {
    let (cache, clock) = cache_with_clock();
    cache.set("@cache:k", &"v").await;
    clock.advance(Duration::minutes(31).num_milliseconds());

    assert_eq!(cache.get::<String>("@cache:k", Duration::minutes(30)).await, None);
    assert_eq!(cache.store().get_item("@cache:k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_lookup_keeps_stale_entry() {
    let (cache, clock) = cache_with_clock();
    cache.set("@cache:k", &"v").await;
    clock.advance(Duration::hours(2).num_milliseconds());

    let lookup = cache.lookup::<String>("@cache:k", Duration::minutes(30)).await;
    assert!(matches!(lookup, Lookup::Stale(ref e) if e.data == "v"));
    assert!(cache.store().get_item("@cache:k").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_unparsable_entry_is_a_miss() {
    let (cache, _clock) = cache_with_clock();
    cache.store().set_item("@cache:k", "not json").await.unwrap();

    assert_eq!(cache.get::<String>("@cache:k", Duration::days(1)).await, None);
  }

  #[tokio::test]
  async fn test_clear_all_only_touches_prefix() {
    let (cache, _clock) = cache_with_clock();
    cache.set(&venue_detail_key("a"), &1).await;
    cache.set(&venue_detail_key("b"), &2).await;
    cache.set("@cache:list:all", &3).await;
    cache.store().set_item(FAVORITES_KEY, "[]").await.unwrap();

    assert_eq!(cache.clear_all(VENUE_DETAIL_PREFIX).await, 2);
    assert!(cache.peek::<i32>("@cache:list:all").await.is_some());

    assert_eq!(cache.clear_cached_data().await, 1);
    assert_eq!(
      cache.store().get_all_keys().await.unwrap(),
      vec![FAVORITES_KEY.to_string()]
    );
  }

  #[tokio::test]
  async fn test_storage_failures_degrade_to_miss() {
    let cache = TtlCache::new(Arc::new(BrokenStore));

    cache.set("@cache:k", &"v").await;
    assert_eq!(cache.get::<String>("@cache:k", Duration::days(1)).await, None);
    assert_eq!(cache.clear_cached_data().await, 0);
  }
}
