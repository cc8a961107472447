//! Fetch-with-cache-fallback for venue listings and venue pages.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{RemoteApi, VenueDetail, VenueFilters, VenuePage, VenueSummary};
use crate::cache::keys::{
  venue_detail_key, VENUE_DETAIL_PREFIX, VENUE_LIST_KEY, VENUE_WATERMARK_KEY,
};
use crate::cache::{CachePolicy, CacheResult, Lookup, TtlCache};
use crate::error::{Error, Result};
use crate::recent::RecentActivityLog;

/// Venue reads with transparent caching and offline fallback.
///
/// This wraps the remote API and provides the same reads, but serves fresh cache
/// hits without a network call and falls back to any cached copy when the network fails.
#[derive(Clone)]
pub struct ResourceRepository {
  api: Arc<dyn RemoteApi>,
  cache: TtlCache,
  recent: RecentActivityLog,
  policy: CachePolicy,
  caching_enabled: bool,
  /// Background recent-view writes not yet awaited
  pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ResourceRepository {
  pub fn new(
    api: Arc<dyn RemoteApi>,
    cache: TtlCache,
    recent: RecentActivityLog,
    policy: CachePolicy,
  ) -> Self {
    Self {
      api,
      cache,
      recent,
      policy,
      caching_enabled: true,
      pending: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Always go to the network and never write to the cache.
  pub fn with_caching(mut self, enabled: bool) -> Self {
    self.caching_enabled = enabled;
    self
  }

  pub fn recent(&self) -> &RecentActivityLog {
    &self.recent
  }

  /// Fetch the venue listing.
  ///
  /// 1. Unfiltered + caching enabled: a fresh cache hit returns without a network call
  /// 2. Otherwise fetch; an unfiltered result refreshes the cache (and the watermark)
  /// 3. On network failure, serve the cached listing whatever its age
  pub async fn fetch_venues(
    &self,
    filters: &VenueFilters,
  ) -> Result<CacheResult<Vec<VenueSummary>>> {
    let cacheable = self.caching_enabled && filters.is_empty();

    let cached = if cacheable {
      self
        .cache
        .lookup::<Vec<VenueSummary>>(VENUE_LIST_KEY, self.policy.venue_list)
        .await
    } else {
      Lookup::Missing
    };

    let cached = match cached {
      Lookup::Fresh(entry) => {
        debug!(count = entry.data.len(), "venue list cache hit");
        return Ok(CacheResult::from_cache(entry));
      }
      other => other,
    };

    match self.api.list_venues(filters).await {
      Ok(page) => {
        if cacheable {
          self.store_list(&page).await;
        }
        Ok(CacheResult::from_network(page.venues))
      }
      Err(e) if e.is_transient() => match cached.into_entry() {
        Some(entry) => {
          warn!(error = %e, "venue list fetch failed, serving cached copy");
          Ok(CacheResult::offline(entry))
        }
        None => Err(Error::NotFoundOrOffline("venue list".to_string())),
      },
      Err(e) => Err(e),
    }
  }

  /// Fetch a venue page and record it in the recent views.
  pub async fn get_detail(&self, id_or_slug: &str) -> Result<CacheResult<VenueDetail>> {
    let result = self.load_detail(id_or_slug).await?;

    let recent = self.recent.clone();
    let summary = result.data.summary.clone();
    let handle = tokio::spawn(async move {
      recent.add_to_recent_views(&summary).await;
    });

    {
      let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      pending.retain(|h| !h.is_finished());
      pending.push(handle);
    }

    Ok(result)
  }

  /// Wait for background recent-view writes to land.
  pub async fn flush(&self) {
    let handles: Vec<_> = self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .drain(..)
      .collect();
    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "recent view write failed");
      }
    }
  }

  /// Fetch and cache a venue page without recording a view. Used by prefetch.
  pub async fn warm_detail(&self, id_or_slug: &str) -> Result<()> {
    self.load_detail(id_or_slug).await.map(|_| ())
  }

  /// Whether a venue page is cached and still within its expiry window.
  pub async fn is_detail_cached(&self, id_or_slug: &str) -> bool {
    self.caching_enabled
      && self
        .cache
        .lookup::<VenueDetail>(&venue_detail_key(id_or_slug), self.policy.venue_detail)
        .await
        .is_fresh()
  }

  /// Fetch a venue page through the cache without recording a view.
  pub async fn load_detail(&self, id_or_slug: &str) -> Result<CacheResult<VenueDetail>> {
    let key = venue_detail_key(id_or_slug);

    let cached = if self.caching_enabled {
      self
        .cache
        .lookup::<VenueDetail>(&key, self.policy.venue_detail)
        .await
    } else {
      Lookup::Missing
    };

    let cached = match cached {
      Lookup::Fresh(entry) => {
        debug!(id_or_slug, "venue detail cache hit");
        return Ok(CacheResult::from_cache(entry));
      }
      other => other,
    };

    match self.api.get_venue(id_or_slug).await {
      Ok(detail) => {
        if self.caching_enabled {
          self.cache.set(&key, &detail).await;
        }
        Ok(CacheResult::from_network(detail))
      }
      Err(e) if e.is_transient() => match cached.into_entry() {
        Some(entry) => {
          warn!(id_or_slug, error = %e, "venue detail fetch failed, serving cached copy");
          Ok(CacheResult::offline(entry))
        }
        None => Err(Error::NotFoundOrOffline(format!("venue {}", id_or_slug))),
      },
      Err(e) => Err(e),
    }
  }

  /// Write a fresh unfiltered listing, dropping every cached venue page first
  /// if the server's watermark moved.
  async fn store_list(&self, page: &VenuePage) {
    if let Some(latest) = page.latest_updated_at.as_deref() {
      let previous = self
        .cache
        .peek::<String>(VENUE_WATERMARK_KEY)
        .await
        .map(|entry| entry.data);

      if previous.as_deref() != Some(latest) {
        let removed = self.cache.clear_all(VENUE_DETAIL_PREFIX).await;
        info!(
          previous = previous.as_deref().unwrap_or("none"),
          latest, removed, "venue watermark changed, invalidated cached venue pages"
        );
        self.cache.set(VENUE_WATERMARK_KEY, latest).await;
      }
    }

    self.cache.set(VENUE_LIST_KEY, &page.venues).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::kv::{NoopStore, SqliteStore};
  use crate::testing::{detail, FakeApi, ManualClock};
  use chrono::Duration;

  struct Fixture {
    api: Arc<FakeApi>,
    clock: Arc<ManualClock>,
    cache: TtlCache,
    repo: ResourceRepository,
  }

  fn fixture() -> Fixture {
    let api = Arc::new(FakeApi::with_venues(&["v1", "v2", "v3"]));
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let cache = TtlCache::with_clock(store, clock.clone());
    let recent = RecentActivityLog::new(cache.clone(), CachePolicy::default());
    let repo = ResourceRepository::new(api.clone(), cache.clone(), recent, CachePolicy::default());
    Fixture {
      api,
      clock,
      cache,
      repo,
    }
  }

  #[tokio::test]
  async fn test_unfiltered_list_is_hard_cached() {
    let f = fixture();
    let first = f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, first.data);
    assert_eq!(f.api.list_calls(), 1);
  }

  #[tokio::test]
  async fn test_filtered_list_bypasses_cache() {
    let f = fixture();
    let filters = VenueFilters {
      city: Some("CDMX".to_string()),
      ..Default::default()
    };
    f.repo.fetch_venues(&filters).await.unwrap();
    f.repo.fetch_venues(&filters).await.unwrap();

    assert_eq!(f.api.list_calls(), 2);
    assert!(f.cache.peek::<Vec<VenueSummary>>(VENUE_LIST_KEY).await.is_none());
  }

  #[tokio::test]
  async fn test_offline_fallback_serves_expired_list() {
    let f = fixture();
    f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();

    f.clock.advance(Duration::hours(5).num_milliseconds());
    f.api.set_offline(true);

    let result = f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.len(), 3);
  }

  #[tokio::test]
  async fn test_offline_without_cache_is_an_error() {
    let f = fixture();
    f.api.set_offline(true);

    let err = f
      .repo
      .fetch_venues(&VenueFilters::default())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::NotFoundOrOffline(_)));
  }

  #[tokio::test]
  async fn test_invalid_response_is_surfaced_and_not_cached() {
    let f = fixture();
    f.api.set_invalid(true);

    let err = f
      .repo
      .fetch_venues(&VenueFilters::default())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
    assert!(f.cache.peek::<Vec<VenueSummary>>(VENUE_LIST_KEY).await.is_none());
  }

  #[tokio::test]
  async fn test_watermark_change_invalidates_details() {
    let f = fixture();
    f.api.set_watermark(Some("w1"));
    f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    f.repo.warm_detail("v1").await.unwrap();
    f.repo.warm_detail("v2").await.unwrap();
    assert!(f.repo.is_detail_cached("v1").await);

    f.clock.advance(Duration::minutes(31).num_milliseconds());
    f.api.set_watermark(Some("w2"));
    f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();

    assert!(f.cache.peek::<VenueDetail>(&venue_detail_key("v1")).await.is_none());
    assert!(f.cache.peek::<VenueDetail>(&venue_detail_key("v2")).await.is_none());
  }

  #[tokio::test]
  async fn test_unchanged_watermark_keeps_details() {
    let f = fixture();
    f.api.set_watermark(Some("w1"));
    f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    f.repo.warm_detail("v1").await.unwrap();

    f.clock.advance(Duration::minutes(31).num_milliseconds());
    f.repo.fetch_venues(&VenueFilters::default()).await.unwrap();

    assert!(f.cache.peek::<VenueDetail>(&venue_detail_key("v1")).await.is_some());
  }

  #[tokio::test]
  async fn test_detail_hit_refresh_and_fallback() {
    let f = fixture();
    let first = f.repo.get_detail("v1").await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let hit = f.repo.get_detail("v1").await.unwrap();
    assert_eq!(hit.source, CacheSource::CacheFresh);
    assert_eq!(f.api.detail_calls(), 1);

    f.clock.advance(Duration::minutes(61).num_milliseconds());
    f.api.set_offline(true);
    let offline = f.repo.get_detail("v1").await.unwrap();
    assert_eq!(offline.source, CacheSource::Offline);
    assert_eq!(offline.data, detail("v1"));

    let err = f.repo.get_detail("v9").await.unwrap_err();
    assert!(matches!(err, Error::NotFoundOrOffline(_)));
  }

  #[tokio::test]
  async fn test_detail_records_view_but_warm_does_not() {
    let f = fixture();
    f.repo.warm_detail("v2").await.unwrap();
    f.repo.get_detail("v1").await.unwrap();

    f.repo.flush().await;

    let views = f.repo.recent().recent_views().await;
    let ids: Vec<String> = views.into_iter().map(|v| v.id).collect();
    assert_eq!(ids, vec!["v1"]);
  }

  #[tokio::test]
  async fn test_disabled_caching_always_fetches() {
    let api = Arc::new(FakeApi::with_venues(&["v1"]));
    let cache = TtlCache::new(Arc::new(NoopStore));
    let recent = RecentActivityLog::new(cache.clone(), CachePolicy::default());
    let repo = ResourceRepository::new(api.clone(), cache, recent, CachePolicy::default())
      .with_caching(false);

    repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    repo.fetch_venues(&VenueFilters::default()).await.unwrap();
    assert_eq!(api.list_calls(), 2);
    assert!(!repo.is_detail_cached("v1").await);
  }
}
