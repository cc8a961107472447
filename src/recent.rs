//! Bounded most-recent-first logs of viewed venues and search terms.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::VenueSummary;
use crate::cache::keys::{RECENT_VIEWS_KEY, SEARCH_HISTORY_KEY};
use crate::cache::{CachePolicy, TtlCache};

pub const MAX_RECENT_VIEWS: usize = 20;
pub const MAX_SEARCH_HISTORY: usize = 50;

#[derive(Clone)]
pub struct RecentActivityLog {
  cache: TtlCache,
  policy: CachePolicy,
  /// Serializes read-modify-write cycles on the two lists.
  write_lock: Arc<Mutex<()>>,
}

impl RecentActivityLog {
  pub fn new(cache: TtlCache, policy: CachePolicy) -> Self {
    Self {
      cache,
      policy,
      write_lock: Arc::new(Mutex::new(())),
    }
  }

  /// Move `venue` to the front of the recent views, keeping at most 20.
  pub async fn add_to_recent_views(&self, venue: &VenueSummary) {
    let _guard = self.write_lock.lock().await;
    let mut views = self.recent_views().await;
    push_front_unique(&mut views, venue.clone(), MAX_RECENT_VIEWS, |a, b| a.id == b.id);
    self.cache.set(RECENT_VIEWS_KEY, &views).await;
  }

  pub async fn recent_views(&self) -> Vec<VenueSummary> {
    self
      .cache
      .get(RECENT_VIEWS_KEY, self.policy.recent_views)
      .await
      .unwrap_or_default()
  }

  /// Move `term` to the front of the search history, keeping at most 50.
  /// Blank input is ignored.
  pub async fn add_to_search_history(&self, term: &str) {
    if term.trim().is_empty() {
      return;
    }

    let _guard = self.write_lock.lock().await;
    let mut history = self.search_history().await;
    push_front_unique(&mut history, term.to_string(), MAX_SEARCH_HISTORY, |a, b| a == b);
    self.cache.set(SEARCH_HISTORY_KEY, &history).await;
  }

  pub async fn search_history(&self) -> Vec<String> {
    self
      .cache
      .get(SEARCH_HISTORY_KEY, self.policy.search_history)
      .await
      .unwrap_or_default()
  }

  pub async fn clear_recent_views(&self) {
    let _guard = self.write_lock.lock().await;
    self.cache.remove(RECENT_VIEWS_KEY).await;
  }

  pub async fn clear_search_history(&self) {
    let _guard = self.write_lock.lock().await;
    self.cache.remove(SEARCH_HISTORY_KEY).await;
  }
}

fn push_front_unique<T>(list: &mut Vec<T>, item: T, max: usize, same: impl Fn(&T, &T) -> bool) {
  list.retain(|existing| !same(existing, &item));
  list.insert(0, item);
  list.truncate(max);
}
