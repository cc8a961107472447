//! Core types for the caching system.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A cached value together with the moment it was written (epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  pub timestamp: i64,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, timestamp: i64) -> Self {
    Self { data, timestamp }
  }

  /// An entry is valid iff `now - timestamp <= expiry`.
  pub fn is_valid(&self, now_ms: i64, expiry: chrono::Duration) -> bool {
    now_ms - self.timestamp <= expiry.num_milliseconds()
  }

  pub fn cached_at(&self) -> DateTime<Utc> {
    Utc
      .timestamp_millis_opt(self.timestamp)
      .single()
      .unwrap_or_default()
  }
}

/// Outcome of an expiry-aware lookup that keeps stale entries around for offline use.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
  Fresh(CacheEntry<T>),
  Stale(CacheEntry<T>),
  Missing,
}

impl<T> Lookup<T> {
  pub fn is_fresh(&self) -> bool {
    matches!(self, Lookup::Fresh(_))
  }

  /// Any entry, regardless of expiry.
  pub fn into_entry(self) -> Option<CacheEntry<T>> {
    match self {
      Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry),
      Lookup::Missing => None,
    }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a cache hit within its expiry window.
  pub fn from_cache(entry: CacheEntry<T>) -> Self {
    let cached_at = entry.cached_at();
    Self {
      data: entry.data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(entry: CacheEntry<T>) -> Self {
    let cached_at = entry.cached_at();
    Self {
      data: entry.data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its expiry window
  CacheFresh,
  /// Offline mode - network unavailable, serving cached data regardless of age
  Offline,
}

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
  fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}
