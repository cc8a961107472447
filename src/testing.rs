//! In-memory fakes and fixtures shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::types::Contact;
use crate::api::{
  Coordinates, FavoriteItem, RemoteApi, VenueDetail, VenueFilters, VenuePage, VenueSummary,
};
use crate::cache::Clock;
use crate::error::{Error, Result};
use crate::kv::KeyValueStore;
use crate::prefetch::{ImageCache, LocationProvider, PermissionStatus};

pub fn summary(id: &str) -> VenueSummary {
  VenueSummary {
    id: id.to_string(),
    slug: format!("motel-{}", id),
    name: format!("Venue {}", id),
    neighborhood: Some("Roma Norte".to_string()),
    city: Some("CDMX".to_string()),
    starting_price: Some(450.0),
    amenities: vec!["jacuzzi".to_string()],
    rating: Some(4.5),
    plan: "basic".to_string(),
    has_promo: false,
    coordinates: Some(Coordinates {
      latitude: 19.41,
      longitude: -99.16,
    }),
    photos: vec![format!("https://cdn.example/{}.jpg", id)],
    thumbnail: Some(format!("https://cdn.example/{}.jpg", id)),
  }
}

pub fn detail(id: &str) -> VenueDetail {
  VenueDetail {
    summary: summary(id),
    address: Some(format!("Calle {} 12", id)),
    description: None,
    contact: Contact {
      phone: Some("5555555555".to_string()),
      ..Default::default()
    },
    schedules: Vec::new(),
    rooms: Vec::new(),
    menu: Vec::new(),
    promos: Vec::new(),
    all_photos: vec![format!("https://cdn.example/{}.jpg", id)],
    updated_at: None,
  }
}

/// Settable clock in epoch milliseconds.
pub struct ManualClock(AtomicI64);

impl ManualClock {
  pub fn new(now_ms: i64) -> Self {
    Self(AtomicI64::new(now_ms))
  }

  pub fn advance(&self, ms: i64) {
    self.0.fetch_add(ms, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_ms(&self) -> i64 {
    self.0.load(Ordering::SeqCst)
  }
}

/// Store where every operation fails.
pub struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
  async fn get_item(&self, _key: &str) -> Result<Option<String>> {
    Err(Error::storage("disk unavailable"))
  }

  async fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
    Err(Error::storage("disk unavailable"))
  }

  async fn remove_item(&self, _key: &str) -> Result<()> {
    Err(Error::storage("disk unavailable"))
  }

  async fn multi_remove(&self, _keys: &[String]) -> Result<()> {
    Err(Error::storage("disk unavailable"))
  }

  async fn get_all_keys(&self) -> Result<Vec<String>> {
    Err(Error::storage("disk unavailable"))
  }
}

#[derive(Default)]
struct FakeState {
  venues: Vec<VenueDetail>,
  remote_favorites: Vec<FavoriteItem>,
  watermark: Option<String>,
  offline: bool,
  invalid: bool,
  fail_mutations: bool,
  auth_expired: bool,
  latency: Option<Duration>,
  rejected: HashSet<String>,
  failing_details: HashSet<String>,
  last_filters: Option<VenueFilters>,
}

/// Scriptable in-memory backend.
#[derive(Default)]
pub struct FakeApi {
  state: Mutex<FakeState>,
  list_calls: AtomicUsize,
  detail_calls: AtomicUsize,
  mutation_calls: AtomicUsize,
}

impl FakeApi {
  pub fn with_venues(ids: &[&str]) -> Self {
    let api = Self::default();
    api.state().venues = ids.iter().map(|id| detail(id)).collect();
    api
  }

  fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
    self.state.lock().unwrap()
  }

  fn favorite_for(state: &FakeState, id: &str) -> FavoriteItem {
    state
      .venues
      .iter()
      .find(|v| v.summary.id == id)
      .map(|v| FavoriteItem::from(&v.summary))
      .unwrap_or_else(|| FavoriteItem::stub(id))
  }

  pub fn set_offline(&self, offline: bool) {
    self.state().offline = offline;
  }

  /// Make every listing response undecodable.
  pub fn set_invalid(&self, invalid: bool) {
    self.state().invalid = invalid;
  }

  pub fn set_watermark(&self, watermark: Option<&str>) {
    self.state().watermark = watermark.map(str::to_string);
  }

  pub fn set_fail_mutations(&self, fail: bool) {
    self.state().fail_mutations = fail;
  }

  /// Favorites endpoints answer 401.
  pub fn set_auth_expired(&self, expired: bool) {
    self.state().auth_expired = expired;
  }

  /// Delay applied to `list_favorites`.
  pub fn set_latency(&self, latency: Duration) {
    self.state().latency = Some(latency);
  }

  /// Server refuses to add `id`.
  pub fn reject_favorite(&self, id: &str) {
    self.state().rejected.insert(id.to_string());
  }

  /// `get_venue(id)` fails with a network error.
  pub fn fail_detail(&self, id: &str) {
    self.state().failing_details.insert(id.to_string());
  }

  pub fn set_remote_favorites(&self, ids: &[&str]) {
    let mut state = self.state();
    let items = ids.iter().map(|id| Self::favorite_for(&state, id)).collect();
    state.remote_favorites = items;
  }

  pub fn remote_favorite_ids(&self) -> Vec<String> {
    self
      .state()
      .remote_favorites
      .iter()
      .map(|item| item.id.clone())
      .collect()
  }

  pub fn last_filters(&self) -> Option<VenueFilters> {
    self.state().last_filters.clone()
  }

  pub fn list_calls(&self) -> usize {
    self.list_calls.load(Ordering::SeqCst)
  }

  pub fn detail_calls(&self) -> usize {
    self.detail_calls.load(Ordering::SeqCst)
  }

  pub fn mutation_calls(&self) -> usize {
    self.mutation_calls.load(Ordering::SeqCst)
  }

  fn check_mutation(&self, venue_id: &str) -> Result<()> {
    self.mutation_calls.fetch_add(1, Ordering::SeqCst);
    let state = self.state();
    if state.auth_expired {
      return Err(Error::AuthExpired);
    }
    if state.offline || state.fail_mutations {
      return Err(Error::network("connection reset"));
    }
    if state.rejected.contains(venue_id) {
      return Err(Error::invalid("422 Unprocessable Entity"));
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteApi for FakeApi {
  async fn list_venues(&self, filters: &VenueFilters) -> Result<VenuePage> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    let mut state = self.state();
    state.last_filters = Some(filters.clone());
    if state.offline {
      return Err(Error::network("connection refused"));
    }
    if state.invalid {
      return Err(Error::invalid("expected value at line 1 column 1"));
    }

    Ok(VenuePage {
      venues: state.venues.iter().map(|v| v.summary.clone()).collect(),
      latest_updated_at: state.watermark.clone(),
    })
  }

  async fn get_venue(&self, id_or_slug: &str) -> Result<VenueDetail> {
    self.detail_calls.fetch_add(1, Ordering::SeqCst);
    let state = self.state();
    if state.offline || state.failing_details.contains(id_or_slug) {
      return Err(Error::network("connection refused"));
    }

    state
      .venues
      .iter()
      .find(|v| v.summary.id == id_or_slug || v.summary.slug == id_or_slug)
      .cloned()
      .ok_or_else(|| Error::NotFoundOrOffline(format!("venue {}", id_or_slug)))
  }

  async fn list_favorites(&self, _token: &str) -> Result<Vec<FavoriteItem>> {
    let latency = self.state().latency;
    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }

    let state = self.state();
    if state.auth_expired {
      return Err(Error::AuthExpired);
    }
    if state.offline {
      return Err(Error::network("connection refused"));
    }
    Ok(state.remote_favorites.clone())
  }

  async fn add_favorite(&self, _token: &str, venue_id: &str) -> Result<()> {
    self.check_mutation(venue_id)?;
    let mut state = self.state();
    if !state.remote_favorites.iter().any(|item| item.id == venue_id) {
      let item = Self::favorite_for(&state, venue_id);
      state.remote_favorites.push(item);
    }
    Ok(())
  }

  async fn remove_favorite(&self, _token: &str, venue_id: &str) -> Result<()> {
    self.check_mutation(venue_id)?;
    self
      .state()
      .remote_favorites
      .retain(|item| item.id != venue_id);
    Ok(())
  }
}

/// Records every requested URL. URLs marked with [`FakeImageCache::fail`] report failure.
#[derive(Default)]
pub struct FakeImageCache {
  requested: Mutex<Vec<String>>,
  failing: Mutex<HashSet<String>>,
}

impl FakeImageCache {
  pub fn fail(&self, url: &str) {
    self.failing.lock().unwrap().insert(url.to_string());
  }

  pub fn requested(&self) -> Vec<String> {
    self.requested.lock().unwrap().clone()
  }
}

#[async_trait]
impl ImageCache for FakeImageCache {
  async fn prefetch(&self, url: &str) -> bool {
    self.requested.lock().unwrap().push(url.to_string());
    !self.failing.lock().unwrap().contains(url)
  }
}

pub struct FakeLocation {
  state: Mutex<(PermissionStatus, Option<Coordinates>)>,
  current_calls: AtomicUsize,
}

impl Default for FakeLocation {
  fn default() -> Self {
    Self {
      state: Mutex::new((PermissionStatus::Undetermined, None)),
      current_calls: AtomicUsize::new(0),
    }
  }
}

impl FakeLocation {
  pub fn grant(&self, last_known: Option<Coordinates>) {
    *self.state.lock().unwrap() = (PermissionStatus::Granted, last_known);
  }

  pub fn current_position_calls(&self) -> usize {
    self.current_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl LocationProvider for FakeLocation {
  async fn permission_status(&self) -> PermissionStatus {
    self.state.lock().unwrap().0
  }

  async fn last_known_position(&self) -> Option<Coordinates> {
    self.state.lock().unwrap().1
  }

  async fn current_position(&self) -> Result<Coordinates> {
    self.current_calls.fetch_add(1, Ordering::SeqCst);
    self
      .state
      .lock()
      .unwrap()
      .1
      .ok_or_else(|| Error::NotFoundOrOffline("device location".to_string()))
  }
}
