//! Favorites state machine: load, local→cloud sync, toggle, backfill.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stored::StoredFavorites;
use crate::api::{FavoriteItem, RemoteApi, VenueSummary};
use crate::cache::keys::FAVORITES_KEY;
use crate::config::FavoritesConfig;
use crate::error::Error;
use crate::kv::KeyValueStore;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoritesState {
  Uninitialized,
  Loading,
  Ready,
}

/// Input for the add/remove sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteFeedback {
  Added { id: String },
  Removed { id: String },
}

/// Process-scoped preferences, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FavoritesPreferences {
  pub sound_enabled: bool,
  /// Consecutive failed remote mutations after which the next toggle first reloads
  /// from the server. 0 disables.
  pub reconcile_after_failures: u32,
}

impl Default for FavoritesPreferences {
  fn default() -> Self {
    Self::from(&FavoritesConfig::default())
  }
}

impl From<&FavoritesConfig> for FavoritesPreferences {
  fn from(config: &FavoritesConfig) -> Self {
    Self {
      sound_enabled: config.sound,
      reconcile_after_failures: config.reconcile_after_failures,
    }
  }
}

/// Outcome of a local→cloud sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Local-only favorites added to the remote store
  pub uploaded: usize,
  /// Uploads that failed and were skipped
  pub failed: usize,
  /// The remote list could not be fetched, so nothing was uploaded
  pub remote_unavailable: bool,
}

struct Snapshot {
  state: FavoritesState,
  items: Vec<FavoriteItem>,
  ids: HashSet<String>,
}

/// State owned by whichever operation currently holds the queue.
#[derive(Default)]
struct Queue {
  consecutive_failures: u32,
}

/// Authoritative in-memory favorites for the process lifetime.
///
/// Every operation runs through a single-flight queue, so a toggle issued while a load
/// is in flight is applied after the load, never interleaved with it. Reads
/// (`is_favorite`, `favorites`) never wait on the queue.
pub struct FavoritesStore {
  store: Arc<dyn KeyValueStore>,
  api: Arc<dyn RemoteApi>,
  session: watch::Receiver<Session>,
  prefs: FavoritesPreferences,
  feedback: Option<mpsc::UnboundedSender<FavoriteFeedback>>,
  queue: Mutex<Queue>,
  snapshot: RwLock<Snapshot>,
  auth_expired: AtomicBool,
}

impl FavoritesStore {
  pub fn new(
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn RemoteApi>,
    session: watch::Receiver<Session>,
    prefs: FavoritesPreferences,
  ) -> Self {
    Self {
      store,
      api,
      session,
      prefs,
      feedback: None,
      queue: Mutex::new(Queue::default()),
      snapshot: RwLock::new(Snapshot {
        state: FavoritesState::Uninitialized,
        items: Vec::new(),
        ids: HashSet::new(),
      }),
      auth_expired: AtomicBool::new(false),
    }
  }

  /// Send add/remove feedback to `tx` when sound is enabled.
  pub fn with_feedback(mut self, tx: mpsc::UnboundedSender<FavoriteFeedback>) -> Self {
    self.feedback = Some(tx);
    self
  }

  pub fn state(&self) -> FavoritesState {
    self.read_snapshot(|s| s.state)
  }

  pub fn favorites(&self) -> Vec<FavoriteItem> {
    self.read_snapshot(|s| s.items.clone())
  }

  /// Whether `id` is in the current set, complete snapshot or not.
  pub fn is_favorite(&self, id: &str) -> bool {
    self.read_snapshot(|s| s.ids.contains(id))
  }

  /// Whether the server rejected the token since the last call. Clears the flag.
  pub fn take_auth_expired(&self) -> bool {
    self.auth_expired.swap(false, Ordering::SeqCst)
  }

  /// Run the load protocol and return the resulting favorites.
  pub async fn load(&self) -> Vec<FavoriteItem> {
    let _queue = self.queue.lock().await;
    self.set_state(FavoritesState::Loading);
    let items = self.load_locked().await;
    self.publish(items.clone());
    items
  }

  /// Union-merge local favorites into the remote store, then reload from it.
  ///
  /// Only adds: local-only favorites are uploaded one by one, remote-only ones are kept.
  /// Does nothing but a load when the session is not authenticated.
  pub async fn sync_local_to_cloud(&self) -> SyncReport {
    let _queue = self.queue.lock().await;
    let session = self.current_session();
    let mut report = SyncReport::default();
    self.set_state(FavoritesState::Loading);

    if let Some(token) = session.bearer() {
      let local = self.read_local().await;
      if !local.is_empty() {
        match self.api.list_favorites(token).await {
          Ok(remote) => {
            let remote_ids: HashSet<&str> = remote.iter().map(|item| item.id.as_str()).collect();
            for item in local.iter().filter(|item| !remote_ids.contains(item.id.as_str())) {
              match self.api.add_favorite(token, &item.id).await {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                  self.note_remote_error(&e);
                  report.failed += 1;
                  warn!(id = %item.id, error = %e, "failed to upload local favorite");
                }
              }
            }
          }
          Err(e) => {
            self.note_remote_error(&e);
            report.remote_unavailable = true;
            warn!(error = %e, "could not fetch remote favorites, skipping upload");
          }
        }
      }
    }

    let items = self.load_locked().await;
    self.publish(items);
    info!(
      uploaded = report.uploaded,
      failed = report.failed,
      remote_unavailable = report.remote_unavailable,
      "favorites sync finished"
    );
    report
  }

  /// Add or remove `venue` and return whether it is a favorite afterwards.
  ///
  /// The change always takes visible effect. When authenticated and the remote call
  /// fails, it is applied locally only and the divergence heals on the next load.
  pub async fn toggle(&self, venue: &VenueSummary) -> bool {
    self.toggle_item(FavoriteItem::from(venue)).await
  }

  /// [`Self::toggle`] for a venue known only by its favorite snapshot, which may be an
  /// `{id}`-only stub when the venue page can't be fetched.
  pub async fn toggle_item(&self, item: FavoriteItem) -> bool {
    let mut queue = self.queue.lock().await;
    if self.state() != FavoritesState::Ready {
      let items = self.load_locked().await;
      self.publish(items);
    }

    let session = self.current_session();
    if let Some(token) = session.bearer() {
      let threshold = self.prefs.reconcile_after_failures;
      if threshold > 0 && queue.consecutive_failures >= threshold {
        warn!(
          failures = queue.consecutive_failures,
          "reloading favorites from server after repeated mutation failures"
        );
        let items = self.load_locked().await;
        self.publish(items);
        queue.consecutive_failures = 0;
      }

      let is_removing = self.is_favorite(&item.id);
      let result = if is_removing {
        self.api.remove_favorite(token, &item.id).await
      } else {
        self.api.add_favorite(token, &item.id).await
      };

      match result {
        Ok(()) => queue.consecutive_failures = 0,
        Err(e) => {
          self.note_remote_error(&e);
          queue.consecutive_failures += 1;
          warn!(
            id = %item.id,
            removing = is_removing,
            failures = queue.consecutive_failures,
            error = %e,
            "remote favorite update failed, applied locally only; client and server diverge until next load"
          );
        }
      }
      self.apply_local(item, is_removing).await
    } else {
      let is_removing = self.is_favorite(&item.id);
      self.apply_local(item, is_removing).await
    }
  }

  /// Replace an `{id}`-only favorite with a full snapshot of `venue`.
  /// Returns false when `venue` is not a favorite or is already complete.
  pub async fn backfill(&self, venue: &VenueSummary) -> bool {
    let _queue = self.queue.lock().await;
    let mut items = self.favorites();
    let Some(item) = items
      .iter_mut()
      .find(|item| item.id == venue.id && item.is_stub())
    else {
      return false;
    };

    *item = FavoriteItem::from(venue);
    debug!(id = %venue.id, "backfilled favorite snapshot");
    self.publish(items.clone());
    self.persist(&items).await;
    true
  }

  /// React to an authentication transition.
  pub async fn on_session_changed(&self, previous: &Session, next: &Session) {
    match (previous.is_authenticated, next.is_authenticated) {
      (false, true) => {
        self.sync_local_to_cloud().await;
      }
      (true, false) => {
        self.load().await;
      }
      _ => {}
    }
  }

  /// Follow session transitions for as long as the session channel is open.
  pub fn watch_session(self: Arc<Self>) -> JoinHandle<()> {
    let mut rx = self.session.clone();
    let mut previous = rx.borrow_and_update().clone();
    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let next = rx.borrow_and_update().clone();
        self.on_session_changed(&previous, &next).await;
        previous = next;
      }
    })
  }

  // ==========================================================================
  // Queue-held helpers
  // ==========================================================================

  /// Remote truth when authenticated and reachable, local backup otherwise.
  async fn load_locked(&self) -> Vec<FavoriteItem> {
    let session = self.current_session();
    if let Some(token) = session.bearer() {
      match self.api.list_favorites(token).await {
        Ok(mut remote) => {
          self.backfill_from_memory(&mut remote);
          self.persist(&remote).await;
          return remote;
        }
        Err(e) => {
          self.note_remote_error(&e);
          warn!(error = %e, "remote favorites unavailable, using local copy");
        }
      }
    }
    self.read_local().await
  }

  /// Read the persisted favorites, migrating the legacy id-only format in place.
  async fn read_local(&self) -> Vec<FavoriteItem> {
    let raw = match self.store.get_item(FAVORITES_KEY).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        warn!(error = %e, "failed to read local favorites");
        return Vec::new();
      }
    };

    match StoredFavorites::parse(&raw) {
      Ok(stored) => {
        let legacy = stored.is_legacy();
        let items = stored.migrate();
        if legacy {
          info!(count = items.len(), "migrating legacy favorites format");
          self.persist(&items).await;
        }
        items
      }
      Err(e) => {
        warn!(error = %e, "discarding unreadable local favorites");
        Vec::new()
      }
    }
  }

  async fn persist(&self, items: &[FavoriteItem]) {
    let raw = match serde_json::to_string(items) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(error = %e, "failed to serialize favorites");
        return;
      }
    };
    if let Err(e) = self.store.set_item(FAVORITES_KEY, &raw).await {
      warn!(error = %e, "failed to persist favorites");
    }
  }

  /// Apply an add/remove to memory, then persist. Returns the new membership.
  async fn apply_local(&self, item: FavoriteItem, is_removing: bool) -> bool {
    let id = item.id.clone();
    let mut items = self.favorites();
    if is_removing {
      items.retain(|existing| existing.id != id);
    } else if !items.iter().any(|existing| existing.id == id) {
      items.push(item);
    }

    self.publish(items.clone());
    self.persist(&items).await;

    self.emit(if is_removing {
      FavoriteFeedback::Removed { id }
    } else {
      FavoriteFeedback::Added { id }
    });
    !is_removing
  }

  // ==========================================================================
  // Snapshot access
  // ==========================================================================

  fn note_remote_error(&self, e: &Error) {
    if *e == Error::AuthExpired {
      self.auth_expired.store(true, Ordering::SeqCst);
    }
  }

  fn current_session(&self) -> Session {
    self.session.borrow().clone()
  }

  /// Keep display fields we already have when the server only returned ids.
  fn backfill_from_memory(&self, remote: &mut [FavoriteItem]) {
    self.read_snapshot(|s| {
      for item in remote.iter_mut().filter(|item| item.is_stub()) {
        if let Some(known) = s.items.iter().find(|k| k.id == item.id && !k.is_stub()) {
          *item = known.clone();
        }
      }
    });
  }

  fn read_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
    let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
    f(&snapshot)
  }

  fn set_state(&self, state: FavoritesState) {
    self
      .snapshot
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .state = state;
  }

  fn publish(&self, items: Vec<FavoriteItem>) {
    let ids = items.iter().map(|item| item.id.clone()).collect();
    let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
    *snapshot = Snapshot {
      state: FavoritesState::Ready,
      items,
      ids,
    };
  }

  fn emit(&self, feedback: FavoriteFeedback) {
    if !self.prefs.sound_enabled {
      return;
    }
    if let Some(tx) = &self.feedback {
      // Receiver may have been dropped
      let _ = tx.send(feedback);
    }
  }
}
