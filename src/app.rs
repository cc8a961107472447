use chrono::Local;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{FavoriteItem, HttpApi, RemoteApi, VenueDetail, VenueFilters, VenueSummary};
use crate::cache::{CachePolicy, CacheResult, CacheSource, TtlCache};
use crate::config::Config;
use crate::error::Error;
use crate::favorites::{FavoriteFeedback, FavoritesPreferences, FavoritesStore};
use crate::kv::{KeyValueStore, NoopStore, SqliteStore};
use crate::prefetch::{
  HttpImageCache, LocationProvider, PrefetchReport, PrefetchScheduler, StaticLocation,
};
use crate::recent::RecentActivityLog;
use crate::repository::ResourceRepository;
use crate::session::{Session, SessionHandle};
use crate::{CacheCommand, Command, FavoritesCommand};

/// Main application state
pub struct App {
  config: Config,
  session: SessionHandle,
  cache: TtlCache,
  repo: ResourceRepository,
  favorites: Arc<FavoritesStore>,
  prefetch: PrefetchScheduler,
  location: Arc<dyn LocationProvider>,
  feedback: mpsc::UnboundedReceiver<FavoriteFeedback>,
  listener: JoinHandle<()>,
}

impl App {
  pub async fn new(config: Config) -> Result<Self> {
    // Favorites always persist, even with caching disabled
    let db = Arc::new(SqliteStore::open(config.cache.path.as_deref())?);
    let cache_store: Arc<dyn KeyValueStore> = if config.cache.enabled {
      db.clone()
    } else {
      Arc::new(NoopStore)
    };

    let cache = TtlCache::new(cache_store);
    let policy = CachePolicy::from(&config.cache);
    let recent = RecentActivityLog::new(cache.clone(), policy);

    let api: Arc<dyn RemoteApi> = Arc::new(HttpApi::new(&config.api)?);
    let repo = ResourceRepository::new(api.clone(), cache.clone(), recent, policy)
      .with_caching(config.cache.enabled);

    let session = SessionHandle::new(match Config::get_api_token() {
      Some(token) => Session::authenticated(token),
      None => Session::guest(),
    });

    let (tx, feedback) = mpsc::unbounded_channel();
    let favorites = Arc::new(
      FavoritesStore::new(
        db,
        api,
        session.subscribe(),
        FavoritesPreferences::from(&config.favorites),
      )
      .with_feedback(tx),
    );
    let listener = favorites.clone().watch_session();

    let location: Arc<dyn LocationProvider> = Arc::new(StaticLocation::from(&config.location));
    let prefetch = PrefetchScheduler::new(
      repo.clone(),
      Arc::new(HttpImageCache::new(None)?),
      location.clone(),
      config.prefetch.clone(),
    );

    Ok(Self {
      config,
      session,
      cache,
      repo,
      favorites,
      prefetch,
      location,
      feedback,
      listener,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    let result = match command {
      Command::Venues {
        city,
        neighborhood,
        search,
        plan,
        amenities,
        promo,
        near_me,
      } => {
        let mut filters = VenueFilters {
          city,
          neighborhood,
          search,
          plan,
          amenities,
          has_promo: promo,
          ..Default::default()
        };
        if near_me {
          let position = self
            .location
            .current_position()
            .await
            .map_err(|e| eyre!("No current position available: {}", e))?;
          filters.near = Some((position, self.config.prefetch.nearby_radius_km));
        }
        self.venues(filters).await
      }
      Command::Show { id_or_slug } => self.show(&id_or_slug).await,
      Command::Favorites { command } => match command {
        FavoritesCommand::List => self.list_favorites().await,
        FavoritesCommand::Toggle { id_or_slug } => self.toggle_favorite(&id_or_slug).await,
        FavoritesCommand::Sync => self.sync_favorites().await,
      },
      Command::Recent { clear } => self.recent(clear).await,
      Command::History { clear } => self.history(clear).await,
      Command::Prefetch { nearby } => self.warm(nearby).await,
      Command::Cache {
        command: CacheCommand::Clear,
      } => {
        let removed = self.cache.clear_cached_data().await;
        println!("Removed {} cached entries", removed);
        Ok(())
      }
    };

    self.finish().await;
    Ok(result?)
  }

  async fn venues(&self, filters: VenueFilters) -> Result<(), Error> {
    if let Some(term) = filters.search.as_deref() {
      self.repo.recent().add_to_search_history(term).await;
    }

    let result = self.guard(self.repo.fetch_venues(&filters).await)?;
    self.favorites.load().await;

    println!("{}", header("Venues", &result));
    if result.data.is_empty() {
      println!("  (none)");
    }
    for venue in &result.data {
      println!("{}", self.venue_line(venue));
    }

    // Warm the first few pages while the user reads the list
    let report = self.join(self.prefetch.schedule(result.data)).await;
    debug!(?report, "list prefetch");
    Ok(())
  }

  async fn show(&self, id_or_slug: &str) -> Result<(), Error> {
    let result = self.guard(self.repo.get_detail(id_or_slug).await)?;
    self.favorites.load().await;
    self.favorites.backfill(&result.data.summary).await;

    println!("{}", header(&result.data.summary.name, &result));
    print_detail(&result.data, self.favorites.is_favorite(&result.data.summary.id));
    Ok(())
  }

  async fn list_favorites(&self) -> Result<(), Error> {
    let items = self.favorites.load().await;
    println!("Favorites");
    if items.is_empty() {
      println!("  (none)");
    }
    for item in &items {
      println!("{}", favorite_line(item));
    }
    Ok(())
  }

  async fn toggle_favorite(&self, id_or_slug: &str) -> Result<(), Error> {
    let item = self.guard(favorite_target(&self.repo, &self.favorites, id_or_slug).await)?;
    let name = item.name.clone().unwrap_or_else(|| item.id.clone());
    if self.favorites.toggle_item(item).await {
      println!("Added {} to favorites", name);
    } else {
      println!("Removed {} from favorites", name);
    }
    Ok(())
  }

  async fn sync_favorites(&self) -> Result<(), Error> {
    if !self.session.current().is_authenticated {
      println!("Not signed in. Set MOTELES_API_TOKEN to sync favorites.");
      return Ok(());
    }

    let report = self.favorites.sync_local_to_cloud().await;
    if report.remote_unavailable {
      println!("Server unreachable, nothing uploaded");
    } else {
      println!("Uploaded {} favorites ({} failed)", report.uploaded, report.failed);
    }
    Ok(())
  }

  async fn recent(&self, clear: bool) -> Result<(), Error> {
    let recent = self.repo.recent();
    if clear {
      recent.clear_recent_views().await;
      println!("Cleared recently viewed venues");
      return Ok(());
    }

    println!("Recently viewed");
    for venue in recent.recent_views().await {
      println!("{}", self.venue_line(&venue));
    }
    Ok(())
  }

  async fn history(&self, clear: bool) -> Result<(), Error> {
    let recent = self.repo.recent();
    if clear {
      recent.clear_search_history().await;
      println!("Cleared search history");
      return Ok(());
    }

    println!("Recent searches");
    for term in recent.search_history().await {
      println!("  {}", term);
    }
    Ok(())
  }

  async fn warm(&self, nearby: bool) -> Result<(), Error> {
    let report = if nearby {
      self.join(self.prefetch.schedule_nearby()).await
    } else {
      let result = self.guard(self.repo.fetch_venues(&VenueFilters::default()).await)?;
      self.join(self.prefetch.schedule(result.data)).await
    };

    println!(
      "Warmed {} venue pages ({} already cached, {} failed), {} images ({} failed)",
      report.details_warmed,
      report.details_skipped,
      report.details_failed,
      report.images_warmed,
      report.images_failed
    );
    Ok(())
  }

  // ==========================================================================
  // Helpers
  // ==========================================================================

  /// Drop to guest mode when the server rejected the token.
  fn guard<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
    if let Err(Error::AuthExpired) = &result {
      self.session.sign_out();
    }
    result
  }

  async fn join(&self, handle: JoinHandle<PrefetchReport>) -> PrefetchReport {
    handle.await.unwrap_or_else(|e| {
      warn!(error = %e, "prefetch task failed");
      PrefetchReport::default()
    })
  }

  async fn finish(&mut self) {
    self.repo.flush().await;

    if self.favorites.take_auth_expired() {
      eprintln!("Session expired, continuing as guest");
      self.session.sign_out();
    }

    // Terminal bell stands in for the add/remove sound
    while let Ok(feedback) = self.feedback.try_recv() {
      debug!(?feedback, "favorite feedback");
      print!("\x07");
    }

    self.listener.abort();
  }

  fn venue_line(&self, venue: &VenueSummary) -> String {
    let star = if self.favorites.is_favorite(&venue.id) {
      "★"
    } else {
      " "
    };
    let place = [venue.neighborhood.as_deref(), venue.city.as_deref()]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>()
      .join(", ");
    let mut line = format!(
      "{} {:<32} {:<28} {}",
      star,
      venue.name,
      place,
      price(venue.starting_price)
    );
    if let Some(rating) = venue.rating {
      line.push_str(&format!("  {:.1}★", rating));
    }
    if venue.has_promo {
      line.push_str("  promo");
    }
    line
  }
}

/// Resolve what a toggle should act on.
///
/// Without a reachable or cached venue page, falls back to the matching favorite, then to
/// an `{id}`-only stub, so the toggle still takes effect offline.
async fn favorite_target(
  repo: &ResourceRepository,
  favorites: &FavoritesStore,
  id_or_slug: &str,
) -> Result<FavoriteItem, Error> {
  match repo.load_detail(id_or_slug).await {
    Ok(result) => Ok(FavoriteItem::from(&result.data.summary)),
    Err(e) if e.is_transient() || matches!(e, Error::NotFoundOrOffline(_)) => {
      favorites.load().await;
      let known = favorites
        .favorites()
        .into_iter()
        .find(|item| item.id == id_or_slug || item.slug.as_deref() == Some(id_or_slug));
      warn!(
        id_or_slug,
        known = known.is_some(),
        error = %e,
        "venue page unavailable, toggling from favorites"
      );
      Ok(known.unwrap_or_else(|| FavoriteItem::stub(id_or_slug)))
    }
    Err(e) => Err(e),
  }
}

fn header<T>(title: &str, result: &CacheResult<T>) -> String {
  match (result.source, result.cached_at) {
    (CacheSource::Offline, Some(at)) => format!(
      "{} (offline, cached {})",
      title,
      at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    ),
    _ => title.to_string(),
  }
}

fn price(amount: Option<f64>) -> String {
  match amount {
    Some(amount) => format!("from ${:.0}", amount),
    None => String::new(),
  }
}

fn favorite_line(item: &FavoriteItem) -> String {
  match item.name.as_deref() {
    Some(name) => {
      let place = item.neighborhood.as_deref().unwrap_or("");
      format!("★ {:<32} {:<20} {}", name, place, price(item.starting_price))
    }
    None => format!("★ {} (open it to load details)", item.id),
  }
}

fn print_detail(detail: &VenueDetail, is_favorite: bool) {
  let venue = &detail.summary;
  if is_favorite {
    println!("  ★ in your favorites");
  }
  if let Some(address) = &detail.address {
    println!("  {}", address);
  }
  let starting = price(venue.starting_price);
  if !starting.is_empty() {
    println!("  {}", starting);
  }
  if let Some(description) = &detail.description {
    println!("\n  {}\n", description);
  }
  if !venue.amenities.is_empty() {
    println!("  Amenities: {}", venue.amenities.join(", "));
  }

  let contact = &detail.contact;
  for (label, value) in [
    ("Phone", &contact.phone),
    ("WhatsApp", &contact.whatsapp),
    ("Web", &contact.website),
    ("Email", &contact.email),
  ] {
    if let Some(value) = value {
      println!("  {}: {}", label, value);
    }
  }

  for schedule in &detail.schedules {
    match (&schedule.opens, &schedule.closes) {
      (Some(opens), Some(closes)) => println!("  {} {}-{}", schedule.day, opens, closes),
      _ => println!("  {}", schedule.day),
    }
  }

  if !detail.rooms.is_empty() {
    println!("  Rooms:");
    for room in &detail.rooms {
      println!("    {:<28} {}", room.name, price(room.price));
    }
  }

  if !detail.menu.is_empty() {
    println!("  Menu:");
    for item in &detail.menu {
      println!("    {:<28} {}", item.name, price(item.price));
    }
  }

  for promo in &detail.promos {
    match &promo.valid_until {
      Some(until) => println!("  Promo: {} (until {})", promo.title, until),
      None => println!("  Promo: {}", promo.title),
    }
  }

  println!("  {} photos", detail.all_photos.len());
}
