//! Best-effort background cache warming.
//!
//! Nothing here is allowed to get in the way of the foreground: work starts only after
//! the current interaction settles, every item is failure-isolated, and nothing is
//! retried. A skipped item is simply fetched on the next organic cache miss.

mod images;
mod location;

pub use images::{HttpImageCache, ImageCache};
pub use location::{LocationProvider, PermissionStatus, StaticLocation};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{VenueFilters, VenueSummary};
use crate::config::PrefetchConfig;
use crate::repository::ResourceRepository;

/// What a prefetch run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
  pub details_warmed: usize,
  /// Already cached and fresh
  pub details_skipped: usize,
  pub details_failed: usize,
  pub images_warmed: usize,
  pub images_failed: usize,
}

enum DetailOutcome {
  Warmed,
  Skipped,
  Failed,
}

#[derive(Clone)]
pub struct PrefetchScheduler {
  repo: ResourceRepository,
  images: Arc<dyn ImageCache>,
  location: Arc<dyn LocationProvider>,
  config: PrefetchConfig,
}

impl PrefetchScheduler {
  pub fn new(
    repo: ResourceRepository,
    images: Arc<dyn ImageCache>,
    location: Arc<dyn LocationProvider>,
    config: PrefetchConfig,
  ) -> Self {
    Self {
      repo,
      images,
      location,
      config,
    }
  }

  /// Warm caches for `candidates` in the background once the foreground settles.
  pub fn schedule(&self, candidates: Vec<VenueSummary>) -> JoinHandle<PrefetchReport> {
    let this = self.clone();
    tokio::spawn(async move {
      this.settle().await;
      this.run(&candidates).await
    })
  }

  /// Background variant of [`Self::prefetch_nearby`].
  pub fn schedule_nearby(&self) -> JoinHandle<PrefetchReport> {
    let this = self.clone();
    tokio::spawn(async move {
      this.settle().await;
      this.prefetch_nearby().await
    })
  }

  async fn settle(&self) {
    tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
    tokio::task::yield_now().await;
  }

  /// Warm venue pages and thumbnails for the first `candidates` venues.
  pub async fn run(&self, candidates: &[VenueSummary]) -> PrefetchReport {
    let candidates = &candidates[..candidates.len().min(self.config.candidates)];
    let ids: Vec<String> = candidates.iter().map(|v| v.id.clone()).collect();
    let urls: Vec<String> = candidates.iter().filter_map(|v| v.thumbnail.clone()).collect();

    let (mut report, images) = tokio::join!(self.warm_details(&ids), self.warm_images(&urls));
    report.images_warmed = images.images_warmed;
    report.images_failed = images.images_failed;

    info!(
      warmed = report.details_warmed,
      skipped = report.details_skipped,
      failed = report.details_failed,
      images = report.images_warmed,
      "prefetch finished"
    );
    report
  }

  /// Fetch venue pages in small concurrent batches with a pause in between.
  /// Pages already cached are skipped.
  pub async fn warm_details(&self, ids: &[String]) -> PrefetchReport {
    let mut report = PrefetchReport::default();
    let pause = Duration::from_millis(self.config.batch_pause_ms);

    for (i, batch) in ids.chunks(self.config.batch_size.max(1)).enumerate() {
      if i > 0 {
        tokio::time::sleep(pause).await;
      }

      for outcome in join_all(batch.iter().map(|id| self.warm_one(id))).await {
        match outcome {
          DetailOutcome::Warmed => report.details_warmed += 1,
          DetailOutcome::Skipped => report.details_skipped += 1,
          DetailOutcome::Failed => report.details_failed += 1,
        }
      }
    }

    report
  }

  async fn warm_one(&self, id: &str) -> DetailOutcome {
    if self.repo.is_detail_cached(id).await {
      return DetailOutcome::Skipped;
    }

    match self.repo.warm_detail(id).await {
      Ok(()) => DetailOutcome::Warmed,
      Err(e) => {
        debug!(id, error = %e, "detail prefetch failed");
        DetailOutcome::Failed
      }
    }
  }

  /// Fetch every URL in parallel. Individual failures are counted, not raised.
  pub async fn warm_images(&self, urls: &[String]) -> PrefetchReport {
    let results = join_all(urls.iter().map(|url| self.images.prefetch(url))).await;
    let warmed = results.iter().filter(|ok| **ok).count();

    PrefetchReport {
      images_warmed: warmed,
      images_failed: results.len() - warmed,
      ..Default::default()
    }
  }

  /// Warm the venues around the last known position.
  ///
  /// Checks permission without prompting and does nothing when it is not granted or
  /// no position is known yet. Never asks for a fresh fix.
  pub async fn prefetch_nearby(&self) -> PrefetchReport {
    let status = self.location.permission_status().await;
    if status != PermissionStatus::Granted {
      debug!(?status, "skipping nearby prefetch without location permission");
      return PrefetchReport::default();
    }

    let Some(position) = self.location.last_known_position().await else {
      debug!("skipping nearby prefetch without a known position");
      return PrefetchReport::default();
    };

    let filters = VenueFilters {
      near: Some((position, self.config.nearby_radius_km)),
      ..Default::default()
    };

    match self.repo.fetch_venues(&filters).await {
      Ok(result) => self.run(&result.data).await,
      Err(e) => {
        debug!(error = %e, "nearby venue list prefetch failed");
        PrefetchReport::default()
      }
    }
  }
}
