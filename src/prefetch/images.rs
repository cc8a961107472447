//! Thumbnail warm-up.

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Larger bodies are abandoned mid-download.
pub const MAX_IMAGE_BYTES: u64 = 8 * 1024 * 1024;

#[async_trait]
pub trait ImageCache: Send + Sync {
  /// Make `url` available offline. Returns false on any failure.
  async fn prefetch(&self, url: &str) -> bool;
}

/// Downloads images into a local directory, one file per URL.
pub struct HttpImageCache {
  client: reqwest::Client,
  dir: PathBuf,
  max_bytes: u64,
  downloads: AtomicU64,
}

impl HttpImageCache {
  pub fn new(dir: Option<&Path>) -> color_eyre::Result<Self> {
    let dir = match dir {
      Some(d) => d.to_path_buf(),
      None => dirs::cache_dir()
        .ok_or_else(|| eyre!("Could not determine cache directory"))?
        .join("moteles")
        .join("images"),
    };

    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create image cache at {}: {}", dir.display(), e))?;

    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      dir,
      max_bytes: MAX_IMAGE_BYTES,
      downloads: AtomicU64::new(0),
    })
  }

  pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
    self.max_bytes = max_bytes;
    self
  }

  /// SHA256 of the URL for stable, fixed-length file names.
  pub fn path_for(&self, url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    self.dir.join(hex::encode(hasher.finalize()))
  }

  /// Scratch file unique to one download, next to its final path.
  fn temp_path(&self, path: &Path) -> PathBuf {
    let n = self.downloads.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("{}.{}.part", std::process::id(), n))
  }

  async fn download(&self, url: &str, path: &Path) -> color_eyre::Result<()> {
    let response = self.client.get(url).send().await?.error_for_status()?;
    if let Some(len) = response.content_length() {
      if len > self.max_bytes {
        return Err(eyre!("image is {} bytes, limit is {}", len, self.max_bytes));
      }
    }

    // Write-then-rename so a half-written file never counts as cached
    let tmp = self.temp_path(path);
    let result = self.write_body(response, &tmp).await;
    if result.is_err() {
      let _ = tokio::fs::remove_file(&tmp).await;
      return result;
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
  }

  async fn write_body(
    &self,
    mut response: reqwest::Response,
    tmp: &Path,
  ) -> color_eyre::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
      written += chunk.len() as u64;
      if written > self.max_bytes {
        return Err(eyre!("image exceeds {} bytes", self.max_bytes));
      }
      file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
  }
}

#[async_trait]
impl ImageCache for HttpImageCache {
  async fn prefetch(&self, url: &str) -> bool {
    let path = self.path_for(url);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
      return true;
    }

    match self.download(url, &path).await {
      Ok(()) => true,
      Err(e) => {
        debug!(url, error = %e, "image prefetch failed");
        false
      }
    }
  }
}
