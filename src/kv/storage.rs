//! Key-value store trait and the no-op backend.

use async_trait::async_trait;

use crate::error::Result;

/// Durable, asynchronous string-keyed store.
///
/// Every operation may fail. Callers in the cache core absorb failures and degrade
/// to "always miss" rather than surfacing them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Read a raw value.
  async fn get_item(&self, key: &str) -> Result<Option<String>>;

  /// Write a raw value, replacing any previous one.
  async fn set_item(&self, key: &str, value: &str) -> Result<()>;

  /// Delete a single key. Deleting a missing key is not an error.
  async fn remove_item(&self, key: &str) -> Result<()>;

  /// Delete several keys at once.
  async fn multi_remove(&self, keys: &[String]) -> Result<()>;

  /// Enumerate every key currently stored.
  async fn get_all_keys(&self) -> Result<Vec<String>>;
}

/// Store that doesn't keep anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

#[async_trait]
impl KeyValueStore for NoopStore {
  async fn get_item(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  async fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }

  async fn remove_item(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  async fn multi_remove(&self, _keys: &[String]) -> Result<()> {
    Ok(())
  }

  async fn get_all_keys(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }
}
