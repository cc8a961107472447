//! Device location capability.

use async_trait::async_trait;

use crate::api::Coordinates;
use crate::config::LocationConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
  Granted,
  Denied,
  Undetermined,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
  /// Current permission, read without prompting the user.
  async fn permission_status(&self) -> PermissionStatus;

  /// Last fix the platform already holds. Never requests a new one.
  async fn last_known_position(&self) -> Option<Coordinates>;

  /// Fresh fix. May prompt, so only user-triggered flows call this.
  async fn current_position(&self) -> Result<Coordinates>;
}

/// Fixed position taken from configuration.
pub struct StaticLocation {
  position: Option<Coordinates>,
}

impl StaticLocation {
  pub fn new(position: Option<Coordinates>) -> Self {
    Self { position }
  }
}

impl From<&LocationConfig> for StaticLocation {
  fn from(config: &LocationConfig) -> Self {
    let position = match (config.latitude, config.longitude) {
      (Some(latitude), Some(longitude)) => Some(Coordinates {
        latitude,
        longitude,
      }),
      _ => None,
    };
    Self::new(position)
  }
}

#[async_trait]
impl LocationProvider for StaticLocation {
  async fn permission_status(&self) -> PermissionStatus {
    if self.position.is_some() {
      PermissionStatus::Granted
    } else {
      PermissionStatus::Undetermined
    }
  }

  async fn last_known_position(&self) -> Option<Coordinates> {
    self.position
  }

  async fn current_position(&self) -> Result<Coordinates> {
    self
      .position
      .ok_or_else(|| Error::NotFoundOrOffline("device location".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_partial_config_means_no_permission() {
    let location = StaticLocation::from(&LocationConfig {
      latitude: Some(19.4),
      longitude: None,
    });
    assert_eq!(location.permission_status().await, PermissionStatus::Undetermined);
    assert!(location.current_position().await.is_err());
  }
}
