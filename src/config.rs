use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub prefetch: PrefetchConfig,
  #[serde(default)]
  pub favorites: FavoritesConfig,
  #[serde(default)]
  pub location: LocationConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Request timeout; transport default when unset
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:3000/api".to_string(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, reads always go to the network and nothing is cached
  pub enabled: bool,
  /// Store location (defaults to $XDG_DATA_HOME/moteles/store.db)
  pub path: Option<PathBuf>,
  pub venue_list_ttl_minutes: i64,
  pub venue_detail_ttl_minutes: i64,
  pub recent_views_ttl_days: i64,
  pub search_history_ttl_days: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      venue_list_ttl_minutes: 30,
      venue_detail_ttl_minutes: 60,
      recent_views_ttl_days: 7,
      search_history_ttl_days: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
  pub batch_size: usize,
  pub batch_pause_ms: u64,
  /// How long to wait for the foreground to go quiet before warming caches
  pub settle_delay_ms: u64,
  /// How many candidates to warm per run
  pub candidates: usize,
  pub nearby_radius_km: f64,
}

impl Default for PrefetchConfig {
  fn default() -> Self {
    Self {
      batch_size: 3,
      batch_pause_ms: 150,
      settle_delay_ms: 400,
      candidates: 6,
      nearby_radius_km: 5.0,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
  /// Play the add/remove sound when a toggle takes effect
  pub sound: bool,
  /// Consecutive failed remote mutations before forcing a reload from the server (0 = never)
  pub reconcile_after_failures: u32,
}

impl Default for FavoritesConfig {
  fn default() -> Self {
    Self {
      sound: true,
      reconcile_after_failures: 3,
    }
  }
}

/// Last known device position. Absent means location permission was never granted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationConfig {
  pub latitude: Option<f64>,
  pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  pub level: String,
  /// Log to stderr instead of the rolling file
  pub stderr: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      stderr: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./moteles.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/moteles/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("moteles.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("moteles").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks MOTELES_API_TOKEN first, then MOTELES_TOKEN as fallback.
  /// No token means the session starts in guest mode.
  pub fn get_api_token() -> Option<String> {
    std::env::var("MOTELES_API_TOKEN")
      .or_else(|_| std::env::var("MOTELES_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert!(config.cache.enabled);
    assert_eq!(config.cache.venue_list_ttl_minutes, 30);
    assert_eq!(config.prefetch.batch_size, 3);
    assert_eq!(config.favorites.reconcile_after_failures, 3);
  }

  #[test]
  fn test_partial_sections_keep_remaining_defaults() {
    let config = Config::parse(
      r#"
api:
  base_url: https://moteles.example/api
cache:
  venue_detail_ttl_minutes: 15
favorites:
  sound: false
location:
  latitude: 19.43
  longitude: -99.13
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://moteles.example/api");
    assert_eq!(config.cache.venue_detail_ttl_minutes, 15);
    assert_eq!(config.cache.venue_list_ttl_minutes, 30);
    assert!(!config.favorites.sound);
    assert_eq!(config.favorites.reconcile_after_failures, 3);
    assert_eq!(config.location.latitude, Some(19.43));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
