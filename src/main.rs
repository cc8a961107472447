mod api;
mod app;
mod cache;
mod config;
mod error;
mod favorites;
mod kv;
mod logging;
mod prefetch;
mod recent;
mod repository;
mod session;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "moteles")]
#[command(about = "Offline-first client for the moteles venue directory")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/moteles/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overrides the config file
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List venues
  Venues {
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    neighborhood: Option<String>,
    /// Free-text search, recorded in the search history
    #[arg(short, long)]
    search: Option<String>,
    /// Listing plan, e.g. basic or premium
    #[arg(long)]
    plan: Option<String>,
    /// Required amenity, repeatable
    #[arg(long = "amenity")]
    amenities: Vec<String>,
    /// Only venues with an active promotion
    #[arg(long)]
    promo: bool,
    /// Only venues around the current position
    #[arg(long)]
    near_me: bool,
  },
  /// Show a venue page
  Show { id_or_slug: String },
  /// Manage favorites
  Favorites {
    #[command(subcommand)]
    command: FavoritesCommand,
  },
  /// Recently viewed venues
  Recent {
    #[arg(long)]
    clear: bool,
  },
  /// Recent searches
  History {
    #[arg(long)]
    clear: bool,
  },
  /// Warm the cache for offline use
  Prefetch {
    /// Venues around the last known position instead of the full listing
    #[arg(long)]
    nearby: bool,
  },
  /// Manage cached data
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
  List,
  /// Add or remove a venue
  Toggle { id_or_slug: String },
  /// Upload local favorites to your account
  Sync,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Remove every cached listing, venue page and recent activity. Favorites are kept.
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(api_url) = args.api_url {
    config.api.base_url = api_url;
  }

  let _log_guard = logging::init(&config.logging)?;

  let mut app = app::App::new(config).await?;
  app.run(args.command).await?;

  Ok(())
}
