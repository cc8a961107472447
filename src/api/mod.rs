//! Remote venue/favorites backend: domain types, wire types and the HTTP client.

pub mod api_types;
pub mod client;
pub mod types;

pub use client::{HttpApi, RemoteApi};
pub use types::{
  Coordinates, FavoriteItem, VenueDetail, VenueFilters, VenuePage, VenueSummary,
};
