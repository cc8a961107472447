//! Serde-deserializable types matching the venue API responses.
//!
//! These types are separate from domain types to allow lenient deserialization
//! (numbers sent as strings, photos as bare strings or objects, nulls for lists)
//! while keeping domain types normalized.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;

use super::types::{
  Contact, Coordinates, FavoriteItem, MenuItem, Promo, Room, Schedule, VenueDetail, VenuePage,
  VenueSummary,
};

// ============================================================================
// Lenient field helpers
// ============================================================================

/// Treat `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) if !s.trim().is_empty() => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}

fn as_number(value: &Option<Value>) -> Option<f64> {
  match value {
    Some(Value::Number(n)) => n.as_f64(),
    Some(Value::String(s)) => s.trim().parse().ok(),
    _ => None,
  }
}

/// A photo is either a bare URL or an object carrying `url` or `photoUrl`.
fn photo_url(value: &Value) -> Option<String> {
  let url = match value {
    Value::String(s) => Some(s.as_str()),
    Value::Object(map) => map
      .get("url")
      .and_then(Value::as_str)
      .filter(|s| !s.trim().is_empty())
      .or_else(|| map.get("photoUrl").and_then(Value::as_str)),
    _ => None,
  }?;

  let url = url.trim();
  (!url.is_empty()).then(|| url.to_string())
}

/// Flatten photo values into unique URLs, preserving first-seen order.
pub fn normalize_photos<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<String> {
  let mut seen = HashSet::new();
  values
    .into_iter()
    .filter_map(photo_url)
    .filter(|url| seen.insert(url.clone()))
    .collect()
}

fn labels(values: &[Value]) -> Vec<String> {
  values
    .iter()
    .filter_map(|v| match v {
      Value::String(s) => Some(s.trim().to_string()),
      Value::Object(map) => map.get("name").and_then(Value::as_str).map(|s| s.trim().to_string()),
      _ => None,
    })
    .filter(|s| !s.is_empty())
    .collect()
}

// ============================================================================
// Venue record - used by listing, detail and favorites endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVenueRecord {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub slug: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  pub neighborhood: Option<String>,
  pub city: Option<String>,
  pub starting_price: Option<Value>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub amenities: Vec<Value>,
  pub rating: Option<Value>,
  pub plan: Option<String>,
  pub has_promo: Option<bool>,
  #[serde(alias = "lat")]
  pub latitude: Option<Value>,
  #[serde(alias = "lng")]
  pub longitude: Option<Value>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub photos: Vec<Value>,
  pub thumbnail: Option<Value>,

  // Detail-only fields
  pub address: Option<String>,
  pub description: Option<String>,
  pub contact: Option<Contact>,
  pub phone: Option<String>,
  pub whatsapp: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub schedules: Vec<Schedule>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub rooms: Vec<ApiRoom>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub menu: Vec<ApiMenuItem>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub promos: Vec<Promo>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub all_photos: Vec<Value>,
  pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiRoom {
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  pub price: Option<Value>,
  pub description: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub amenities: Vec<Value>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub photos: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMenuItem {
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  pub category: Option<String>,
  pub price: Option<Value>,
}

impl ApiVenueRecord {
  /// Convert to the list-view shape.
  pub fn into_summary(self) -> VenueSummary {
    let photos = normalize_photos(&self.photos);
    let thumbnail = self
      .thumbnail
      .as_ref()
      .and_then(photo_url)
      .or_else(|| photos.first().cloned());

    let coordinates = match (as_number(&self.latitude), as_number(&self.longitude)) {
      (Some(latitude), Some(longitude)) => Some(Coordinates {
        latitude,
        longitude,
      }),
      _ => None,
    };

    VenueSummary {
      slug: if self.slug.trim().is_empty() {
        self.id.clone()
      } else {
        self.slug
      },
      id: self.id,
      name: self.name,
      neighborhood: self.neighborhood,
      city: self.city,
      starting_price: as_number(&self.starting_price),
      amenities: labels(&self.amenities),
      rating: as_number(&self.rating),
      plan: self.plan.unwrap_or_else(|| "basic".to_string()),
      has_promo: self.has_promo.unwrap_or(!self.promos.is_empty()),
      coordinates,
      photos,
      thumbnail,
    }
  }

  /// Convert to the full venue page shape.
  pub fn into_detail(mut self) -> VenueDetail {
    let rooms: Vec<Room> = std::mem::take(&mut self.rooms)
      .into_iter()
      .map(|room| Room {
        name: room.name,
        price: as_number(&room.price),
        description: room.description,
        amenities: labels(&room.amenities),
        photos: normalize_photos(&room.photos),
      })
      .collect();

    let all_photos = normalize_photos(
      self
        .all_photos
        .iter()
        .chain(self.photos.iter()),
    );
    let all_photos = {
      let mut seen: HashSet<String> = all_photos.iter().cloned().collect();
      let mut merged = all_photos;
      for url in rooms.iter().flat_map(|r| r.photos.iter()) {
        if seen.insert(url.clone()) {
          merged.push(url.clone());
        }
      }
      merged
    };

    let mut contact = self.contact.take().unwrap_or_default();
    if contact.phone.is_none() {
      contact.phone = self.phone.take();
    }
    if contact.whatsapp.is_none() {
      contact.whatsapp = self.whatsapp.take();
    }

    let menu = std::mem::take(&mut self.menu)
      .into_iter()
      .map(|item| MenuItem {
        name: item.name,
        category: item.category,
        price: as_number(&item.price),
      })
      .collect();

    let address = self.address.take();
    let description = self.description.take();
    let schedules = std::mem::take(&mut self.schedules);
    let promos = self.promos.clone();
    let updated_at = self.updated_at.take();

    VenueDetail {
      summary: self.into_summary(),
      address,
      description,
      contact,
      schedules,
      rooms,
      menu,
      promos,
      all_photos,
      updated_at,
    }
  }
}

// ============================================================================
// Endpoint responses
// ============================================================================

/// `GET /venues`
#[derive(Debug, Deserialize)]
pub struct ApiVenueListResponse {
  pub data: Vec<ApiVenueRecord>,
  #[serde(default)]
  pub meta: Option<ApiListMeta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListMeta {
  pub latest_updated_at: Option<String>,
}

impl From<ApiVenueListResponse> for VenuePage {
  fn from(response: ApiVenueListResponse) -> Self {
    Self {
      venues: response
        .data
        .into_iter()
        .map(ApiVenueRecord::into_summary)
        .collect(),
      latest_updated_at: response.meta.and_then(|m| m.latest_updated_at),
    }
  }
}

/// Some endpoints wrap their payload in `{data: ...}`, some don't.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
  Wrapped { data: T },
  Bare(T),
}

impl<T> Envelope<T> {
  pub fn into_inner(self) -> T {
    match self {
      Envelope::Wrapped { data } | Envelope::Bare(data) => data,
    }
  }
}

/// One element of `GET /favorites`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiFavorite {
  Nested { venue: ApiVenueRecord },
  Venue(ApiVenueRecord),
  Reference {
    #[serde(rename = "venueId", deserialize_with = "string_or_number")]
    venue_id: String,
  },
}

impl ApiFavorite {
  pub fn into_item(self) -> FavoriteItem {
    match self {
      ApiFavorite::Nested { venue } | ApiFavorite::Venue(venue) => {
        FavoriteItem::from(&venue.into_summary())
      }
      ApiFavorite::Reference { venue_id } => FavoriteItem::stub(venue_id),
    }
  }
}

/// Decode a response body.
pub fn decode<T: DeserializeOwned>(body: &str) -> serde_json::Result<T> {
  serde_json::from_str(body)
}
