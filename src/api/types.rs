use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub latitude: f64,
  pub longitude: f64,
}

/// Venue as shown in list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueSummary {
  pub id: String,
  pub slug: String,
  pub name: String,
  pub neighborhood: Option<String>,
  pub city: Option<String>,
  pub starting_price: Option<f64>,
  pub amenities: Vec<String>,
  pub rating: Option<f64>,
  pub plan: String,
  pub has_promo: bool,
  pub coordinates: Option<Coordinates>,
  /// Deduplicated, in server order
  pub photos: Vec<String>,
  pub thumbnail: Option<String>,
}

/// Full venue page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueDetail {
  #[serde(flatten)]
  pub summary: VenueSummary,
  pub address: Option<String>,
  pub description: Option<String>,
  pub contact: Contact,
  pub schedules: Vec<Schedule>,
  pub rooms: Vec<Room>,
  pub menu: Vec<MenuItem>,
  pub promos: Vec<Promo>,
  pub all_photos: Vec<String>,
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
  pub phone: Option<String>,
  pub whatsapp: Option<String>,
  pub website: Option<String>,
  pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
  pub day: String,
  pub opens: Option<String>,
  pub closes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
  pub name: String,
  pub price: Option<f64>,
  pub description: Option<String>,
  pub amenities: Vec<String>,
  pub photos: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuItem {
  pub name: String,
  pub category: Option<String>,
  pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Promo {
  pub title: String,
  pub description: Option<String>,
  pub valid_until: Option<String>,
}

/// Denormalized snapshot of the display fields of a favorited venue.
///
/// Favorites migrated from the legacy id-only format carry just `id` until backfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub slug: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub neighborhood: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub starting_price: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plan: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub has_promo: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub thumbnail: Option<String>,
}

impl FavoriteItem {
  /// `{id}`-only record.
  pub fn stub(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      slug: None,
      name: None,
      neighborhood: None,
      city: None,
      starting_price: None,
      rating: None,
      plan: None,
      has_promo: None,
      thumbnail: None,
    }
  }

  pub fn is_stub(&self) -> bool {
    self.name.is_none()
  }
}

impl From<&VenueSummary> for FavoriteItem {
  fn from(venue: &VenueSummary) -> Self {
    Self {
      id: venue.id.clone(),
      slug: Some(venue.slug.clone()),
      name: Some(venue.name.clone()),
      neighborhood: venue.neighborhood.clone(),
      city: venue.city.clone(),
      starting_price: venue.starting_price,
      rating: venue.rating,
      plan: Some(venue.plan.clone()),
      has_promo: Some(venue.has_promo),
      thumbnail: venue.thumbnail.clone(),
    }
  }
}

/// Listing filters. An empty filter set is the cacheable "all venues" listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueFilters {
  pub city: Option<String>,
  pub neighborhood: Option<String>,
  pub search: Option<String>,
  pub plan: Option<String>,
  pub amenities: Vec<String>,
  pub has_promo: bool,
  pub near: Option<(Coordinates, f64)>,
}

impl VenueFilters {
  pub fn is_empty(&self) -> bool {
    self.query_pairs().is_empty()
  }

  /// Query string pairs for the listing endpoint. Blank values are dropped.
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    let text = [
      ("city", &self.city),
      ("neighborhood", &self.neighborhood),
      ("search", &self.search),
      ("plan", &self.plan),
    ];
    for (name, value) in text {
      if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        pairs.push((name, v.to_string()));
      }
    }

    let amenities: Vec<&str> = self
      .amenities
      .iter()
      .map(|a| a.trim())
      .filter(|a| !a.is_empty())
      .collect();
    if !amenities.is_empty() {
      pairs.push(("amenities", amenities.join(",")));
    }

    if self.has_promo {
      pairs.push(("hasPromo", "true".to_string()));
    }

    if let Some((at, radius_km)) = self.near {
      pairs.push(("near", format!("{},{}", at.latitude, at.longitude)));
      pairs.push(("radiusKm", radius_km.to_string()));
    }

    pairs
  }
}

/// One page of the venue listing plus the server's change watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct VenuePage {
  pub venues: Vec<VenueSummary>,
  pub latest_updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_blank_filters_are_empty() {
    let filters = VenueFilters {
      city: Some("  ".to_string()),
      amenities: vec![String::new()],
      ..Default::default()
    };
    assert!(filters.is_empty());
  }

  #[test]
  fn test_filter_query_pairs() {
    let filters = VenueFilters {
      city: Some("CDMX".to_string()),
      plan: Some("premium".to_string()),
      amenities: vec!["jacuzzi".to_string(), "garage".to_string()],
      has_promo: true,
      near: Some((
        Coordinates {
          latitude: 19.5,
          longitude: -99.25,
        },
        5.0,
      )),
      ..Default::default()
    };

    assert_eq!(
      filters.query_pairs(),
      vec![
        ("city", "CDMX".to_string()),
        ("plan", "premium".to_string()),
        ("amenities", "jacuzzi,garage".to_string()),
        ("hasPromo", "true".to_string()),
        ("near", "19.5,-99.25".to_string()),
        ("radiusKm", "5".to_string()),
      ]
    );
  }

  #[test]
  fn test_stub_serializes_id_only() {
    let stub = FavoriteItem::stub("a");
    assert!(stub.is_stub());
    assert_eq!(serde_json::to_string(&stub).unwrap(), r#"{"id":"a"}"#);
  }
}
