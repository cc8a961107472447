use async_trait::async_trait;
use color_eyre::eyre::eyre;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::api_types::{decode, ApiFavorite, ApiVenueListResponse, ApiVenueRecord, Envelope};
use super::types::{FavoriteItem, VenueDetail, VenueFilters, VenuePage};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Authoritative venue/favorites backend.
#[async_trait]
pub trait RemoteApi: Send + Sync {
  /// `GET /venues[?filters]`
  async fn list_venues(&self, filters: &VenueFilters) -> Result<VenuePage>;

  /// `GET /venues/:idOrSlug`
  async fn get_venue(&self, id_or_slug: &str) -> Result<VenueDetail>;

  /// `GET /favorites`
  async fn list_favorites(&self, token: &str) -> Result<Vec<FavoriteItem>>;

  /// `POST /favorites {venueId}`
  async fn add_favorite(&self, token: &str, venue_id: &str) -> Result<()>;

  /// `DELETE /favorites?venueId=`
  async fn remove_favorite(&self, token: &str, venue_id: &str) -> Result<()>;
}

/// HTTP client for the venue API
#[derive(Clone)]
pub struct HttpApi {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpApi {
  pub fn new(config: &ApiConfig) -> color_eyre::Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL {} cannot be a base", config.base_url));
    }

    let mut builder = reqwest::Client::builder().user_agent(concat!(
      env!("CARGO_PKG_NAME"),
      "/",
      env!("CARGO_PKG_VERSION")
    ));
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  /// Append path segments to the base URL. Segments are percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  /// Send a request and return the body of a successful response.
  async fn send(&self, request: RequestBuilder, what: &str) -> Result<String> {
    let response = request
      .send()
      .await
      .map_err(|e| Error::network(format!("{}: {}", what, e)))?;

    let status = response.status();
    match status {
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(Error::AuthExpired),
      StatusCode::NOT_FOUND => return Err(Error::NotFoundOrOffline(what.to_string())),
      StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
        return Err(Error::network(format!("{} returned {}", what, status)))
      }
      s if s.is_server_error() => {
        return Err(Error::network(format!("{} returned {}", what, status)))
      }
      s if !s.is_success() => {
        return Err(Error::invalid(format!("{} returned {}", what, status)))
      }
      _ => {}
    }

    response
      .text()
      .await
      .map_err(|e| Error::network(format!("{}: {}", what, e)))
  }

  async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
    let body = self.send(request, what).await?;
    decode(&body).map_err(|e| Error::invalid(format!("{}: {}", what, e)))
  }
}

#[async_trait]
impl RemoteApi for HttpApi {
  async fn list_venues(&self, filters: &VenueFilters) -> Result<VenuePage> {
    let mut url = self.endpoint(&["venues"]);
    let pairs = filters.query_pairs();
    if !pairs.is_empty() {
      url.query_pairs_mut().extend_pairs(pairs);
    }

    let response: ApiVenueListResponse = self.get_json(self.client.get(url), "venues").await?;
    Ok(response.into())
  }

  async fn get_venue(&self, id_or_slug: &str) -> Result<VenueDetail> {
    let url = self.endpoint(&["venues", id_or_slug]);
    let what = format!("venue {}", id_or_slug);

    let record: Envelope<ApiVenueRecord> = self.get_json(self.client.get(url), &what).await?;
    Ok(record.into_inner().into_detail())
  }

  async fn list_favorites(&self, token: &str) -> Result<Vec<FavoriteItem>> {
    let request = self.client.get(self.endpoint(&["favorites"])).bearer_auth(token);

    let favorites: Envelope<Vec<ApiFavorite>> = self.get_json(request, "favorites").await?;
    Ok(
      favorites
        .into_inner()
        .into_iter()
        .map(ApiFavorite::into_item)
        .collect(),
    )
  }

  async fn add_favorite(&self, token: &str, venue_id: &str) -> Result<()> {
    let request = self
      .client
      .post(self.endpoint(&["favorites"]))
      .bearer_auth(token)
      .json(&serde_json::json!({ "venueId": venue_id }));

    self.send(request, "add favorite").await?;
    Ok(())
  }

  async fn remove_favorite(&self, token: &str, venue_id: &str) -> Result<()> {
    let mut url = self.endpoint(&["favorites"]);
    url.query_pairs_mut().append_pair("venueId", venue_id);
    let request = self.client.delete(url).bearer_auth(token);

    self.send(request, "remove favorite").await?;
    Ok(())
  }
}
