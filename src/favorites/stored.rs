//! On-disk favorites formats.

use serde_json::Value;
use tracing::warn;

use crate::api::FavoriteItem;

/// The two shapes the persisted favorites array has had over time.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredFavorites {
  /// `["id", ...]`
  Legacy(Vec<String>),
  /// `[{"id": ..., "name": ...}, ...]`
  Current(Vec<FavoriteItem>),
}

impl StoredFavorites {
  /// Detect the shape by the type of the first element.
  pub fn parse(raw: &str) -> serde_json::Result<Self> {
    let values: Vec<Value> = serde_json::from_str(raw)?;

    if matches!(values.first(), Some(Value::String(_))) {
      let ids = values
        .into_iter()
        .filter_map(|v| match v {
          Value::String(id) if !id.is_empty() => Some(id),
          _ => None,
        })
        .collect();
      return Ok(Self::Legacy(ids));
    }

    let items = values
      .into_iter()
      .filter_map(|v| match serde_json::from_value::<FavoriteItem>(v) {
        Ok(item) => Some(item),
        Err(e) => {
          warn!(error = %e, "skipping malformed stored favorite");
          None
        }
      })
      .collect();
    Ok(Self::Current(items))
  }

  pub fn is_legacy(&self) -> bool {
    matches!(self, Self::Legacy(_))
  }

  /// Upgrade to the current shape. Legacy ids become `{id}` stubs.
  pub fn migrate(self) -> Vec<FavoriteItem> {
    match self {
      Self::Legacy(ids) => {
        let mut items: Vec<FavoriteItem> = Vec::with_capacity(ids.len());
        for id in ids {
          if !items.iter().any(|item| item.id == id) {
            items.push(FavoriteItem::stub(id));
          }
        }
        items
      }
      Self::Current(items) => items,
    }
  }
}
