//! Error taxonomy for the cache and sync core.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  /// Fetch failed or timed out. Always eligible for cache fallback.
  #[error("network request failed: {0}")]
  TransientNetwork(String),
  /// Payload shape was not what we expected. Never cached.
  #[error("unexpected response payload: {0}")]
  InvalidResponse(String),
  /// Persistent store read/write failed.
  #[error("storage operation failed: {0}")]
  Storage(String),
  /// 401-class rejection. The session owner decides what to do with it.
  #[error("session expired or unauthorized")]
  AuthExpired,
  /// Nothing on the server and nothing in the cache.
  #[error("{0} not found or unavailable offline")]
  NotFoundOrOffline(String),
}

impl Error {
  pub fn storage(err: impl std::fmt::Display) -> Self {
    Self::Storage(err.to_string())
  }

  pub fn network(err: impl std::fmt::Display) -> Self {
    Self::TransientNetwork(err.to_string())
  }

  pub fn invalid(err: impl std::fmt::Display) -> Self {
    Self::InvalidResponse(err.to_string())
  }

  /// Whether a cached copy may be served in place of this failure.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::TransientNetwork(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
