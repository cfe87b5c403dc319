use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Envelope stored for every cached value: the value plus the absolute
/// instant after which it must not be served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub value: T,
  pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Wrap `value` with an expiration `ttl` from now.
  pub fn new(value: T, ttl: Duration) -> Self {
    Self {
      value,
      expires_at: Utc::now() + ttl,
    }
  }

  pub fn is_expired(&self) -> bool {
    Utc::now() > self.expires_at
  }
}
