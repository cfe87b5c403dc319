//! Cache keys for event queries.

use sha2::{Digest, Sha256};

use super::types::Category;

/// Logical identity of a cached event query. The cache key is a pure
/// function of the operation and its parameters, so equal queries always
/// hit the same entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EventQuery {
  /// Whole collection in popular order.
  All,
  /// Top `max` by popularity.
  Top { max: usize },
  /// One category, truncated to `max`.
  Category { category: Category, max: usize },
  /// Distance search around a center. Coordinates are rounded to two
  /// decimals (~1.1 km) so GPS jitter reuses the entry; the result is the
  /// same list for any `max`, which is why `max` is not part of the key.
  Nearby { lat: f64, lng: f64, radius_km: f64 },
  /// Keyword search, normalized before keying.
  Search { keyword: String, max: usize },
}

impl EventQuery {
  /// Readable form, used in logs.
  pub fn description(&self) -> String {
    match self {
      Self::All => "events_all".to_string(),
      Self::Top { max } => format!("events_top_{}", max),
      Self::Category { category, max } => format!("events_cat_{}_{}", category, max),
      Self::Nearby { lat, lng, radius_km } => {
        format!("events_near_{:.2}_{:.2}_{}", lat, lng, radius_km)
      }
      Self::Search { keyword, max } => {
        format!("events_search_{}_{}", keyword.trim().to_lowercase(), max)
      }
    }
  }

  /// Stable fixed-length storage key.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }
}
