//! Domain types for events and favorites.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::store::Document;

/// Closed set of event categories known to the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
  Music,
  Sports,
  Food,
  Arts,
  Birthdays,
  Other,
}

impl Category {
  pub const ALL: [Category; 6] = [
    Category::Music,
    Category::Sports,
    Category::Food,
    Category::Arts,
    Category::Birthdays,
    Category::Other,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Music => "Music",
      Category::Sports => "Sports",
      Category::Food => "Food",
      Category::Arts => "Arts",
      Category::Birthdays => "Birthdays",
      Category::Other => "Other",
    }
  }

  /// Parse a display name back into a category.
  pub fn parse(s: &str) -> Option<Category> {
    Category::ALL.iter().copied().find(|c| c.as_str() == s)
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Argument for category views. "All" is a filter choice, not a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
  All,
  Only(Category),
}

/// Canonical coordinate pair. The store's documents use either `lat`/`lng`
/// or `latitude`/`longitude`; both spellings normalize here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  #[serde(alias = "latitude")]
  pub lat: f64,
  #[serde(alias = "longitude")]
  pub lng: f64,
}

/// An event as fetched from the store. Read-only to this crate apart from
/// the popularity counter, which save/unsave actions adjust remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
  /// Store-assigned document id.
  #[serde(default)]
  pub id: String,
  pub title: String,
  pub venue: String,
  pub category: Category,
  /// ISO-8601 timestamp as the store provides it.
  pub date: String,
  pub location: Coordinates,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  /// Save/unsave counter; absent means never saved.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub popularity: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl EventItem {
  /// Popularity with the absent-means-zero rule applied.
  pub fn popularity(&self) -> i64 {
    self.popularity.unwrap_or(0)
  }

  /// Date key used for ordering; unparseable dates sort last.
  fn sort_date(&self) -> DateTime<Utc> {
    parse_event_date(&self.date).unwrap_or(DateTime::<Utc>::MAX_UTC)
  }

  /// Build an event from a store document, taking the id from the
  /// document rather than the payload.
  pub fn from_document(doc: &Document) -> Result<EventItem, serde_json::Error> {
    let mut item: EventItem = serde_json::from_value(doc.fields.clone())?;
    item.id = doc.id.clone();
    Ok(item)
  }
}

/// Accept full RFC 3339, a bare `T`-separated datetime, or a plain date.
fn parse_event_date(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
    return Some(naive.and_utc());
  }
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
  }
  None
}

/// The one ordering rule behind every "popular" view: popularity
/// descending (absent counts as zero), ties broken by soonest date first.
pub fn popular_order(a: &EventItem, b: &EventItem) -> Ordering {
  b.popularity()
    .cmp(&a.popularity())
    .then_with(|| a.sort_date().cmp(&b.sort_date()))
}

/// A saved event plus the instant it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
  pub event: EventItem,
  pub saved_at: DateTime<Utc>,
}
