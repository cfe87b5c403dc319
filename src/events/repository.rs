//! Read/query access to the remote event collection, plus the popularity
//! counter mutation that keeps cached rankings honest.
//!
//! Every fetch goes cache-first: a hit is served as-is, a miss queries the
//! store, derives the result order client-side and writes the cache before
//! returning. Popularity mutations bump the cache generation so no
//! popularity-dependent ordering survives a save/unsave.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::EventsError;
use crate::geo;
use crate::storage::KvStorage;
use crate::store::{CollectionQuery, Direction, Document, DocumentStore};

use super::keys::EventQuery;
use super::types::{popular_order, CategoryFilter, EventItem};

/// Candidate window fetched for distance filtering.
const NEARBY_CANDIDATE_LIMIT: usize = 200;

/// Single source of truth for event reads and popularity writes.
pub struct EventRepository<S: DocumentStore, K: KvStorage> {
  store: Arc<S>,
  cache: Arc<TtlCache<K>>,
  collection: String,
  ttl: Duration,
}

impl<S: DocumentStore, K: KvStorage> EventRepository<S, K> {
  pub fn new(store: Arc<S>, cache: Arc<TtlCache<K>>) -> Self {
    Self {
      store,
      cache,
      collection: "events".to_string(),
      ttl: Duration::minutes(60),
    }
  }

  /// Use a collection other than `events`.
  pub fn with_collection(mut self, collection: &str) -> Self {
    self.collection = collection.to_string();
    self
  }

  /// Override the freshness window for cached results.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub(crate) fn store(&self) -> &Arc<S> {
    &self.store
  }

  pub(crate) fn collection(&self) -> &str {
    &self.collection
  }

  /// Every event, ordered by popularity (ties: soonest first).
  pub async fn fetch_all_events(&self) -> Result<Vec<EventItem>, EventsError> {
    let query = EventQuery::All;
    if let Some(cached) = self.cached(&query).await {
      return Ok(cached);
    }

    let docs = self.store.query(&self.collection, CollectionQuery::new()).await?;
    let mut events = decode_documents(&docs);
    events.sort_by(popular_order);

    self.store_cached(&query, &events).await;
    Ok(events)
  }

  /// Up to `max` events by popularity. The direct ordered query can come
  /// up short when many documents carry no popularity field (they fall out
  /// of the index); in that case a wider unordered window is fetched and
  /// ranked client-side.
  pub async fn fetch_top_events(&self, max: usize) -> Result<Vec<EventItem>, EventsError> {
    let query = EventQuery::Top { max };
    if let Some(cached) = self.cached(&query).await {
      return Ok(cached);
    }

    let docs = self
      .store
      .query(
        &self.collection,
        CollectionQuery::new()
          .order_by("popularity", Direction::Descending)
          .limit(max),
      )
      .await?;
    let mut events = decode_documents(&docs);

    if events.len() < max {
      let wider = self
        .store
        .query(&self.collection, CollectionQuery::new().limit(max * 2))
        .await?;
      events = decode_documents(&wider);
    }

    events.sort_by(popular_order);
    events.truncate(max);

    self.store_cached(&query, &events).await;
    Ok(events)
  }

  /// Events of one category in popular order, truncated to `max`.
  /// `CategoryFilter::All` is the top-events view.
  pub async fn fetch_events_by_category(
    &self,
    filter: CategoryFilter,
    max: usize,
  ) -> Result<Vec<EventItem>, EventsError> {
    let category = match filter {
      CategoryFilter::All => return self.fetch_top_events(max).await,
      CategoryFilter::Only(category) => category,
    };

    let query = EventQuery::Category { category, max };
    if let Some(cached) = self.cached(&query).await {
      return Ok(cached);
    }

    // fetch_all_events already applies the popular order; an exact-match
    // filter preserves it.
    let mut events: Vec<EventItem> = self
      .fetch_all_events()
      .await?
      .into_iter()
      .filter(|e| e.category == category)
      .collect();
    events.truncate(max);

    self.store_cached(&query, &events).await;
    Ok(events)
  }

  /// Events within `radius_km` of a center, closest first, truncated to
  /// `max`. The center must be a valid coordinate pair.
  pub async fn fetch_nearby_events(
    &self,
    lat: f64,
    lng: f64,
    radius_km: f64,
    max: usize,
  ) -> Result<Vec<EventItem>, EventsError> {
    if !geo::is_valid_location(lat, lng) {
      return Err(EventsError::InvalidLocation(
        "Invalid location data received. Please try again.".to_string(),
      ));
    }

    let query = EventQuery::Nearby { lat, lng, radius_km };
    if let Some(cached) = self.cached(&query).await {
      return Ok(cached);
    }

    let docs = self
      .store
      .query(
        &self.collection,
        CollectionQuery::new()
          .order_by("date", Direction::Ascending)
          .limit(NEARBY_CANDIDATE_LIMIT),
      )
      .await?;

    let mut with_distance: Vec<(EventItem, f64)> = decode_documents(&docs)
      .into_iter()
      .map(|e| {
        let dist = geo::haversine_km(lat, lng, e.location.lat, e.location.lng);
        (e, dist)
      })
      .filter(|(_, dist)| dist.is_finite() && *dist <= radius_km)
      .collect();
    with_distance.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let events: Vec<EventItem> = with_distance.into_iter().take(max).map(|(e, _)| e).collect();

    self.store_cached(&query, &events).await;
    Ok(events)
  }

  /// Case-insensitive substring search over title and venue. Validating
  /// or short-circuiting an empty keyword is the caller's job.
  pub async fn search_events(&self, keyword: &str, max: usize) -> Result<Vec<EventItem>, EventsError> {
    let query = EventQuery::Search {
      keyword: keyword.to_string(),
      max,
    };
    if let Some(cached) = self.cached(&query).await {
      return Ok(cached);
    }

    let needle = keyword.trim().to_lowercase();
    let events: Vec<EventItem> = self
      .fetch_all_events()
      .await?
      .into_iter()
      .filter(|e| {
        e.title.to_lowercase().contains(&needle) || e.venue.to_lowercase().contains(&needle)
      })
      .take(max)
      .collect();

    self.store_cached(&query, &events).await;
    Ok(events)
  }

  /// Atomic +1 on the event's popularity counter.
  pub async fn increment_event_popularity(&self, id: &str) -> Result<(), EventsError> {
    self.adjust_popularity(id, 1).await
  }

  /// Atomic -1 on the event's popularity counter.
  pub async fn decrement_event_popularity(&self, id: &str) -> Result<(), EventsError> {
    self.adjust_popularity(id, -1).await
  }

  async fn adjust_popularity(&self, id: &str, delta: i64) -> Result<(), EventsError> {
    self
      .store
      .increment(&self.collection, id, "popularity", delta)
      .await?;

    // Every cached result set is popularity-ordered; drop them all.
    self.cache.invalidate_all().await;
    Ok(())
  }

  async fn cached(&self, query: &EventQuery) -> Option<Vec<EventItem>> {
    let hit = self.cache.get::<Vec<EventItem>>(&query.cache_key()).await;
    if hit.is_some() {
      debug!(query = %query.description(), "cache hit");
    }
    hit
  }

  async fn store_cached(&self, query: &EventQuery, events: &Vec<EventItem>) {
    self.cache.set(&query.cache_key(), events, self.ttl).await;
  }
}

impl<S: DocumentStore, K: KvStorage> Clone for EventRepository<S, K> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      cache: Arc::clone(&self.cache),
      collection: self.collection.clone(),
      ttl: self.ttl,
    }
  }
}

/// Decode documents into events, skipping (and logging) malformed ones.
pub(crate) fn decode_documents(docs: &[Document]) -> Vec<EventItem> {
  docs
    .iter()
    .filter_map(|doc| match EventItem::from_document(doc) {
      Ok(event) => Some(event),
      Err(e) => {
        warn!(id = %doc.id, error = %e, "skipping undecodable event document");
        None
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::types::Category;
  use crate::storage::MemoryStorage;
  use crate::store::{MemoryStore, StoreError};
  use serde_json::{json, Value};

  fn fields(title: &str, category: &str, date: &str, lat: f64, lng: f64, popularity: Option<i64>) -> Value {
    let mut f = json!({
      "title": title,
      "venue": format!("{} venue", title),
      "category": category,
      "date": date,
      "location": { "lat": lat, "lng": lng }
    });
    if let Some(p) = popularity {
      f["popularity"] = json!(p);
    }
    f
  }

  async fn repo(store: &MemoryStore) -> EventRepository<MemoryStore, MemoryStorage> {
    let cache = TtlCache::open(MemoryStorage::new()).await;
    EventRepository::new(Arc::new(store.clone()), Arc::new(cache))
  }

  #[tokio::test]
  async fn test_fetch_all_orders_by_popularity_then_date() {
    let store = MemoryStore::new();
    store.insert("events", "late", fields("late", "Music", "2024-06-01", 0.0, 0.0, Some(5)));
    store.insert("events", "early", fields("early", "Music", "2024-01-01", 0.0, 0.0, Some(5)));
    store.insert("events", "hot", fields("hot", "Music", "2024-12-01", 0.0, 0.0, Some(9)));
    let repo = repo(&store).await;

    let all = repo.fetch_all_events().await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["hot", "early", "late"]);
  }

  #[tokio::test]
  async fn test_top_tie_break_prefers_earlier_date() {
    let store = MemoryStore::new();
    store.insert("events", "1", fields("one", "Music", "2024-01-01", 0.0, 0.0, Some(5)));
    store.insert("events", "2", fields("two", "Music", "2023-01-01", 0.0, 0.0, Some(5)));
    let repo = repo(&store).await;

    let top = repo.fetch_top_events(2).await.unwrap();
    assert_eq!(top[0].id, "2");
    assert_eq!(top[1].id, "1");
  }

  #[tokio::test]
  async fn test_top_falls_back_when_ordered_query_starves() {
    let store = MemoryStore::new();
    // Only one document carries a popularity field, so the ordered query
    // returns a single row for max = 3.
    store.insert("events", "a", fields("a", "Music", "2024-01-01", 0.0, 0.0, Some(2)));
    store.insert("events", "b", fields("b", "Music", "2024-02-01", 0.0, 0.0, None));
    store.insert("events", "c", fields("c", "Music", "2024-03-01", 0.0, 0.0, None));
    let repo = repo(&store).await;

    let top = repo.fetch_top_events(3).await.unwrap();
    let ids: Vec<&str> = top.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
  }

  #[tokio::test]
  async fn test_category_filters_and_truncates() {
    let store = MemoryStore::new();
    store.insert("events", "m1", fields("m1", "Music", "2024-01-01", 0.0, 0.0, Some(3)));
    store.insert("events", "s1", fields("s1", "Sports", "2024-01-01", 0.0, 0.0, Some(9)));
    store.insert("events", "m2", fields("m2", "Music", "2024-02-01", 0.0, 0.0, Some(7)));
    let repo = repo(&store).await;

    let music = repo
      .fetch_events_by_category(CategoryFilter::Only(Category::Music), 1)
      .await
      .unwrap();
    assert_eq!(music.len(), 1);
    assert_eq!(music[0].id, "m2");
  }

  #[tokio::test]
  async fn test_category_all_is_the_top_view() {
    let store = MemoryStore::new();
    store.insert("events", "m1", fields("m1", "Music", "2024-01-01", 0.0, 0.0, Some(3)));
    store.insert("events", "s1", fields("s1", "Sports", "2024-01-01", 0.0, 0.0, Some(9)));
    let repo = repo(&store).await;

    let all = repo.fetch_events_by_category(CategoryFilter::All, 10).await.unwrap();
    let top = repo.fetch_top_events(10).await.unwrap();
    assert_eq!(all, top);
  }

  #[tokio::test]
  async fn test_nearby_filters_radius_sorts_by_distance() {
    let store = MemoryStore::new();
    // One degree of latitude is ~111.19 km, so 0.08 deg ~ 8.9 km and
    // 0.10 deg ~ 11.1 km from the origin.
    store.insert("events", "near", fields("near", "Music", "2024-01-01", 0.08, 0.0, None));
    store.insert("events", "far", fields("far", "Music", "2024-01-02", 0.10, 0.0, None));
    store.insert("events", "nearest", fields("nearest", "Music", "2024-01-03", 0.02, 0.0, None));
    let repo = repo(&store).await;

    let nearby = repo.fetch_nearby_events(0.0, 0.0, 10.0, 30).await.unwrap();
    let ids: Vec<&str> = nearby.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["nearest", "near"]);
  }

  #[tokio::test]
  async fn test_nearby_respects_max() {
    let store = MemoryStore::new();
    store.insert("events", "a", fields("a", "Music", "2024-01-01", 0.01, 0.0, None));
    store.insert("events", "b", fields("b", "Music", "2024-01-02", 0.02, 0.0, None));
    store.insert("events", "c", fields("c", "Music", "2024-01-03", 0.03, 0.0, None));
    let repo = repo(&store).await;

    let nearby = repo.fetch_nearby_events(0.0, 0.0, 10.0, 2).await.unwrap();
    assert_eq!(nearby.len(), 2);
  }

  #[tokio::test]
  async fn test_nearby_rejects_invalid_center() {
    let store = MemoryStore::new();
    let repo = repo(&store).await;

    let err = repo.fetch_nearby_events(91.0, 0.0, 10.0, 30).await;
    assert!(matches!(err, Err(EventsError::InvalidLocation(_))));
  }

  #[tokio::test]
  async fn test_search_matches_title_or_venue_case_insensitive() {
    let store = MemoryStore::new();
    store.insert("events", "a", fields("Jazz Night", "Music", "2024-01-01", 0.0, 0.0, None));
    store.insert("events", "b", fields("Street Food", "Food", "2024-01-01", 0.0, 0.0, None));
    let repo = repo(&store).await;

    let by_title = repo.search_events("  jAzZ ", 50).await.unwrap();
    assert_eq!(by_title.len(), 1);
    assert_eq!(by_title[0].id, "a");

    // Venue strings are "<title> venue".
    let by_venue = repo.search_events("food venue", 50).await.unwrap();
    assert_eq!(by_venue.len(), 1);
    assert_eq!(by_venue[0].id, "b");
  }

  #[tokio::test]
  async fn test_fetch_serves_from_cache_until_invalidated() {
    let store = MemoryStore::new();
    store.insert("events", "a", fields("a", "Music", "2024-01-01", 0.0, 0.0, Some(1)));
    store.insert("events", "b", fields("b", "Music", "2024-01-02", 0.0, 0.0, Some(5)));
    let repo = repo(&store).await;

    let before = repo.fetch_all_events().await.unwrap();
    assert_eq!(before[0].id, "b");

    // A direct store write is invisible while the cache entry lives.
    store.insert("events", "a", fields("a", "Music", "2024-01-01", 0.0, 0.0, Some(50)));
    let still_cached = repo.fetch_all_events().await.unwrap();
    assert_eq!(still_cached[0].id, "b");

    // A popularity mutation through the repository invalidates it.
    repo.increment_event_popularity("a").await.unwrap();
    let after = repo.fetch_all_events().await.unwrap();
    assert_eq!(after[0].id, "a");
    assert_eq!(after[0].popularity(), 51);
  }

  #[tokio::test]
  async fn test_popularity_mutation_invalidates_every_query_shape() {
    let store = MemoryStore::new();
    store.insert("events", "a", fields("a", "Music", "2024-01-01", 0.0, 0.0, Some(1)));
    store.insert("events", "b", fields("b", "Music", "2024-01-02", 0.0, 0.0, Some(5)));
    let repo = repo(&store).await;

    // Warm an assortment of shapes, including a max the original app
    // never enumerated in its clear-list.
    repo.fetch_top_events(7).await.unwrap();
    repo
      .fetch_events_by_category(CategoryFilter::Only(Category::Music), 10)
      .await
      .unwrap();

    repo.increment_event_popularity("a").await.unwrap();
    repo.increment_event_popularity("a").await.unwrap();
    repo.increment_event_popularity("a").await.unwrap();
    repo.increment_event_popularity("a").await.unwrap();
    repo.increment_event_popularity("a").await.unwrap();

    let top = repo.fetch_top_events(7).await.unwrap();
    assert_eq!(top[0].id, "a");

    let music = repo
      .fetch_events_by_category(CategoryFilter::Only(Category::Music), 10)
      .await
      .unwrap();
    assert_eq!(music[0].id, "a");
  }

  #[tokio::test]
  async fn test_cache_entries_expire_after_the_ttl() {
    let store = MemoryStore::new();
    store.insert("events", "a", fields("a", "Music", "2024-01-01", 0.0, 0.0, Some(1)));
    let cache = TtlCache::open(MemoryStorage::new()).await;
    let repo = EventRepository::new(Arc::new(store.clone()), Arc::new(cache))
      .with_ttl(Duration::milliseconds(40));

    repo.fetch_all_events().await.unwrap();
    store.insert("events", "b", fields("b", "Music", "2024-01-02", 0.0, 0.0, Some(9)));

    // Within the window the stale list is served.
    assert_eq!(repo.fetch_all_events().await.unwrap().len(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert_eq!(repo.fetch_all_events().await.unwrap().len(), 2);
  }

  struct FailingStore;

  #[async_trait::async_trait]
  impl DocumentStore for FailingStore {
    async fn query(&self, _: &str, _: CollectionQuery) -> Result<Vec<Document>, StoreError> {
      Err(StoreError::Status { status: 503, body: "down".to_string() })
    }

    async fn get(&self, _: &str, _: &str) -> Result<Option<Document>, StoreError> {
      Err(StoreError::Status { status: 503, body: "down".to_string() })
    }

    async fn increment(&self, _: &str, _: &str, _: &str, _: i64) -> Result<(), StoreError> {
      Err(StoreError::Status { status: 503, body: "down".to_string() })
    }

    fn watch_document(&self, _: &str, _: &str) -> crate::store::DocumentWatch {
      Box::pin(futures::stream::empty())
    }

    fn watch_collection(&self, _: &str) -> crate::store::CollectionWatch {
      Box::pin(futures::stream::empty())
    }
  }

  #[tokio::test]
  async fn test_remote_failure_propagates() {
    let cache = TtlCache::open(MemoryStorage::new()).await;
    let repo = EventRepository::new(Arc::new(FailingStore), Arc::new(cache));

    let err = repo.fetch_all_events().await;
    assert!(matches!(err, Err(EventsError::RemoteUnavailable(_))));

    let err = repo.increment_event_popularity("a").await;
    assert!(matches!(err, Err(EventsError::RemoteUnavailable(_))));
  }
}
