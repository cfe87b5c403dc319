//! The user's bounded, persisted list of saved events.
//!
//! Saving an event also bumps its remote popularity counter; unsaving
//! decrements it. Local membership and the remote counter are two separate
//! operations with no combined rollback: a failed counter mutation is
//! logged and local state stands, reconciled by the next successful
//! mutation. The whole toggle runs under one lock so rapid toggles of the
//! same event serialize instead of racing.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::events::repository::EventRepository;
use crate::events::types::{EventItem, FavoriteItem};
use crate::refresh::RefreshBus;
use crate::storage::KvStorage;
use crate::store::DocumentStore;

/// Hard cap on saved events; the oldest save is evicted past this.
pub const MAX_FAVORITES: usize = 10;

/// Storage key for the persisted list.
const FAVORITES_KEY: &str = "favorites_v1";

pub struct FavoritesStore<S: DocumentStore, K: KvStorage> {
  storage: Arc<K>,
  repository: Arc<EventRepository<S, K>>,
  bus: RefreshBus,
  items: Mutex<Vec<FavoriteItem>>,
}

impl<S: DocumentStore, K: KvStorage> FavoritesStore<S, K> {
  pub fn new(storage: Arc<K>, repository: Arc<EventRepository<S, K>>, bus: RefreshBus) -> Self {
    Self {
      storage,
      repository,
      bus,
      items: Mutex::new(Vec::new()),
    }
  }

  /// Reload the persisted list, newest first. Used on mount and whenever
  /// the favorites view regains focus. Storage trouble degrades to the
  /// empty list.
  pub async fn load(&self) {
    let mut loaded: Vec<FavoriteItem> = Vec::new();

    match self.storage.get(FAVORITES_KEY).await {
      Ok(Some(raw)) => match serde_json::from_slice(&raw) {
        Ok(list) => loaded = list,
        Err(e) => warn!(error = %e, "discarding unreadable favorites payload"),
      },
      Ok(None) => {}
      Err(e) => warn!(error = %e, "could not load favorites"),
    }

    loaded.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));

    let mut items = self.items.lock().await;
    *items = loaded;
  }

  /// Save or unsave `event`, returning the new membership state. The list
  /// change persists immediately; the remote counter follows, and on
  /// success a refresh is published for other screens.
  pub async fn toggle_favorite(&self, event: &EventItem) -> bool {
    let mut items = self.items.lock().await;

    let was_saved = items.iter().any(|f| f.event.id == event.id);
    if was_saved {
      items.retain(|f| f.event.id != event.id);
    } else {
      items.insert(
        0,
        FavoriteItem {
          event: event.clone(),
          saved_at: Utc::now(),
        },
      );
      // Newest-first order: everything past the cap is the oldest saves.
      items.truncate(MAX_FAVORITES);
    }

    self.persist(&items).await;

    let result = if was_saved {
      self.repository.decrement_event_popularity(&event.id).await
    } else {
      self.repository.increment_event_popularity(&event.id).await
    };

    match result {
      Ok(()) => self.bus.publish(&event.id),
      Err(e) => warn!(event_id = %event.id, error = %e, "popularity update failed"),
    }

    !was_saved
  }

  /// Membership check against the in-memory list.
  pub async fn is_favorite(&self, id: &str) -> bool {
    self.items.lock().await.iter().any(|f| f.event.id == id)
  }

  /// Snapshot of the current list, newest first.
  pub async fn favorites(&self) -> Vec<FavoriteItem> {
    self.items.lock().await.clone()
  }

  async fn persist(&self, items: &[FavoriteItem]) {
    let raw = match serde_json::to_vec(items) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(error = %e, "could not serialize favorites");
        return;
      }
    };

    if let Err(e) = self.storage.put(FAVORITES_KEY, &raw).await {
      warn!(error = %e, "favorites write failed");
    }
  }
}
