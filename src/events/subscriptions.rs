//! Live-updating views over the store's change feeds.
//!
//! Each subscription spawns a fan-out task that consumes a watch stream
//! and invokes the caller's callback per snapshot. The returned handle
//! must be unsubscribed when the owning screen goes away; dropping it
//! without unsubscribing leaves the listener running for the rest of the
//! process lifetime.

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::storage::KvStorage;
use crate::store::DocumentStore;

use super::repository::{decode_documents, EventRepository};
use super::types::{popular_order, CategoryFilter, EventItem};

/// Handle to a live subscription.
pub struct EventSubscription {
  task: JoinHandle<()>,
}

impl EventSubscription {
  /// Release the underlying listener. After this returns no further
  /// callbacks fire.
  pub fn unsubscribe(self) {
    self.task.abort();
  }
}

impl<S: DocumentStore, K: KvStorage> EventRepository<S, K> {
  /// Follow a single event document. The callback receives `Some` with
  /// each snapshot, and `None` when the document is deleted or the listen
  /// fails; listen errors never terminate the subscription.
  pub fn subscribe_to_event_updates<F>(&self, id: &str, callback: F) -> EventSubscription
  where
    F: Fn(Option<EventItem>) + Send + 'static,
  {
    let mut watch = self.store().watch_document(self.collection(), id);

    let task = tokio::spawn(async move {
      while let Some(snapshot) = watch.next().await {
        match snapshot {
          Ok(Some(doc)) => match EventItem::from_document(&doc) {
            Ok(event) => callback(Some(event)),
            Err(e) => {
              warn!(id = %doc.id, error = %e, "undecodable event snapshot");
              callback(None);
            }
          },
          Ok(None) => callback(None),
          Err(e) => {
            warn!(error = %e, "event listen error");
            callback(None);
          }
        }
      }
    });

    EventSubscription { task }
  }

  /// Live version of `fetch_all_events`: the callback gets the whole
  /// collection in popular order on every change.
  pub fn subscribe_to_all_events_updates<F>(&self, callback: F) -> EventSubscription
  where
    F: Fn(Vec<EventItem>) + Send + 'static,
  {
    self.subscribe_collection(move |mut events| {
      events.sort_by(popular_order);
      callback(events);
    })
  }

  /// Live version of `fetch_top_events`.
  pub fn subscribe_to_top_events_updates<F>(&self, max: usize, callback: F) -> EventSubscription
  where
    F: Fn(Vec<EventItem>) + Send + 'static,
  {
    self.subscribe_collection(move |mut events| {
      events.sort_by(popular_order);
      events.truncate(max);
      callback(events);
    })
  }

  /// Live version of `fetch_events_by_category`.
  pub fn subscribe_to_category_events_updates<F>(
    &self,
    filter: CategoryFilter,
    max: usize,
    callback: F,
  ) -> EventSubscription
  where
    F: Fn(Vec<EventItem>) + Send + 'static,
  {
    self.subscribe_collection(move |mut events| {
      if let CategoryFilter::Only(category) = filter {
        events.retain(|e| e.category == category);
      }
      events.sort_by(popular_order);
      events.truncate(max);
      callback(events);
    })
  }

  fn subscribe_collection<F>(&self, derive: F) -> EventSubscription
  where
    F: Fn(Vec<EventItem>) + Send + 'static,
  {
    let mut watch = self.store().watch_collection(self.collection());

    let task = tokio::spawn(async move {
      while let Some(batch) = watch.next().await {
        match batch {
          Ok(docs) => derive(decode_documents(&docs)),
          Err(e) => {
            warn!(error = %e, "collection listen error");
            derive(Vec::new());
          }
        }
      }
    });

    EventSubscription { task }
  }
}
