//! In-memory document store for tests and local development.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use super::{
  CollectionQuery, CollectionWatch, Direction, Document, DocumentStore, DocumentWatch, StoreError,
};

/// HashMap-of-collections store with broadcast change notifications backing
/// the watch streams. Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
  inner: Arc<Inner>,
}

struct Inner {
  collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
  changes: broadcast::Sender<String>,
}

impl MemoryStore {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(64);
    Self {
      inner: Arc::new(Inner {
        collections: Mutex::new(HashMap::new()),
        changes,
      }),
    }
  }

  /// Insert or replace a document, notifying watchers.
  pub fn insert(&self, collection: &str, id: &str, fields: Value) {
    {
      let mut collections = self.lock();
      collections
        .entry(collection.to_string())
        .or_default()
        .insert(id.to_string(), fields);
    }
    self.notify(collection);
  }

  /// Delete a document, notifying watchers.
  pub fn delete(&self, collection: &str, id: &str) {
    {
      let mut collections = self.lock();
      if let Some(docs) = collections.get_mut(collection) {
        docs.remove(id);
      }
    }
    self.notify(collection);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, Value>>> {
    self
      .inner
      .collections
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn notify(&self, collection: &str) {
    let _ = self.inner.changes.send(collection.to_string());
  }

  fn lookup(&self, collection: &str, id: &str) -> Option<Document> {
    let collections = self.lock();
    collections.get(collection).and_then(|docs| {
      docs.get(id).map(|fields| Document {
        id: id.to_string(),
        fields: fields.clone(),
      })
    })
  }

  fn snapshot(&self, collection: &str) -> Vec<Document> {
    let collections = self.lock();
    collections
      .get(collection)
      .map(|docs| {
        docs
          .iter()
          .map(|(id, fields)| Document {
            id: id.clone(),
            fields: fields.clone(),
          })
          .collect()
      })
      .unwrap_or_default()
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

fn compare_fields(a: &Value, b: &Value) -> Ordering {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(Ordering::Equal),
    (Value::String(x), Value::String(y)) => x.cmp(y),
    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
    _ => Ordering::Equal,
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn query(&self, collection: &str, query: CollectionQuery) -> Result<Vec<Document>, StoreError> {
    let mut docs = self.snapshot(collection);

    if let Some((field, value)) = &query.filter {
      docs.retain(|d| d.fields.get(field) == Some(value));
    }

    if let Some(order) = &query.order_by {
      // Ordered queries drop documents missing the field, like a real
      // document-store index does.
      docs.retain(|d| d.fields.get(&order.field).is_some());
      docs.sort_by(|a, b| {
        let ord = compare_fields(
          a.fields.get(&order.field).unwrap_or(&Value::Null),
          b.fields.get(&order.field).unwrap_or(&Value::Null),
        );
        match order.direction {
          Direction::Ascending => ord,
          Direction::Descending => ord.reverse(),
        }
      });
    }

    if let Some(limit) = query.limit {
      docs.truncate(limit);
    }

    Ok(docs)
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    Ok(self.lookup(collection, id))
  }

  async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<(), StoreError> {
    {
      let mut collections = self.lock();
      let fields = collections
        .get_mut(collection)
        .and_then(|docs| docs.get_mut(id))
        .ok_or_else(|| StoreError::Status {
          status: 404,
          body: format!("no document {}/{}", collection, id),
        })?;

      let current = fields.get(field).and_then(Value::as_i64).unwrap_or(0);
      if let Some(object) = fields.as_object_mut() {
        object.insert(field.to_string(), Value::from(current + delta));
      }
    }
    self.notify(collection);
    Ok(())
  }

  fn watch_document(&self, collection: &str, id: &str) -> DocumentWatch {
    struct State {
      store: MemoryStore,
      collection: String,
      id: String,
      rx: broadcast::Receiver<String>,
      last: Option<Option<Document>>,
    }

    let state = State {
      store: self.clone(),
      collection: collection.to_string(),
      id: id.to_string(),
      rx: self.inner.changes.subscribe(),
      last: None,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
      loop {
        let current = st.store.lookup(&st.collection, &st.id);
        if st.last.as_ref() != Some(&current) {
          st.last = Some(current.clone());
          return Some((Ok(current), st));
        }

        loop {
          match st.rx.recv().await {
            Ok(changed) if changed == st.collection => break,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => break,
            Err(broadcast::error::RecvError::Closed) => return None,
          }
        }
      }
    }))
  }

  fn watch_collection(&self, collection: &str) -> CollectionWatch {
    struct State {
      store: MemoryStore,
      collection: String,
      rx: broadcast::Receiver<String>,
      last: Option<Vec<Document>>,
    }

    let state = State {
      store: self.clone(),
      collection: collection.to_string(),
      rx: self.inner.changes.subscribe(),
      last: None,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
      loop {
        let current = st.store.snapshot(&st.collection);
        if st.last.as_ref() != Some(&current) {
          st.last = Some(current.clone());
          return Some((Ok(current), st));
        }

        loop {
          match st.rx.recv().await {
            Ok(changed) if changed == st.collection => break,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => break,
            Err(broadcast::error::RecvError::Closed) => return None,
          }
        }
      }
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::StreamExt;
  use serde_json::json;

  #[tokio::test]
  async fn test_query_filters_orders_and_limits() {
    let store = MemoryStore::new();
    store.insert("events", "a", json!({ "kind": "x", "rank": 3 }));
    store.insert("events", "b", json!({ "kind": "x", "rank": 1 }));
    store.insert("events", "c", json!({ "kind": "y", "rank": 2 }));

    let docs = store
      .query(
        "events",
        CollectionQuery::new()
          .where_eq("kind", json!("x"))
          .order_by("rank", Direction::Ascending)
          .limit(1),
      )
      .await
      .unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "b");
  }

  #[tokio::test]
  async fn test_ordered_query_drops_documents_missing_the_field() {
    let store = MemoryStore::new();
    store.insert("events", "a", json!({ "rank": 1 }));
    store.insert("events", "b", json!({ "title": "no rank" }));

    let docs = store
      .query(
        "events",
        CollectionQuery::new().order_by("rank", Direction::Descending),
      )
      .await
      .unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "a");
  }

  #[tokio::test]
  async fn test_increment_missing_document_errors() {
    let store = MemoryStore::new();
    let err = store.increment("events", "nope", "popularity", 1).await;
    assert!(matches!(err, Err(StoreError::Status { status: 404, .. })));
  }

  #[tokio::test]
  async fn test_increment_adds_to_absent_field() {
    let store = MemoryStore::new();
    store.insert("events", "a", json!({ "title": "t" }));

    store.increment("events", "a", "popularity", 1).await.unwrap();
    store.increment("events", "a", "popularity", 1).await.unwrap();

    let doc = store.get("events", "a").await.unwrap().unwrap();
    assert_eq!(doc.fields.get("popularity"), Some(&json!(2)));
  }

  #[tokio::test]
  async fn test_watch_document_emits_initial_then_changes() {
    let store = MemoryStore::new();
    store.insert("events", "a", json!({ "v": 1 }));

    let mut watch = store.watch_document("events", "a");

    let first = watch.next().await.unwrap().unwrap();
    assert_eq!(first.unwrap().fields, json!({ "v": 1 }));

    store.insert("events", "a", json!({ "v": 2 }));
    let second = watch.next().await.unwrap().unwrap();
    assert_eq!(second.unwrap().fields, json!({ "v": 2 }));

    store.delete("events", "a");
    let third = watch.next().await.unwrap().unwrap();
    assert!(third.is_none());
  }

  #[tokio::test]
  async fn test_watch_collection_sees_inserts() {
    let store = MemoryStore::new();

    let mut watch = store.watch_collection("events");
    assert_eq!(watch.next().await.unwrap().unwrap().len(), 0);

    store.insert("events", "a", json!({ "v": 1 }));
    assert_eq!(watch.next().await.unwrap().unwrap().len(), 1);
  }
}
