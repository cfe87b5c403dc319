//! Remote document store seam.
//!
//! The events core needs exactly four capabilities from its backing store:
//! collection queries (filter/order/limit), single-document reads, atomic
//! numeric increments, and change notifications on documents and
//! collections. [`DocumentStore`] captures those; [`FirestoreStore`] speaks
//! them over the Firestore REST API and [`MemoryStore`] over a HashMap for
//! tests and local development.

mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("invalid store endpoint: {0}")]
  Endpoint(#[from] url::ParseError),

  #[error("store returned status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("malformed store response: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("missing credentials: {0}")]
  Credentials(String),
}

/// A document as the store returns it: its id plus the raw field object.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub id: String,
  pub fields: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Ascending,
  Descending,
}

/// Order clause for a collection query.
#[derive(Debug, Clone)]
pub struct OrderBy {
  pub field: String,
  pub direction: Direction,
}

/// Shape of a collection read.
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
  /// Equality filter on a single field.
  pub filter: Option<(String, Value)>,
  pub order_by: Option<OrderBy>,
  pub limit: Option<usize>,
}

impl CollectionQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn where_eq(mut self, field: &str, value: Value) -> Self {
    self.filter = Some((field.to_string(), value));
    self
  }

  pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
    self.order_by = Some(OrderBy {
      field: field.to_string(),
      direction,
    });
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

/// Stream of single-document snapshots. `None` means the document does not
/// exist (or was deleted). The stream ends only when dropped.
pub type DocumentWatch = BoxStream<'static, Result<Option<Document>, StoreError>>;

/// Stream of whole-collection snapshots.
pub type CollectionWatch = BoxStream<'static, Result<Vec<Document>, StoreError>>;

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
  /// Run a collection query. Documents missing the order-by field fall out
  /// of an ordered query, matching document-store index semantics.
  async fn query(&self, collection: &str, query: CollectionQuery) -> Result<Vec<Document>, StoreError>;

  /// Read a single document.
  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

  /// Atomically add `delta` to a numeric field on the server.
  async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<(), StoreError>;

  /// Watch one document. Emits the current snapshot first, then one item
  /// per observed change.
  fn watch_document(&self, collection: &str, id: &str) -> DocumentWatch;

  /// Watch a whole collection the same way.
  fn watch_collection(&self, collection: &str) -> CollectionWatch;
}
