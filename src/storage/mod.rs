//! Persistent key-value storage behind the cache and the favorites list.
//!
//! Both consumers treat storage as best-effort: callers absorb errors and
//! degrade (cache miss, empty favorites) rather than failing the operation.
//! Key namespaces keep the consumers apart (`cache:` prefixes vs the
//! versioned favorites key).

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("storage I/O error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("could not create storage directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("could not determine data directory")]
  NoDataDir,

  #[error("storage lock poisoned")]
  LockPoisoned,
}

/// String-keyed blob storage.
#[async_trait]
pub trait KvStorage: Send + Sync + 'static {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

  /// Store `value` under `key`, overwriting any existing entry.
  async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

  async fn remove(&self, key: &str) -> Result<(), StorageError>;

  /// Remove every key starting with `prefix`.
  async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError>;
}

/// Storage that keeps nothing. Used when persistence is disabled - every
/// read misses and every write is discarded.
pub struct NoopStorage;

#[async_trait]
impl KvStorage for NoopStorage {
  async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
    Ok(None)
  }

  async fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
    Ok(())
  }

  async fn remove(&self, _key: &str) -> Result<(), StorageError> {
    Ok(())
  }

  async fn remove_prefix(&self, _prefix: &str) -> Result<(), StorageError> {
    Ok(())
  }
}
