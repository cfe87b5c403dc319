//! In-memory key-value storage, primarily for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{KvStorage, StorageError};

/// HashMap-backed storage. Clones share the same map, so a "reopened"
/// clone sees earlier writes the way a reopened database file would.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
  inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl KvStorage for MemoryStorage {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
    let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(map.get(key).cloned())
  }

  async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
    let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    map.insert(key.to_string(), value.to_vec());
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<(), StorageError> {
    let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    map.remove(key);
    Ok(())
  }

  async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError> {
    let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    map.retain(|key, _| !key.starts_with(prefix));
    Ok(())
  }
}
