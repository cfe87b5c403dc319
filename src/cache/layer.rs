//! TTL cache over a key-value storage backend.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use crate::storage::KvStorage;

/// Storage key holding the current generation counter.
const GENERATION_KEY: &str = "cache:generation";

/// Best-effort cache: storage failures are logged and swallowed, never
/// surfaced. Physical keys are namespaced `cache:g{generation}:{key}`;
/// bumping the generation makes every previously written key unreachable,
/// which is how popularity mutations invalidate all cached rankings
/// without enumerating them.
pub struct TtlCache<S: KvStorage> {
  storage: Arc<S>,
  generation: AtomicU64,
}

impl<S: KvStorage> TtlCache<S> {
  /// Open a cache over `storage`, resuming the persisted generation so a
  /// restart cannot resurrect entries written before the last invalidation.
  pub async fn open(storage: S) -> Self {
    let storage = Arc::new(storage);

    let generation = match storage.get(GENERATION_KEY).await {
      Ok(Some(raw)) => std::str::from_utf8(&raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0),
      Ok(None) => 0,
      Err(e) => {
        warn!(error = %e, "could not load cache generation, starting at 0");
        0
      }
    };

    Self {
      storage,
      generation: AtomicU64::new(generation),
    }
  }

  fn physical_key(&self, key: &str) -> String {
    format!("cache:g{}:{}", self.generation.load(Ordering::Acquire), key)
  }

  /// Store `value` under `key` with the given time-to-live, overwriting
  /// any existing entry.
  pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
    let entry = CacheEntry::new(value, ttl);

    let payload = match serde_json::to_vec(&entry) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(key, error = %e, "could not serialize cache entry");
        return;
      }
    };

    if let Err(e) = self.storage.put(&self.physical_key(key), &payload).await {
      warn!(key, error = %e, "cache write failed");
    }
  }

  /// Look up `key`. Expired and unreadable entries count as misses and are
  /// deleted on the way out.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let physical = self.physical_key(key);

    let raw = match self.storage.get(&physical).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    match serde_json::from_slice::<CacheEntry<T>>(&raw) {
      Ok(entry) if !entry.is_expired() => Some(entry.value),
      Ok(_) => {
        debug!(key, "cache entry expired");
        self.delete_quiet(&physical).await;
        None
      }
      Err(e) => {
        warn!(key, error = %e, "discarding unreadable cache entry");
        self.delete_quiet(&physical).await;
        None
      }
    }
  }

  /// Unconditional best-effort delete.
  pub async fn remove(&self, key: &str) {
    self.delete_quiet(&self.physical_key(key)).await;
  }

  /// Best-effort delete of several keys.
  pub async fn remove_many(&self, keys: &[&str]) {
    for key in keys {
      self.remove(key).await;
    }
  }

  /// Invalidate every entry by bumping the generation. The new counter is
  /// persisted and the superseded generation's rows are purged, both
  /// best-effort.
  pub async fn invalidate_all(&self) {
    let old = self.generation.fetch_add(1, Ordering::AcqRel);
    let next = old + 1;
    debug!(generation = next, "cache generation bumped");

    if let Err(e) = self.storage.put(GENERATION_KEY, next.to_string().as_bytes()).await {
      warn!(error = %e, "could not persist cache generation");
    }

    if let Err(e) = self.storage.remove_prefix(&format!("cache:g{}:", old)).await {
      warn!(error = %e, "could not purge superseded cache entries");
    }
  }

  async fn delete_quiet(&self, physical: &str) {
    if let Err(e) = self.storage.remove(physical).await {
      warn!(key = physical, error = %e, "cache delete failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStorage;
  use std::time::Duration as StdDuration;

  #[tokio::test]
  async fn test_get_returns_latest_set_before_expiry() {
    let cache = TtlCache::open(MemoryStorage::new()).await;

    cache.set("x", &41, Duration::milliseconds(1000)).await;
    cache.set("x", &42, Duration::milliseconds(1000)).await;

    assert_eq!(cache.get::<i32>("x").await, Some(42));
  }

  #[tokio::test]
  async fn test_expired_entry_is_a_miss_and_eviction_is_idempotent() {
    let cache = TtlCache::open(MemoryStorage::new()).await;

    cache.set("x", &42, Duration::milliseconds(40)).await;
    assert_eq!(cache.get::<i32>("x").await, Some(42));

    tokio::time::sleep(StdDuration::from_millis(60)).await;

    assert_eq!(cache.get::<i32>("x").await, None);
    // A second read after eviction is still a miss.
    assert_eq!(cache.get::<i32>("x").await, None);
  }

  #[tokio::test]
  async fn test_remove_and_remove_many() {
    let cache = TtlCache::open(MemoryStorage::new()).await;

    cache.set("a", &1, Duration::minutes(5)).await;
    cache.set("b", &2, Duration::minutes(5)).await;
    cache.set("c", &3, Duration::minutes(5)).await;

    cache.remove("a").await;
    cache.remove_many(&["b", "c"]).await;

    assert_eq!(cache.get::<i32>("a").await, None);
    assert_eq!(cache.get::<i32>("b").await, None);
    assert_eq!(cache.get::<i32>("c").await, None);
  }

  #[tokio::test]
  async fn test_corrupt_payload_reads_as_miss() {
    let storage = MemoryStorage::new();
    let cache = TtlCache::open(storage.clone()).await;

    storage.put("cache:g0:x", b"not json").await.unwrap();

    assert_eq!(cache.get::<i32>("x").await, None);
    // The corrupt row was dropped.
    assert_eq!(storage.get("cache:g0:x").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_invalidate_all_orphans_every_key() {
    let cache = TtlCache::open(MemoryStorage::new()).await;

    cache.set("a", &1, Duration::minutes(5)).await;
    cache.set("b", &2, Duration::minutes(5)).await;

    cache.invalidate_all().await;

    assert_eq!(cache.get::<i32>("a").await, None);
    assert_eq!(cache.get::<i32>("b").await, None);

    // Writes after the bump land in the new generation.
    cache.set("a", &3, Duration::minutes(5)).await;
    assert_eq!(cache.get::<i32>("a").await, Some(3));
  }

  #[tokio::test]
  async fn test_generation_survives_reopen() {
    let storage = MemoryStorage::new();

    let cache = TtlCache::open(storage.clone()).await;
    cache.set("a", &1, Duration::minutes(5)).await;
    cache.invalidate_all().await;

    // A fresh cache over the same storage must not see pre-bump entries.
    let reopened = TtlCache::open(storage).await;
    assert_eq!(reopened.get::<i32>("a").await, None);
  }
}
