//! SQLite-backed key-value storage.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KvStorage, StorageError};

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite storage with a single serialized connection.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the database at the default location.
  pub fn open() -> Result<Self, StorageError> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    Self::open_at(&path)
  }

  /// Open or create the database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// Fully in-memory database, for tests and throwaway sessions.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(KV_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database path under the platform data directory.
  fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StorageError::NoDataDir)?;

    Ok(data_dir.join("eventfinder").join("data.db"))
  }
}

#[async_trait]
impl KvStorage for SqliteStorage {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;

    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get::<_, Vec<u8>>(0),
      )
      .optional()?;

    Ok(value)
  }

  async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;

    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, written_at) VALUES (?1, ?2, datetime('now'))",
      params![key, value],
    )?;

    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<(), StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;

    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;

    Ok(())
  }

  async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;

    // substr comparison instead of LIKE so prefixes containing wildcard
    // characters stay literal.
    conn.execute(
      "DELETE FROM kv_store WHERE substr(key, 1, ?1) = ?2",
      params![prefix.chars().count() as i64, prefix],
    )?;

    Ok(())
  }
}
