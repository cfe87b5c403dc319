use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(PathBuf),

  #[error(
    "no configuration file found; create one at ~/.config/eventfinder/config.yaml"
  )]
  Missing,

  #[error("could not read config file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("could not parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("Firestore API key not found. Set EVENTFINDER_API_KEY or FIRESTORE_API_KEY.")]
  MissingApiKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub firestore: FirestoreConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
  pub project_id: String,
  /// Collection holding event documents.
  #[serde(default = "default_collection")]
  pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Freshness window for cached query results.
  #[serde(default = "default_ttl_minutes")]
  pub ttl_minutes: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_minutes: default_ttl_minutes(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Polling cadence for live subscriptions.
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      poll_interval_secs: default_poll_interval_secs(),
    }
  }
}

fn default_collection() -> String {
  "events".to_string()
}

fn default_ttl_minutes() -> i64 {
  60
}

fn default_poll_interval_secs() -> u64 {
  5
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./eventfinder.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/eventfinder/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ConfigError::NotFound(p.to_path_buf()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(ConfigError::Missing),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("eventfinder.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("eventfinder").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
      path: path.to_path_buf(),
      source: e,
    })?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  /// Get the Firestore API key from environment variables.
  ///
  /// Checks EVENTFINDER_API_KEY first, then FIRESTORE_API_KEY as fallback.
  /// The key never lives in the config file.
  pub fn api_key() -> Result<String, ConfigError> {
    std::env::var("EVENTFINDER_API_KEY")
      .or_else(|_| std::env::var("FIRESTORE_API_KEY"))
      .map_err(|_| ConfigError::MissingApiKey)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_applies_defaults() {
    let config: Config = serde_yaml::from_str(
      "firestore:\n  project_id: eventapp-test\n",
    )
    .unwrap();

    assert_eq!(config.firestore.project_id, "eventapp-test");
    assert_eq!(config.firestore.collection, "events");
    assert_eq!(config.cache.ttl_minutes, 60);
    assert_eq!(config.store.poll_interval_secs, 5);
  }

  #[test]
  fn test_full_config_overrides_defaults() {
    let config: Config = serde_yaml::from_str(
      "firestore:\n  project_id: p\n  collection: happenings\ncache:\n  ttl_minutes: 5\nstore:\n  poll_interval_secs: 30\n",
    )
    .unwrap();

    assert_eq!(config.firestore.collection, "happenings");
    assert_eq!(config.cache.ttl_minutes, 5);
    assert_eq!(config.store.poll_interval_secs, 30);
  }
}
