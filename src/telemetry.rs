//! Tracing bootstrap for the embedding application.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber. The filter comes from
/// `EVENTFINDER_LOG`, falling back to `RUST_LOG`, falling back to `info`.
/// Calling this twice is harmless; the second install is ignored.
pub fn init() {
  let filter = EnvFilter::try_from_env("EVENTFINDER_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
