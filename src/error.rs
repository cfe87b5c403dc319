use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced to callers of the events core.
///
/// Only remote-store trouble and bad coordinates ever reach the caller.
/// Cache and persistent-storage problems are absorbed where they happen
/// (logged, treated as a miss or a best-effort write) since both are
/// optimizations rather than correctness dependencies.
#[derive(Debug, Error)]
pub enum EventsError {
  /// A query or mutation against the remote document store failed.
  /// Propagated as-is; reads are not retried internally.
  #[error("remote store unavailable: {0}")]
  RemoteUnavailable(#[from] StoreError),

  /// Coordinates failed range or finiteness validation. The message is
  /// suitable for direct display to the user.
  #[error("{0}")]
  InvalidLocation(String),
}
