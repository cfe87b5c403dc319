//! Cross-screen refresh signal.
//!
//! When a favorite toggle lands a popularity change, other screens (an open
//! detail view, the home ranking) need to reload their copy of the event.
//! The bus is an explicit pub/sub channel owned by the app instance, not a
//! process-wide singleton: screens subscribe while mounted and drop the
//! receiver on unmount.

use tokio::sync::broadcast;

/// Notification that an event's remote state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
  /// Id of the event whose popularity was mutated.
  pub event_id: String,
}

/// Clonable handle to the refresh channel.
#[derive(Debug, Clone)]
pub struct RefreshBus {
  tx: broadcast::Sender<RefreshEvent>,
}

impl RefreshBus {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(16);
    Self { tx }
  }

  /// Subscribe to refresh notifications. Dropping the receiver ends the
  /// subscription.
  pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
    self.tx.subscribe()
  }

  /// Publish a refresh for `event_id`. A send with no live subscribers is
  /// not an error.
  pub fn publish(&self, event_id: &str) {
    let _ = self.tx.send(RefreshEvent {
      event_id: event_id.to_string(),
    });
  }
}

impl Default for RefreshBus {
  fn default() -> Self {
    Self::new()
  }
}
