//! Device location seam and the nearby-with-fallback read path.
//!
//! The repository never falls back on its own; the policy of "show popular
//! events when we can't locate the user" lives here, where the nearby
//! screen consumes it.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::error::EventsError;
use crate::events::repository::EventRepository;
use crate::events::types::EventItem;
use crate::geo;
use crate::storage::KvStorage;
use crate::store::DocumentStore;

/// One device position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
  pub latitude: f64,
  pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
  Granted,
  Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
  #[error("location permission denied")]
  PermissionDenied,
  #[error("location services disabled")]
  ServicesDisabled,
  #[error("location request timed out")]
  Timeout,
  #[error("location unavailable")]
  Unavailable,
  #[error("invalid position fix")]
  InvalidPosition,
}

impl LocationError {
  /// User-presentable message for each failure.
  pub fn user_message(&self) -> &'static str {
    match self {
      Self::Timeout => "Location request timed out. Please check your GPS signal and try again.",
      Self::ServicesDisabled | Self::Unavailable => {
        "Location is currently unavailable. Please check your GPS settings."
      }
      Self::InvalidPosition => "Invalid location data received. Please try again.",
      Self::PermissionDenied => "Location permission denied. Please grant permission in settings.",
    }
  }
}

/// Platform geolocation hook: a permission prompt plus one position read.
#[async_trait]
pub trait LocationProvider: Send + Sync {
  async fn request_permission(&self) -> PermissionStatus;
  async fn current_position(&self) -> Result<Position, LocationError>;
}

/// Nearby events for the device's position, falling back to the popular
/// list when the position (or the nearby query) cannot be served. Returns
/// the events plus a user-presentable message when the fallback was taken.
pub async fn nearby_or_popular<S, K, P>(
  repository: &EventRepository<S, K>,
  provider: &P,
  radius_km: f64,
  max: usize,
) -> Result<(Vec<EventItem>, Option<&'static str>), EventsError>
where
  S: DocumentStore,
  K: KvStorage,
  P: LocationProvider + ?Sized,
{
  let failure = match provider.request_permission().await {
    PermissionStatus::Granted => match provider.current_position().await {
      Ok(pos) if geo::is_valid_location(pos.latitude, pos.longitude) => {
        match repository
          .fetch_nearby_events(pos.latitude, pos.longitude, radius_km, max)
          .await
        {
          Ok(events) => return Ok((events, None)),
          Err(e) => {
            warn!(error = %e, "nearby fetch failed, falling back to popular events");
            let events = repository.fetch_top_events(max).await?;
            return Ok((events, Some("Failed to load events. Please try again.")));
          }
        }
      }
      Ok(_) => LocationError::InvalidPosition,
      Err(e) => e,
    },
    PermissionStatus::Denied => LocationError::PermissionDenied,
  };

  warn!(error = %failure, "falling back to popular events");
  let events = repository.fetch_top_events(max).await?;
  Ok((events, Some(failure.user_message())))
}
