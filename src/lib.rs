//! Data layer for an event-discovery app: cached queries over a remote
//! event store, popularity ranking, a bounded favorites list, and live
//! subscriptions.
//!
//! The UI talks to three front doors:
//! - [`EventRepository`] for every read (all/top/category/nearby/search)
//!   and for the popularity counter mutations,
//! - [`FavoritesStore`] for saving and unsaving events,
//! - [`RefreshBus`] for the cross-screen "something changed" signal.
//!
//! Underneath, [`store::DocumentStore`] abstracts the remote document
//! store (Firestore REST in production, in-memory for tests),
//! [`cache::TtlCache`] keeps query results fresh for a configurable
//! window, and [`storage::KvStorage`] persists both the cache and the
//! favorites list.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod favorites;
pub mod geo;
pub mod location;
pub mod refresh;
pub mod storage;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::EventsError;
pub use events::repository::EventRepository;
pub use events::subscriptions::EventSubscription;
pub use events::types::{Category, CategoryFilter, Coordinates, EventItem, FavoriteItem};
pub use favorites::{FavoritesStore, MAX_FAVORITES};
pub use location::{nearby_or_popular, LocationError, LocationProvider, PermissionStatus, Position};
pub use refresh::{RefreshBus, RefreshEvent};
