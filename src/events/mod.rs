//! Event domain: types, cache keys, repository, live subscriptions.

pub mod keys;
pub mod repository;
pub mod subscriptions;
pub mod types;
