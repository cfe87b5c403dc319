//! Time-boxed caching for remote query results.
//!
//! Every entry carries its own absolute expiration instant, so different
//! query shapes can pick different freshness windows. Expired or unreadable
//! entries are discarded on read (lazy eviction - no background sweep), and
//! a generation counter lets a popularity mutation orphan every cached
//! ranking at once instead of enumerating keys.

mod entry;
mod layer;

pub use entry::CacheEntry;
pub use layer::TtlCache;
