//! Local disk cache for URL-addressed images
//!
//! Resolves a URL to a stable local file path, fetching on first request.
//! Entries that consumers currently hold are locked against eviction, and
//! ephemeral entries are pruned oldest-first once they exceed a byte budget.
//! Entries cached as permanent are never pruned.

mod cache;
mod config;
mod error;
mod eviction;
mod fetcher;
mod interest;
mod lock_table;
mod path_codec;
mod storage;
mod types;
mod validation;

pub use cache::CacheManager;
pub use config::{CacheConfig, DEFAULT_NAMESPACE_DIR, DEFAULT_PRUNE_TRIGGER_LIMIT};
pub use error::{CacheError, FetchError, Result};
pub use eviction::{plan as plan_eviction, EvictionPlan};
pub use fetcher::{Fetcher, HttpFetcher};
pub use interest::InterestGuard;
pub use lock_table::LockTable;
pub use path_codec::derive_filename;
pub use storage::Storage;
pub use types::{CacheStats, ConsumerId, EntryStat, PruneReport};
pub use validation::UrlValidator;
