//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one consumer holding interest in cache entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Generate a fresh random consumer id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConsumerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Storage metadata for one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStat {
    pub filename: String,
    pub size_bytes: u64,
    pub last_access: DateTime<Utc>,
    pub permanent: bool,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub permanent_entries: usize,
    pub ephemeral_bytes: u64,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Outcome of one eviction pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    /// Filenames actually removed from storage
    pub deleted: Vec<String>,
    /// Filenames selected for eviction that were skipped or failed to delete
    pub failed: Vec<String>,
    pub freed_bytes: u64,
    /// Ephemeral bytes left after the pass
    pub remaining_bytes: u64,
    pub budget_bytes: u64,
    pub over_budget: bool,
}
