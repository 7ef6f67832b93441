//! Registry of consumers holding interest in cache entries
//!
//! A filename with at least one registered consumer is locked and must never
//! be evicted. One table is shared by a cache manager and all of its
//! consumers; construct it once and hand out `Arc` clones.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::trace;

use crate::types::ConsumerId;

#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, HashSet<ConsumerId>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` as interested in `filename`. Idempotent.
    pub fn acquire(&self, filename: &str, consumer: &ConsumerId) {
        let mut locks = self.locks.lock();
        let inserted = locks
            .entry(filename.to_string())
            .or_default()
            .insert(consumer.clone());
        if inserted {
            trace!(filename, consumer = %consumer, "Cache lock acquired");
        }
    }

    /// Drop `consumer`'s interest in `filename`. Idempotent.
    pub fn release(&self, filename: &str, consumer: &ConsumerId) {
        let mut locks = self.locks.lock();
        if let Some(holders) = locks.get_mut(filename) {
            if holders.remove(consumer) {
                trace!(filename, consumer = %consumer, "Cache lock released");
            }
            if holders.is_empty() {
                locks.remove(filename);
            }
        }
    }

    pub fn is_locked(&self, filename: &str) -> bool {
        self.locks
            .lock()
            .get(filename)
            .is_some_and(|holders| !holders.is_empty())
    }

    /// Number of consumers currently holding `filename`
    pub fn holders(&self, filename: &str) -> usize {
        self.locks.lock().get(filename).map_or(0, HashSet::len)
    }

    /// Filenames with at least one holder, at the moment of the call
    pub fn snapshot(&self) -> HashSet<String> {
        self.locks.lock().keys().cloned().collect()
    }
}
