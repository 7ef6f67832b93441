//! Scoped consumer interest in one cache entry

use std::sync::Arc;

use crate::lock_table::LockTable;
use crate::types::ConsumerId;

/// Holds a consumer's lock on a cache filename and releases it on drop.
///
/// Locks are keyed by (filename, consumer), so two guards for the same pair
/// share one lock and the first to end releases it.
#[derive(Debug)]
pub struct InterestGuard {
    table: Arc<LockTable>,
    filename: String,
    consumer: ConsumerId,
    released: bool,
}

impl InterestGuard {
    pub fn new(table: Arc<LockTable>, filename: String, consumer: ConsumerId) -> Self {
        table.acquire(&filename, &consumer);
        Self {
            table,
            filename,
            consumer,
            released: false,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    /// Release the lock now instead of at drop
    pub fn end(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.table.release(&self.filename, &self.consumer);
            self.released = true;
        }
    }
}

impl Drop for InterestGuard {
    fn drop(&mut self) {
        self.release();
    }
}
