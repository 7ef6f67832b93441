//! Cache manager: URL to local path resolution with pruning

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::eviction::{self, EvictionPlan};
use crate::fetcher::Fetcher;
use crate::interest::InterestGuard;
use crate::lock_table::LockTable;
use crate::path_codec::derive_filename;
use crate::storage::Storage;
use crate::types::{CacheStats, ConsumerId, EntryStat, PruneReport};

/// Resolves URLs to files in one namespace directory, fetching on miss and
/// keeping ephemeral entries under a byte budget
pub struct CacheManager {
    storage: Storage,
    /// Consumer locks, shared with every consumer of this cache
    locks: Arc<LockTable>,
    fetcher: Arc<dyn Fetcher>,
    /// Maximum ephemeral bytes before a prune deletes anything
    budget_bytes: u64,
    /// Serializes prune passes so two never plan against the same listing
    prune_gate: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    /// Create a cache manager after validating `config`
    pub fn new(
        config: &CacheConfig,
        locks: Arc<LockTable>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage: Storage::new(config.namespace_path()),
            locks,
            fetcher,
            budget_bytes: config.prune_trigger_limit,
            prune_gate: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Ensure the namespace directory exists and clear leftovers of
    /// interrupted writes
    pub async fn init(&self) -> Result<()> {
        self.storage.ensure_dir().await?;
        let swept = self.storage.sweep_orphans().await?;
        if swept > 0 {
            info!(swept, "Removed orphaned cache temporaries and markers");
        }
        info!(
            cache_dir = ?self.storage.dir(),
            budget_bytes = self.budget_bytes,
            "Cache initialized"
        );
        Ok(())
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.locks
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn filename_for(&self, url: &str) -> String {
        derive_filename(url)
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.storage.path(&derive_filename(url))
    }

    /// Lock the entry for `url` on behalf of `consumer` until the guard ends
    pub fn begin_interest(&self, url: &str, consumer: ConsumerId) -> InterestGuard {
        InterestGuard::new(Arc::clone(&self.locks), derive_filename(url), consumer)
    }

    /// Release `consumer`'s lock on the entry for `url`
    pub fn end_interest(&self, url: &str, consumer: &ConsumerId) {
        self.locks.release(&derive_filename(url), consumer);
    }

    /// Return a local path holding the content of `url`.
    ///
    /// Registers `consumer` as interested in the entry (the caller releases
    /// it with [`end_interest`](Self::end_interest)). A hit returns without
    /// network access. A miss fetches, writes, and for ephemeral entries runs
    /// a prune pass whose failures are logged, not returned.
    pub async fn resolve(
        &self,
        url: &str,
        permanent: bool,
        consumer: &ConsumerId,
    ) -> Result<PathBuf> {
        let filename = derive_filename(url);
        self.locks.acquire(&filename, consumer);

        if self.storage.exists(&filename).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if permanent && !self.storage.is_permanent(&filename).await {
                self.storage.mark_permanent(&filename).await?;
                debug!(filename = %filename, "Promoted cache entry to permanent");
            }
            debug!(filename = %filename, "Cache hit");
            return Ok(self.storage.path(&filename));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(filename = %filename, url, "Cache miss");

        let data = self.fetcher.fetch(url).await.map_err(|e| {
            warn!(url, error = %e, "Failed to fetch image");
            e
        })?;

        self.write_entry(&filename, &data, permanent).await
    }

    /// Cache `data` as the content of `url` without fetching
    pub async fn store(&self, url: &str, data: &[u8], permanent: bool) -> Result<PathBuf> {
        let filename = derive_filename(url);
        self.write_entry(&filename, data, permanent).await
    }

    /// Run an eviction pass now
    pub async fn prune(&self) -> Result<PruneReport> {
        self.prune_protecting(None).await
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> Result<CacheStats> {
        let entries = self.storage.stat_all().await?;

        let mut stats = CacheStats {
            entries: entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for entry in &entries {
            stats.total_bytes += entry.size_bytes;
            if entry.permanent {
                stats.permanent_entries += 1;
            } else {
                stats.ephemeral_bytes += entry.size_bytes;
            }
        }

        Ok(stats)
    }

    async fn write_entry(&self, filename: &str, data: &[u8], permanent: bool) -> Result<PathBuf> {
        // Marker first: a concurrent prune must never see a permanent entry as ephemeral
        if permanent {
            self.storage.mark_permanent(filename).await?;
        }

        if let Err(e) = self.storage.write(filename, data).await {
            if permanent && !self.storage.exists(filename).await {
                if let Err(cleanup) = self.storage.clear_permanent(filename).await {
                    warn!(filename, error = %cleanup, "Failed to remove permanence marker");
                }
            }
            return Err(e);
        }
        debug!(filename, size = data.len(), permanent, "Cached image");

        if !permanent {
            if let Err(e) = self.prune_protecting(Some(filename)).await {
                warn!(filename, error = %e, "Prune after write failed");
            }
        }

        Ok(self.storage.path(filename))
    }

    async fn prune_protecting(&self, protected: Option<&str>) -> Result<PruneReport> {
        let _gate = self.prune_gate.lock().await;

        let entries = self.storage.stat_all().await?;
        let plan = self.plan_for(&entries, protected, &HashSet::new());
        Ok(self.carry_out(entries, plan, protected).await)
    }

    fn plan_for(
        &self,
        entries: &[EntryStat],
        protected: Option<&str>,
        skipped: &HashSet<String>,
    ) -> EvictionPlan {
        eviction::plan(
            entries,
            |name| {
                protected.is_some_and(|p| p == name)
                    || skipped.contains(name)
                    || self.locks.is_locked(name)
            },
            self.budget_bytes,
        )
    }

    /// Execute `plan`, re-planning around victims skipped or failed along the
    /// way until the budget holds or no candidate is left
    async fn carry_out(
        &self,
        mut entries: Vec<EntryStat>,
        mut plan: EvictionPlan,
        protected: Option<&str>,
    ) -> PruneReport {
        let mut report = PruneReport {
            budget_bytes: self.budget_bytes,
            remaining_bytes: plan.total_bytes,
            ..PruneReport::default()
        };
        let mut skipped = HashSet::new();

        while !plan.is_empty() {
            let pass = self.execute_plan(&plan, &entries).await;

            entries.retain(|e| !pass.deleted.contains(&e.filename));
            report.freed_bytes += pass.freed_bytes;
            report.deleted.extend(pass.deleted);

            let retry = pass.over_budget && !pass.failed.is_empty();
            skipped.extend(pass.failed.iter().cloned());
            report.failed.extend(pass.failed);
            if !retry {
                break;
            }
            plan = self.plan_for(&entries, protected, &skipped);
        }

        report.remaining_bytes = report.remaining_bytes.saturating_sub(report.freed_bytes);
        report.over_budget = report.remaining_bytes > self.budget_bytes;

        if report.deleted.is_empty() && report.failed.is_empty() {
            if report.over_budget {
                warn!(
                    total_bytes = report.remaining_bytes,
                    budget_bytes = self.budget_bytes,
                    "Cache over budget with nothing evictable"
                );
            }
            return report;
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            freed_bytes = report.freed_bytes,
            remaining_bytes = report.remaining_bytes,
            "Pruned image cache"
        );
        if report.over_budget {
            warn!(
                remaining_bytes = report.remaining_bytes,
                budget_bytes = self.budget_bytes,
                "Cache still over budget after pruning"
            );
        }

        report
    }

    /// Delete every victim of `plan` that is still unlocked and ephemeral.
    /// Delete failures are logged and reported, never returned.
    async fn execute_plan(&self, plan: &EvictionPlan, entries: &[EntryStat]) -> PruneReport {
        let sizes: HashMap<&str, u64> = entries
            .iter()
            .map(|e| (e.filename.as_str(), e.size_bytes))
            .collect();

        let mut report = PruneReport {
            budget_bytes: plan.budget_bytes,
            ..PruneReport::default()
        };

        for victim in &plan.victims {
            // Locks may have been taken since the plan was made
            if self.locks.is_locked(victim) || self.storage.is_permanent(victim).await {
                debug!(filename = %victim, "Skipping eviction of entry claimed after planning");
                report.failed.push(victim.clone());
                continue;
            }

            match self.storage.delete(victim).await {
                Ok(()) => {
                    let size = sizes.get(victim.as_str()).copied().unwrap_or(0);
                    report.freed_bytes += size;
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(filename = %victim, size, "Evicted cache entry");
                    report.deleted.push(victim.clone());
                }
                Err(e) => {
                    warn!(filename = %victim, error = %e, "Failed to evict cache entry");
                    report.failed.push(victim.clone());
                }
            }
        }

        report.remaining_bytes = plan.total_bytes.saturating_sub(report.freed_bytes);
        report.over_budget = report.remaining_bytes > plan.budget_bytes;
        report
    }
}
