//! Oldest-first eviction planning
//!
//! Planning is pure: it decides which ephemeral entries to delete to bring
//! their combined size back under a byte budget, and never touches storage.

use crate::types::EntryStat;

/// Filenames to delete, with the byte accounting that produced them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub victims: Vec<String>,
    /// Ephemeral bytes before any deletion
    pub total_bytes: u64,
    /// Ephemeral bytes once every victim is gone
    pub remaining_bytes: u64,
    pub budget_bytes: u64,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }

    /// True when deleting every victim still leaves the budget exceeded
    pub fn over_budget(&self) -> bool {
        self.remaining_bytes > self.budget_bytes
    }
}

/// Select entries to delete so ephemeral bytes fall to `budget_bytes` or less.
///
/// Permanent entries neither count toward the total nor become victims.
/// Candidates are the remaining entries for which `is_locked` is false,
/// taken in ascending `last_access` order with ties broken by filename.
/// When candidates run out first, the plan deletes all of them and reports
/// `over_budget()`.
pub fn plan<F>(entries: &[EntryStat], is_locked: F, budget_bytes: u64) -> EvictionPlan
where
    F: Fn(&str) -> bool,
{
    let ephemeral: Vec<&EntryStat> = entries.iter().filter(|e| !e.permanent).collect();
    let total_bytes: u64 = ephemeral.iter().map(|e| e.size_bytes).sum();

    let mut plan = EvictionPlan {
        victims: Vec::new(),
        total_bytes,
        remaining_bytes: total_bytes,
        budget_bytes,
    };

    if total_bytes <= budget_bytes {
        return plan;
    }

    let mut candidates: Vec<&EntryStat> = ephemeral
        .into_iter()
        .filter(|e| !is_locked(&e.filename))
        .collect();
    candidates.sort_by(|a, b| {
        a.last_access
            .cmp(&b.last_access)
            .then_with(|| a.filename.cmp(&b.filename))
    });

    for entry in candidates {
        if plan.remaining_bytes <= budget_bytes {
            break;
        }
        plan.remaining_bytes = plan.remaining_bytes.saturating_sub(entry.size_bytes);
        plan.victims.push(entry.filename.clone());
    }

    plan
}
