//! Fast-disk budget computation
//!
//! The budget tracks free space on the cache volume: a configured share of
//! free space, a harsher share when the volume is nearly full, clamped to
//! `[min, max]`. A new figure replaces the active one only when it moves by
//! more than the change threshold.

use crate::config::CacheConfig;
use crate::storage::DiskSpace;

/// Tunables for budget computation
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPolicy {
    /// Share of free space granted normally
    pub percent: f64,
    /// Lower clamp in bytes
    pub min: u64,
    /// Upper clamp in bytes
    pub max: u64,
    /// Free-space ratio below which the fallback share applies
    pub low_space_ratio: f64,
    /// Share of free space granted under pressure
    pub fallback_percent: f64,
    /// Share of total capacity that must stay free after a copy
    pub min_free_ratio: f64,
    /// Minimum change before a recomputed budget is adopted
    pub change_threshold: u64,
}

impl BudgetPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            percent: config.cache_percent,
            min: config.min_cache_bytes,
            max: config.max_cache_bytes,
            low_space_ratio: config.low_space_ratio,
            fallback_percent: config.low_space_fallback_percent,
            min_free_ratio: config.min_free_ratio,
            change_threshold: config.budget_change_threshold,
        }
    }
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Compute the fast-disk budget for the given volume state
pub fn compute_disk_budget(free_bytes: u64, total_bytes: u64, policy: &BudgetPolicy) -> u64 {
    let free = free_bytes as f64;
    let proposed = if free < total_bytes as f64 * policy.low_space_ratio {
        free * policy.fallback_percent
    } else {
        free * policy.percent
    } as u64;

    proposed.min(policy.max).max(policy.min)
}

/// Holds the active budget; callers guard it with the tier state lock
#[derive(Debug, Clone)]
pub struct BudgetController {
    policy: BudgetPolicy,
    active: u64,
}

impl BudgetController {
    /// Start with a budget computed from the current volume state
    pub fn new(policy: BudgetPolicy, space: DiskSpace) -> Self {
        let active = compute_disk_budget(space.free, space.total, &policy);
        Self { policy, active }
    }

    /// The budget eviction currently enforces
    pub fn active(&self) -> u64 {
        self.active
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Recompute from `space`; returns the new budget if it was adopted
    pub fn recompute(&mut self, space: DiskSpace) -> Option<u64> {
        let proposed = compute_disk_budget(space.free, space.total, &self.policy);
        if proposed.abs_diff(self.active) > self.policy.change_threshold {
            self.active = proposed;
            Some(proposed)
        } else {
            None
        }
    }

    /// Whether a file of `size` bytes can be added.
    ///
    /// Both must hold: the volume keeps at least `min_free_ratio` of its
    /// capacity free, and cache usage stays within the active budget.
    pub fn has_space(&self, size: u64, space: DiskSpace, usage: u64) -> bool {
        let reserve = space.total as f64 * self.policy.min_free_ratio;
        let leaves_reserve = space
            .free
            .checked_sub(size)
            .is_some_and(|left| left as f64 >= reserve);

        leaves_reserve && usage.saturating_add(size) <= self.active
    }
}
