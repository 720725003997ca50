//! Sweep driver
//!
//! One pass over the slow-storage root that feeds every tracked file to the
//! tier manager. Per-file failures are counted and logged; they never stop
//! the pass.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::storage::walk_files;
use crate::tier::{CacheOutcome, TierManager};

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files and redirects visited under the slow root
    pub seen: u64,
    /// Visited entries with a tracked extension
    pub tracked: u64,
    pub migrated: u64,
    pub rehydrated: u64,
    pub ram_hits: u64,
    pub no_space: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Stopped early by shutdown
    pub cancelled: bool,
}

/// Walk the slow root and promote every tracked file
pub fn sweep(
    manager: &TierManager,
    config: &CacheConfig,
    shutdown: &CancellationToken,
) -> SweepReport {
    let roots = manager.roots();
    let mut report = SweepReport::default();

    info!(root = %roots.slow_root.display(), "Starting sweep");

    let completed = walk_files(manager.fs().as_ref(), &roots.slow_root, |entry| {
        if shutdown.is_cancelled() {
            return false;
        }
        // The cache root may itself live under the slow root
        if entry.path.starts_with(&roots.cache_root) {
            return true;
        }

        report.seen += 1;
        if !config.is_tracked(&entry.path) {
            return true;
        }
        report.tracked += 1;

        match manager.cache_file(&entry.path) {
            Ok(CacheOutcome::Migrated { .. }) => report.migrated += 1,
            Ok(CacheOutcome::Rehydrated { .. }) => report.rehydrated += 1,
            Ok(CacheOutcome::RamHit) => report.ram_hits += 1,
            Ok(CacheOutcome::NoSpace) => report.no_space += 1,
            Ok(CacheOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!("Error processing {}: {}", entry.path.display(), e);
                report.failed += 1;
            }
        }
        true
    });

    report.cancelled = !completed;
    info!(
        seen = report.seen,
        tracked = report.tracked,
        migrated = report.migrated,
        rehydrated = report.rehydrated,
        no_space = report.no_space,
        skipped = report.skipped,
        failed = report.failed,
        cancelled = report.cancelled,
        "Sweep finished"
    );
    report
}
