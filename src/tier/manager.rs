//! Tier Manager - Migration and Eviction
//!
//! The only component that touches the RAM tier, the fast-disk tier and the
//! index together. Promotion copies a file to the cache root, replaces the
//! original with a redirect and records the pair; eviction reverses that,
//! oldest access first, until usage fits the budget.
//!
//! # Safety Guarantees
//!
//! 1. The original is deleted only after the copy completed
//! 2. A failed migration never leaves a dangling redirect or loses data
//! 3. Eviction always shrinks the index, so it terminates under I/O errors
//!
//! # Locking
//!
//! `TierState` (index + active budget) sits behind one mutex held for the
//! whole of a migration or eviction pass. The RAM tier has its own lock and
//! is always taken after the state lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::budget::{BudgetController, BudgetPolicy};
use super::index::CacheIndex;
use super::ram::RamTier;
use crate::config::{CacheConfig, GIB};
use crate::error::{Error, Result};
use crate::storage::{tree_size, EntryKind, FileSystem};

// =============================================================================
// Outcomes
// =============================================================================

/// What `cache_file` did with a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Already resident in RAM; no I/O performed
    RamHit,
    /// Previously migrated; bytes re-read from the fast tier
    Rehydrated { in_ram: bool },
    /// Copied to the fast tier and replaced by a redirect
    Migrated { bytes: u64, in_ram: bool },
    /// Not enough budget or free space even after eviction
    NoSpace,
    /// Origin is an unindexed redirect and was left alone
    Skipped,
}

/// Root directories of the two disk tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRoots {
    /// Where origin files live
    pub slow_root: PathBuf,
    /// Where cached copies live
    pub cache_root: PathBuf,
}

/// How far a migration got before failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MigrationStage {
    /// Nothing written yet
    Prepared,
    /// Copy to the cache root in progress
    Copying,
    /// Copy complete, original untouched
    Copied,
    /// Original deleted, no redirect yet
    OriginRemoved,
    /// Redirect in place, index not updated
    Redirected,
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct TierCounters {
    migrations: AtomicU64,
    migration_failures: AtomicU64,
    rehydrations: AtomicU64,
    evictions: AtomicU64,
    eviction_failures: AtomicU64,
}

/// Snapshot of both tiers
#[derive(Debug, Clone)]
pub struct TierStats {
    pub ram_entries: usize,
    pub ram_bytes: u64,
    pub ram_capacity: u64,
    pub index_entries: usize,
    pub active_budget: u64,
    pub cache_usage: u64,
    pub migrations: u64,
    pub migration_failures: u64,
    pub rehydrations: u64,
    pub evictions: u64,
    pub eviction_failures: u64,
}

impl TierStats {
    /// Fraction of the disk budget in use
    pub fn utilization(&self) -> f64 {
        if self.active_budget == 0 {
            0.0
        } else {
            self.cache_usage as f64 / self.active_budget as f64
        }
    }
}

// =============================================================================
// Tier Manager
// =============================================================================

#[derive(Debug)]
struct TierState {
    index: CacheIndex,
    budget: BudgetController,
}

/// Orchestrates promotion and eviction across the RAM and fast-disk tiers
pub struct TierManager {
    fs: Arc<dyn FileSystem>,
    ram: Arc<RamTier>,
    roots: TierRoots,
    state: Mutex<TierState>,
    counters: TierCounters,
}

impl TierManager {
    /// Create a manager, computing the initial budget from the cache volume
    pub fn new(
        config: &CacheConfig,
        fs: Arc<dyn FileSystem>,
        ram: Arc<RamTier>,
        roots: TierRoots,
        index: CacheIndex,
    ) -> Result<Self> {
        let space = fs.disk_space(&roots.cache_root)?;
        let budget = BudgetController::new(BudgetPolicy::from_config(config), space);

        info!(
            "Initialized with dynamic cache size: {:.2} GB",
            budget.active() as f64 / GIB as f64
        );

        Ok(Self {
            fs,
            ram,
            roots,
            state: Mutex::new(TierState { index, budget }),
            counters: TierCounters::default(),
        })
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn ram(&self) -> &Arc<RamTier> {
        &self.ram
    }

    pub fn roots(&self) -> &TierRoots {
        &self.roots
    }

    /// The budget eviction currently enforces
    pub fn active_budget(&self) -> u64 {
        self.state.lock().budget.active()
    }

    /// Number of migrated files
    pub fn index_len(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Cache path recorded for `origin`
    pub fn cached_path(&self, origin: &Path) -> Option<PathBuf> {
        self.state.lock().index.get(origin).map(Path::to_path_buf)
    }

    /// Bytes currently stored under the cache root
    pub fn cache_usage(&self) -> u64 {
        tree_size(self.fs.as_ref(), &self.roots.cache_root)
    }

    /// Cache path mirroring `origin`'s location under the slow root
    pub fn cache_destination(&self, origin: &Path) -> Result<PathBuf> {
        let relative = origin
            .strip_prefix(&self.roots.slow_root)
            .map_err(|_| Error::OutsideSlowRoot {
                path: origin.to_path_buf(),
            })?;
        Ok(self.roots.cache_root.join(relative))
    }

    /// Whether a file of `size` bytes fits on the fast tier right now
    pub fn has_space(&self, size: u64) -> Result<bool> {
        let state = self.state.lock();
        self.has_space_locked(&state, size)
    }

    fn has_space_locked(&self, state: &TierState, size: u64) -> Result<bool> {
        let space = self.fs.disk_space(&self.roots.cache_root)?;
        Ok(state.budget.has_space(size, space, self.cache_usage()))
    }

    // =========================================================================
    // Budget
    // =========================================================================

    /// Recompute the disk budget; a re-adopted budget triggers eviction.
    ///
    /// Returns `true` when the active budget changed.
    pub fn adjust_budget(&self) -> Result<bool> {
        let mut state = self.state.lock();
        self.adjust_budget_locked(&mut state)
    }

    fn adjust_budget_locked(&self, state: &mut TierState) -> Result<bool> {
        let space = self.fs.disk_space(&self.roots.cache_root)?;
        let previous = state.budget.active();
        match state.budget.recompute(space) {
            Some(adopted) => {
                info!(
                    "Disk cache budget adjusted: {:.2} GB -> {:.2} GB",
                    previous as f64 / GIB as f64,
                    adopted as f64 / GIB as f64
                );
                self.clean_cache_locked(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // =========================================================================
    // Promotion
    // =========================================================================

    /// Promote a file to the fastest tier that will take it.
    ///
    /// Idempotent: a RAM hit does nothing, an indexed file is only re-read
    /// from the fast tier, and only an unindexed plain file is migrated.
    #[instrument(skip(self, origin), fields(path = %origin.display()))]
    pub fn cache_file(&self, origin: &Path) -> Result<CacheOutcome> {
        if self.ram.get(origin).is_some() {
            info!("File served from RAM cache: {}", origin.display());
            return Ok(CacheOutcome::RamHit);
        }

        let mut state = self.state.lock();

        if let Some(cache_path) = state.index.get(origin).map(Path::to_path_buf) {
            let data = self.fs.read(&cache_path)?;
            let in_ram = self.ram.add(origin, data);
            if in_ram {
                info!("Loaded to RAM cache: {}", origin.display());
            }
            self.counters.rehydrations.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheOutcome::Rehydrated { in_ram });
        }

        match self.fs.kind(origin)? {
            Some(EntryKind::File) => {}
            Some(EntryKind::Redirect) => {
                warn!("Skipping unindexed redirect: {}", origin.display());
                return Ok(CacheOutcome::Skipped);
            }
            Some(EntryKind::Dir) | None => return Err(Error::NotFound(origin.to_path_buf())),
        }

        let dest = self.cache_destination(origin)?;
        if let Some(owner) = state.index.owner_of(&dest) {
            return Err(Error::IndexConflict {
                origin: owner.to_path_buf(),
                cache: dest,
            });
        }

        let size = self.fs.file_len(origin)?;
        if let Err(e) = self.adjust_budget_locked(&mut state) {
            warn!("Could not recompute disk budget: {}", e);
        }

        if !self.has_space_locked(&state, size)? {
            debug!(size, "Insufficient cache space, evicting");
            self.clean_cache_locked(&mut state);
            if !self.has_space_locked(&state, size)? {
                info!("Not enough cache space for {} ({} bytes)", origin.display(), size);
                return Ok(CacheOutcome::NoSpace);
            }
        }

        let mut stage = MigrationStage::Prepared;
        match self.migrate(&mut state.index, origin, &dest, &mut stage) {
            Ok(in_ram) => {
                if let Err(e) = state.index.save(self.fs.as_ref()) {
                    error!("Failed to save cache index: {}", e);
                }
                self.counters.migrations.fetch_add(1, Ordering::Relaxed);
                info!("Cached to SSD: {}", origin.display());
                Ok(CacheOutcome::Migrated { bytes: size, in_ram })
            }
            Err(e) => {
                error!("Failed to cache {}: {}", origin.display(), e);
                self.rollback(origin, &dest, stage);
                self.counters
                    .migration_failures
                    .fetch_add(1, Ordering::Relaxed);
                Err(Error::MigrationFailed {
                    path: origin.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn migrate(
        &self,
        index: &mut CacheIndex,
        origin: &Path,
        dest: &Path,
        stage: &mut MigrationStage,
    ) -> Result<bool> {
        let data = self.fs.read(origin)?;
        let in_ram = self.ram.add(origin, data);
        if in_ram {
            info!("Cached to RAM: {}", origin.display());
        }

        if let Some(parent) = dest.parent() {
            self.fs.create_dir_all(parent)?;
        }

        *stage = MigrationStage::Copying;
        self.fs.copy_preserving(origin, dest)?;
        *stage = MigrationStage::Copied;
        self.fs.remove_file(origin)?;
        *stage = MigrationStage::OriginRemoved;
        self.fs.create_redirect(origin, dest)?;
        *stage = MigrationStage::Redirected;
        index.insert(origin.to_path_buf(), dest.to_path_buf())?;

        Ok(in_ram)
    }

    /// Undo a partial migration so the origin holds real content again
    fn rollback(&self, origin: &Path, dest: &Path, stage: MigrationStage) {
        self.ram.remove(origin);

        let result = match stage {
            MigrationStage::Prepared => Ok(()),
            // Original intact: discard the (possibly partial) copy
            MigrationStage::Copying | MigrationStage::Copied => match self.fs.kind(dest) {
                Ok(Some(EntryKind::File)) => self.fs.remove_file(dest),
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
            // Original gone: the copy is the only data left
            MigrationStage::OriginRemoved | MigrationStage::Redirected => {
                let unlinked = match self.fs.kind(origin) {
                    Ok(Some(EntryKind::Redirect)) => self.fs.remove_redirect(origin),
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                };
                unlinked.and_then(|()| self.fs.move_file(dest, origin))
            }
        };

        match result {
            Ok(()) => debug!(?stage, "Rolled back migration of {}", origin.display()),
            Err(e) => error!(
                ?stage,
                "Rollback of {} failed, content remains at {}: {}",
                origin.display(),
                dest.display(),
                e
            ),
        }
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Trim RAM, then move files back to slow storage oldest-access first
    /// until usage fits the budget. Returns the number of files evicted.
    pub fn clean_cache(&self) -> usize {
        let mut state = self.state.lock();
        self.clean_cache_locked(&mut state)
    }

    fn clean_cache_locked(&self, state: &mut TierState) -> usize {
        self.ram.trim();

        let budget = state.budget.active();
        let mut usage = self.cache_usage();
        let mut evicted = 0;

        while usage > budget && !state.index.is_empty() {
            let Some((origin, cache)) = self.oldest_entry(&state.index) else {
                break;
            };
            let size = self.fs.file_len(&cache).unwrap_or(0);

            match self.evict_entry(&origin, &cache) {
                Ok(()) => {
                    usage = usage.saturating_sub(size);
                    evicted += 1;
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    info!("Evicted from SSD cache: {}", origin.display());
                }
                Err(e) => {
                    self.counters
                        .eviction_failures
                        .fetch_add(1, Ordering::Relaxed);
                    error!("Error cleaning cache: {}", e);
                }
            }

            // Dropped even on failure so the loop always makes progress
            state.index.remove(&origin);
            if let Err(e) = state.index.save(self.fs.as_ref()) {
                error!("Failed to save cache index: {}", e);
            }
        }

        if evicted > 0 {
            info!(evicted, usage, budget, "Cache cleanup finished");
        }
        evicted
    }

    /// Entry whose cache file was accessed longest ago; unreadable times sort first
    fn oldest_entry(&self, index: &CacheIndex) -> Option<(PathBuf, PathBuf)> {
        index
            .iter()
            .map(|(origin, cache)| {
                let accessed = self.fs.accessed(cache).unwrap_or(SystemTime::UNIX_EPOCH);
                (accessed, origin, cache)
            })
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, origin, cache)| (origin.to_path_buf(), cache.to_path_buf()))
    }

    fn evict_entry(&self, origin: &Path, cache: &Path) -> Result<()> {
        let fail = |reason: String| Error::EvictionFailed {
            path: origin.to_path_buf(),
            reason,
        };

        match self.fs.kind(origin).map_err(|e| fail(e.to_string()))? {
            Some(EntryKind::Redirect) => self
                .fs
                .remove_redirect(origin)
                .map_err(|e| fail(e.to_string()))?,
            None => {}
            Some(kind) => return Err(fail(format!("origin is a {:?}, not a redirect", kind))),
        }

        self.fs
            .move_file(cache, origin)
            .map_err(|e| fail(e.to_string()))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Snapshot of both tiers (scans the cache root)
    pub fn stats(&self) -> TierStats {
        let (index_entries, active_budget) = {
            let state = self.state.lock();
            (state.index.len(), state.budget.active())
        };
        let ram = self.ram.stats();

        TierStats {
            ram_entries: ram.entries,
            ram_bytes: ram.size,
            ram_capacity: ram.capacity,
            index_entries,
            active_budget,
            cache_usage: self.cache_usage(),
            migrations: self.counters.migrations.load(Ordering::Relaxed),
            migration_failures: self.counters.migration_failures.load(Ordering::Relaxed),
            rehydrations: self.counters.rehydrations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            eviction_failures: self.counters.eviction_failures.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsOp, MemoryFs};
    use crate::tier::ram::FixedMemory;
    use assert_matches::assert_matches;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    struct Fixture {
        fs: Arc<MemoryFs>,
        manager: TierManager,
    }

    /// Manager over /hdd -> /ssd/Cache with a fixed `budget` and ample RAM
    fn fixture(budget: u64) -> Fixture {
        let fs = Arc::new(MemoryFs::new());
        fs.create_dir_all(Path::new("/ssd/Cache")).unwrap();
        fs.create_dir_all(Path::new("/state")).unwrap();

        let config = CacheConfig {
            min_cache_bytes: budget,
            max_cache_bytes: budget,
            ..Default::default()
        };
        let ram = Arc::new(RamTier::new(Arc::new(FixedMemory::new(64 * MB)), 1.0));
        let manager = TierManager::new(
            &config,
            fs.clone(),
            ram,
            TierRoots {
                slow_root: PathBuf::from("/hdd"),
                cache_root: PathBuf::from("/ssd/Cache"),
            },
            CacheIndex::new("/state/index.json"),
        )
        .unwrap();

        Fixture { fs, manager }
    }

    /// Pin the active budget without running a cleanup
    fn set_budget(f: &Fixture, bytes: u64) {
        let policy = BudgetPolicy {
            min: bytes,
            max: bytes,
            ..Default::default()
        };
        let space = f.fs.disk_space(Path::new("/ssd/Cache")).unwrap();
        f.manager.state.lock().budget = BudgetController::new(policy, space);
    }

    #[test]
    fn test_migrate_places_redirect_and_index_entry() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/games/app.exe", b"binary");

        let outcome = f.manager.cache_file(Path::new("/hdd/games/app.exe")).unwrap();
        assert_eq!(outcome, CacheOutcome::Migrated { bytes: 6, in_ram: true });

        assert_eq!(
            f.fs.redirect_target("/hdd/games/app.exe"),
            Some(PathBuf::from("/ssd/Cache/games/app.exe"))
        );
        assert_eq!(f.fs.content("/ssd/Cache/games/app.exe").unwrap().as_ref(), b"binary");
        assert_eq!(
            f.manager.cached_path(Path::new("/hdd/games/app.exe")),
            Some(PathBuf::from("/ssd/Cache/games/app.exe"))
        );
        assert!(f.fs.exists("/state/index.json"));
        assert_eq!(f.manager.cache_usage(), 6);
    }

    #[test]
    fn test_cache_file_is_idempotent() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/a.dll", b"dll");

        f.manager.cache_file(Path::new("/hdd/a.dll")).unwrap();
        let second = f.manager.cache_file(Path::new("/hdd/a.dll")).unwrap();

        assert_eq!(second, CacheOutcome::RamHit);
        assert_eq!(f.manager.index_len(), 1);
        assert_eq!(f.fs.op_count(FsOp::Copy), 1);
    }

    #[test]
    fn test_rehydrate_from_index_without_copy() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/a.dll", b"dll");
        f.manager.cache_file(Path::new("/hdd/a.dll")).unwrap();

        f.manager.ram().remove(Path::new("/hdd/a.dll"));
        let outcome = f.manager.cache_file(Path::new("/hdd/a.dll")).unwrap();

        assert_eq!(outcome, CacheOutcome::Rehydrated { in_ram: true });
        assert_eq!(f.fs.op_count(FsOp::Copy), 1);
        assert!(f.manager.ram().contains(Path::new("/hdd/a.dll")));
    }

    #[test]
    fn test_outside_slow_root_rejected() {
        let f = fixture(GIB);
        f.fs.add_file("/elsewhere/a.exe", b"x");
        assert_matches!(
            f.manager.cache_file(Path::new("/elsewhere/a.exe")),
            Err(Error::OutsideSlowRoot { .. })
        );
    }

    #[test]
    fn test_unindexed_redirect_skipped() {
        let f = fixture(GIB);
        f.fs.add_file("/ssd/other.exe", b"x");
        f.fs.create_dir_all(Path::new("/hdd")).unwrap();
        f.fs
            .create_redirect(Path::new("/hdd/link.exe"), Path::new("/ssd/other.exe"))
            .unwrap();

        assert_eq!(
            f.manager.cache_file(Path::new("/hdd/link.exe")).unwrap(),
            CacheOutcome::Skipped
        );
        assert_eq!(f.fs.op_count(FsOp::Copy), 0);
    }

    #[test]
    fn test_copy_failure_keeps_original_and_removes_partial() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/big.iso", &[9u8; 64]);
        f.fs.fail_on(FsOp::Copy, "/ssd/Cache/big.iso");

        assert_matches!(
            f.manager.cache_file(Path::new("/hdd/big.iso")),
            Err(Error::MigrationFailed { .. })
        );

        assert_eq!(f.fs.content("/hdd/big.iso").unwrap().len(), 64);
        assert!(!f.fs.exists("/ssd/Cache/big.iso"));
        assert_eq!(f.manager.index_len(), 0);
        assert!(!f.manager.ram().contains(Path::new("/hdd/big.iso")));
    }

    #[test]
    fn test_redirect_failure_moves_copy_back() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/a.sys", b"driver");
        f.fs.fail_on(FsOp::CreateRedirect, "/hdd/a.sys");

        assert!(f.manager.cache_file(Path::new("/hdd/a.sys")).is_err());

        assert_eq!(f.fs.content("/hdd/a.sys").unwrap().as_ref(), b"driver");
        assert!(f.fs.redirect_target("/hdd/a.sys").is_none());
        assert!(!f.fs.exists("/ssd/Cache/a.sys"));
        assert_eq!(f.manager.stats().migration_failures, 1);
    }

    #[test]
    fn test_no_space_after_eviction_leaves_file() {
        let f = fixture(100);
        f.fs.add_file("/hdd/huge.iso", &[0u8; 200]);

        assert_eq!(
            f.manager.cache_file(Path::new("/hdd/huge.iso")).unwrap(),
            CacheOutcome::NoSpace
        );
        assert_eq!(f.fs.content("/hdd/huge.iso").unwrap().len(), 200);
        assert_eq!(f.fs.op_count(FsOp::Copy), 0);
    }

    #[test]
    fn test_full_budget_evicts_before_migrating() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/old.exe", &[1u8; 60]);
        f.fs.add_file("/hdd/mid.exe", &[2u8; 60]);
        f.fs.add_file("/hdd/new.exe", &[3u8; 30]);
        f.manager.cache_file(Path::new("/hdd/old.exe")).unwrap();
        f.manager.cache_file(Path::new("/hdd/mid.exe")).unwrap();
        f.fs.set_accessed("/ssd/Cache/old.exe", SystemTime::UNIX_EPOCH + Duration::from_secs(5));
        f.fs.set_accessed("/ssd/Cache/mid.exe", SystemTime::UNIX_EPOCH + Duration::from_secs(9));

        // 120 bytes cached against a 100 byte budget
        set_budget(&f, 100);
        assert_matches!(
            f.manager.cache_file(Path::new("/hdd/new.exe")).unwrap(),
            CacheOutcome::Migrated { bytes: 30, .. }
        );

        assert!(f.fs.redirect_target("/hdd/old.exe").is_none());
        assert_eq!(f.fs.content("/hdd/old.exe").unwrap().len(), 60);
        assert!(f.fs.redirect_target("/hdd/mid.exe").is_some());
        assert!(f.fs.redirect_target("/hdd/new.exe").is_some());
        assert_eq!(f.manager.index_len(), 2);
        assert_eq!(f.manager.cache_usage(), 90);
    }

    #[test]
    fn test_evict_round_trip_restores_content() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/tools/a.exe", b"original bytes");
        f.manager.cache_file(Path::new("/hdd/tools/a.exe")).unwrap();

        // Shrink the budget below usage, then clean
        set_budget(&f, 0);
        assert_eq!(f.manager.clean_cache(), 1);

        assert_eq!(f.fs.content("/hdd/tools/a.exe").unwrap().as_ref(), b"original bytes");
        assert!(!f.fs.exists("/ssd/Cache/tools/a.exe"));
        assert_eq!(f.manager.index_len(), 0);
    }

    #[test]
    fn test_eviction_order_is_oldest_access_first() {
        let f = fixture(GIB);
        for name in ["a", "b", "c"] {
            f.fs.add_file(format!("/hdd/{}.exe", name), &[0u8; 10]);
            f.manager.cache_file(Path::new(&format!("/hdd/{}.exe", name))).unwrap();
        }
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000_000);
        f.fs.set_accessed("/ssd/Cache/a.exe", base + Duration::from_secs(3));
        f.fs.set_accessed("/ssd/Cache/b.exe", base + Duration::from_secs(1));
        f.fs.set_accessed("/ssd/Cache/c.exe", base + Duration::from_secs(2));

        set_budget(&f, 15);
        assert_eq!(f.manager.clean_cache(), 2);

        assert!(f.fs.redirect_target("/hdd/a.exe").is_some());
        assert!(f.fs.redirect_target("/hdd/b.exe").is_none());
        assert!(f.fs.redirect_target("/hdd/c.exe").is_none());
    }

    #[test]
    fn test_failed_move_back_still_drops_entry() {
        let f = fixture(GIB);
        f.fs.add_file("/hdd/a.exe", &[0u8; 10]);
        f.manager.cache_file(Path::new("/hdd/a.exe")).unwrap();
        f.fs.fail_on(FsOp::Move, "/ssd/Cache/a.exe");

        set_budget(&f, 0);

        assert_eq!(f.manager.clean_cache(), 0);
        assert_eq!(f.manager.index_len(), 0);
        assert_eq!(f.manager.stats().eviction_failures, 1);
    }

    #[test]
    fn test_adjust_budget_readopts_and_evicts() {
        let fs = Arc::new(MemoryFs::new());
        fs.create_dir_all(Path::new("/ssd/Cache")).unwrap();
        fs.set_disk_space(100 * GIB, 80 * GIB);

        let config = CacheConfig {
            min_cache_bytes: 0,
            ..Default::default()
        };
        let ram = Arc::new(RamTier::new(Arc::new(FixedMemory::new(MB)), 1.0));
        let manager = TierManager::new(
            &config,
            fs.clone(),
            ram,
            TierRoots {
                slow_root: PathBuf::from("/hdd"),
                cache_root: PathBuf::from("/ssd/Cache"),
            },
            CacheIndex::new("/index.json"),
        )
        .unwrap();
        assert_eq!(manager.active_budget(), 40 * GIB);

        // Small drift is ignored
        fs.set_disk_space(100 * GIB, 81 * GIB);
        assert!(!manager.adjust_budget().unwrap());
        assert_eq!(manager.active_budget(), 40 * GIB);

        // Pressure: 5 GiB free -> 4 GiB budget
        fs.set_disk_space(100 * GIB, 5 * GIB);
        assert!(manager.adjust_budget().unwrap());
        assert_eq!(manager.active_budget(), 4 * GIB);
    }
}
