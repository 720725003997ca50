//! Budget Monitor
//!
//! Background task that keeps both tiers sized to the machine: every tick it
//! recomputes the disk budget (evicting when a new budget is adopted) and
//! resizes the RAM tier to current available memory. Failures are logged and
//! the loop carries on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::tier::TierManager;

/// Periodic budget and capacity maintenance
pub struct Monitor {
    manager: Arc<TierManager>,
    interval: Duration,
    ticks: AtomicU64,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl Monitor {
    pub fn new(manager: Arc<TierManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            ticks: AtomicU64::new(0),
            last_tick: Mutex::new(None),
        }
    }

    /// Completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// When the last tick finished
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.lock()
    }

    /// Run one maintenance pass (blocking I/O)
    pub fn tick(&self) {
        if let Err(e) = self.manager.adjust_budget() {
            error!("Error in monitor: {}", e);
        }
        self.manager.ram().update_capacity();

        let stats = self.manager.stats();
        debug!(
            ram_entries = stats.ram_entries,
            ram_bytes = stats.ram_bytes,
            ram_capacity = stats.ram_capacity,
            index_entries = stats.index_entries,
            budget = stats.active_budget,
            usage = stats.cache_usage,
            "Monitor tick"
        );

        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick.lock() = Some(Utc::now());
    }

    /// Tick every interval until `shutdown` is cancelled
    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting monitor with {:?} interval", self.interval);

        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Monitor shutting down");
                    break;
                }
                _ = tick.tick() => {
                    let monitor = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || monitor.tick()).await {
                        error!("Monitor tick panicked: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, GIB};
    use crate::storage::{FileSystem, MemoryFs};
    use crate::tier::{CacheIndex, FixedMemory, RamTier, TierRoots};
    use bytes::Bytes;
    use std::path::{Path, PathBuf};

    fn setup() -> (Arc<MemoryFs>, Arc<FixedMemory>, Arc<TierManager>) {
        let fs = Arc::new(MemoryFs::new());
        fs.create_dir_all(Path::new("/ssd/Cache")).unwrap();
        fs.set_disk_space(100 * GIB, 80 * GIB);

        let memory = Arc::new(FixedMemory::new(1000));
        let ram = Arc::new(RamTier::new(memory.clone(), 1.0));
        let config = CacheConfig {
            min_cache_bytes: 0,
            ..Default::default()
        };
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
        (fs, memory, Arc::new(manager))
    }

    #[test]
    fn test_tick_adjusts_budget_and_ram() {
        let (fs, memory, manager) = setup();
        manager.ram().add(Path::new("/hdd/a"), Bytes::from(vec![0u8; 800]));

        fs.set_disk_space(100 * GIB, 20 * GIB);
        memory.set(500);

        let monitor = Monitor::new(manager.clone(), Duration::from_secs(60));
        monitor.tick();

        assert_eq!(manager.active_budget(), 10 * GIB);
        assert!(manager.ram().is_empty());
        assert_eq!(monitor.ticks(), 1);
        assert!(monitor.last_tick().is_some());
    }

    #[test]
    fn test_tick_survives_disk_query_failure() {
        let (fs, _, manager) = setup();
        fs.fail_on(crate::storage::FsOp::DiskSpace, "/ssd/Cache");

        let monitor = Monitor::new(manager.clone(), Duration::from_secs(60));
        monitor.tick();

        assert_eq!(monitor.ticks(), 1);
        assert_eq!(manager.active_budget(), 40 * GIB);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (_, _, manager) = setup();
        let monitor = Arc::new(Monitor::new(manager, Duration::from_millis(10)));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(monitor.clone().run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(monitor.ticks() >= 1);
    }
}
