//! Cache Service
//!
//! Lifecycle of the daemon:
//!
//! ```text
//! Initializing ──► Running ──► Stopping ──► Stopped
//!      │
//!      └──► FailedInit (idles until shutdown)
//! ```
//!
//! `Initializing` classifies drives, creates the cache directory, loads the
//! index and sizes both tiers. `Running` starts the monitor, sweeps the slow
//! root once, runs one eviction pass and then idles until shutdown. A failed
//! initialization keeps the process alive so the failure stays observable.

mod sweep;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::hardware::{discover_pools, DriveClassifier};
use crate::monitor::Monitor;
use crate::storage::FileSystem;
use crate::tier::{CacheIndex, MemoryProbe, RamTier, TierManager, TierRoots};

pub use sweep::{sweep, SweepReport};

/// Lifecycle state of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initializing,
    Running,
    Stopping,
    Stopped,
    FailedInit,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Initializing => write!(f, "Initializing"),
            ServiceState::Running => write!(f, "Running"),
            ServiceState::Stopping => write!(f, "Stopping"),
            ServiceState::Stopped => write!(f, "Stopped"),
            ServiceState::FailedInit => write!(f, "FailedInit"),
        }
    }
}

/// What `run` does once the sweep is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Stay resident until shutdown
    #[default]
    Resident,
    /// Exit after the sweep and one eviction pass
    Once,
}

/// Current state and when it was entered
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub since: DateTime<Utc>,
    /// Why initialization failed, if it did
    pub init_error: Option<String>,
}

/// Owns the tier manager and drives the lifecycle
pub struct CacheService {
    config: Arc<CacheConfig>,
    manager: Option<Arc<TierManager>>,
    status: Mutex<ServiceStatus>,
    last_report: Mutex<Option<SweepReport>>,
}

impl CacheService {
    /// Run initialization; failure yields a service in `FailedInit`
    pub fn initialize(
        config: Arc<CacheConfig>,
        fs: Arc<dyn FileSystem>,
        classifier: &dyn DriveClassifier,
        memory: Arc<dyn MemoryProbe>,
    ) -> Self {
        let since = Utc::now();
        info!("Initializing cache service");

        let (manager, status) = match build_manager(&config, fs, classifier, memory) {
            Ok(manager) => (
                Some(Arc::new(manager)),
                ServiceStatus {
                    state: ServiceState::Initializing,
                    since,
                    init_error: None,
                },
            ),
            Err(e) => {
                if e.is_fatal_init() {
                    error!("Required drives not found: {}", e);
                } else {
                    error!("Initialization failed: {}", e);
                }
                (
                    None,
                    ServiceStatus {
                        state: ServiceState::FailedInit,
                        since: Utc::now(),
                        init_error: Some(e.to_string()),
                    },
                )
            }
        };

        Self {
            config,
            manager,
            status: Mutex::new(status),
            last_report: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.status.lock().state
    }

    pub fn status(&self) -> ServiceStatus {
        self.status.lock().clone()
    }

    /// The tier manager, absent after a failed initialization
    pub fn manager(&self) -> Option<&Arc<TierManager>> {
        self.manager.as_ref()
    }

    /// Result of the most recent sweep
    pub fn last_report(&self) -> Option<SweepReport> {
        self.last_report.lock().clone()
    }

    fn transition(&self, state: ServiceState) {
        let mut status = self.status.lock();
        info!("Service state: {} -> {}", status.state, state);
        status.state = state;
        status.since = Utc::now();
    }

    /// Drive the lifecycle until `shutdown` is cancelled (or the sweep is
    /// done, in `RunMode::Once`)
    pub async fn run(&self, shutdown: CancellationToken, mode: RunMode) {
        let Some(manager) = self.manager.clone() else {
            info!("Initialization failed, idling until shutdown");
            self.idle(&shutdown).await;
            return;
        };

        self.transition(ServiceState::Running);

        let monitor_token = shutdown.child_token();
        let monitor = Arc::new(Monitor::new(
            manager.clone(),
            self.config.monitor_interval(),
        ));
        let monitor_task = tokio::spawn(monitor.run(monitor_token.clone()));

        let config = self.config.clone();
        let token = shutdown.clone();
        let swept = tokio::task::spawn_blocking(move || {
            let report = sweep(&manager, &config, &token);
            if !report.cancelled {
                manager.clean_cache();
            }
            let stats = manager.stats();
            info!(
                index_entries = stats.index_entries,
                cache_usage = stats.cache_usage,
                budget = stats.active_budget,
                ram_entries = stats.ram_entries,
                ram_bytes = stats.ram_bytes,
                "Tier status after sweep"
            );
            report
        })
        .await;

        match swept {
            Ok(report) => *self.last_report.lock() = Some(report),
            Err(e) => error!("Sweep task failed: {}", e),
        }

        if mode == RunMode::Resident {
            self.idle(&shutdown).await;
        }

        self.transition(ServiceState::Stopping);
        monitor_token.cancel();
        if let Err(e) = monitor_task.await {
            error!("Monitor task failed: {}", e);
        }
        self.transition(ServiceState::Stopped);
    }

    /// Poll for shutdown every idle interval
    async fn idle(&self, shutdown: &CancellationToken) {
        let period = self.config.idle_poll_interval();
        let mut tick = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => debug!(state = %self.state(), "Idle"),
            }
        }
    }
}

/// Classify drives, prepare the cache directory and assemble the tiers
fn build_manager(
    config: &CacheConfig,
    fs: Arc<dyn FileSystem>,
    classifier: &dyn DriveClassifier,
    memory: Arc<dyn MemoryProbe>,
) -> Result<TierManager> {
    let pools = discover_pools(classifier)?;

    let cache_root = config
        .cache_root
        .clone()
        .unwrap_or_else(|| pools.primary_fast().mount_point.join(&config.cache_dir_name));
    let slow_root: PathBuf = config
        .slow_root
        .clone()
        .unwrap_or_else(|| pools.primary_slow().mount_point.clone());

    info!(
        cache_root = %cache_root.display(),
        slow_root = %slow_root.display(),
        "Selected tier roots"
    );

    fs.create_dir_all(&cache_root)?;
    let index = CacheIndex::load(fs.as_ref(), config.index_path.clone());
    let ram = Arc::new(RamTier::new(memory, config.ram_fraction));

    TierManager::new(
        config,
        fs,
        ram,
        TierRoots {
            slow_root,
            cache_root,
        },
        index,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{BlockDevice, DriveClass, StaticClassifier};
    use crate::storage::{FsOp, MemoryFs};
    use crate::tier::FixedMemory;
    use std::path::Path;
    use std::time::Duration;

    fn device(name: &str, mount: &str) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            mount_point: PathBuf::from(mount),
            total_bytes: 1 << 40,
            available_bytes: 1 << 40,
        }
    }

    fn classifier() -> StaticClassifier {
        StaticClassifier::new()
            .with_device(device("sda", "/hdd"), Some(DriveClass::Slow))
            .with_device(device("nvme0n1", "/ssd"), Some(DriveClass::Fast))
    }

    fn config() -> Arc<CacheConfig> {
        Arc::new(CacheConfig {
            index_path: PathBuf::from("/ssd/index.json"),
            ..Default::default()
        })
    }

    #[test]
    fn test_initialize_creates_cache_root() {
        let fs = Arc::new(MemoryFs::new());
        let service = CacheService::initialize(
            config(),
            fs.clone(),
            &classifier(),
            Arc::new(FixedMemory::new(1 << 20)),
        );

        assert_eq!(service.state(), ServiceState::Initializing);
        assert!(fs.exists("/ssd/Cache"));
        let manager = service.manager().unwrap();
        assert_eq!(manager.roots().cache_root, PathBuf::from("/ssd/Cache"));
        assert_eq!(manager.roots().slow_root, PathBuf::from("/hdd"));
    }

    #[test]
    fn test_initialize_without_fast_device_fails() {
        let classifier = StaticClassifier::new()
            .with_device(device("sda", "/hdd"), Some(DriveClass::Slow))
            .with_device(device("nvme0n1", "/ssd"), None);
        let service = CacheService::initialize(
            config(),
            Arc::new(MemoryFs::new()),
            &classifier,
            Arc::new(FixedMemory::new(1 << 20)),
        );

        assert_eq!(service.state(), ServiceState::FailedInit);
        assert!(service.manager().is_none());
        assert!(service.status().init_error.unwrap().contains("fast"));
    }

    #[test]
    fn test_initialize_io_failure_fails() {
        let fs = Arc::new(MemoryFs::new());
        fs.fail_on(FsOp::CreateDir, "/ssd/Cache");
        let service = CacheService::initialize(
            config(),
            fs,
            &classifier(),
            Arc::new(FixedMemory::new(1 << 20)),
        );
        assert_eq!(service.state(), ServiceState::FailedInit);
    }

    #[tokio::test]
    async fn test_run_once_sweeps_and_stops() {
        let fs = Arc::new(MemoryFs::new());
        fs.add_file("/hdd/game/app.exe", b"payload");
        let service = CacheService::initialize(
            config(),
            fs.clone(),
            &classifier(),
            Arc::new(FixedMemory::new(1 << 20)),
        );

        service.run(CancellationToken::new(), RunMode::Once).await;

        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.last_report().unwrap().migrated, 1);
        assert_eq!(
            fs.redirect_target("/hdd/game/app.exe"),
            Some(PathBuf::from("/ssd/Cache/game/app.exe"))
        );
        assert!(fs.exists(Path::new("/ssd/index.json")));
    }

    #[tokio::test]
    async fn test_resident_run_stops_on_shutdown() {
        let service = Arc::new(CacheService::initialize(
            config(),
            Arc::new(MemoryFs::new()),
            &classifier(),
            Arc::new(FixedMemory::new(1 << 20)),
        ));
        let shutdown = CancellationToken::new();

        let handle = {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { service.run(shutdown, RunMode::Resident).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.state(), ServiceState::Running);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }
}
