//! gcache - Transparent Multi-Tier File Cache
//!
//! Promotes frequently used files (executables, libraries, disk images) from
//! rotational storage onto solid-state storage and into RAM, leaving a
//! redirect at the original path so consumers keep opening the same name.
//!
//! # Architecture
//!
//! ```text
//! Sweep ──► Tier Manager ──► { RAM Tier, Cache Index, filesystem }
//!                 ▲
//! Monitor ────────┘  (budget recompute, eviction, RAM resize)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Tunables, file loading and validation
//! - [`error`] - Error types
//! - [`hardware`] - Fast/slow drive classification
//! - [`monitor`] - Periodic budget and capacity maintenance
//! - [`service`] - Lifecycle state machine and sweep driver
//! - [`storage`] - Filesystem capability trait and backends
//! - [`tier`] - RAM tier, disk budget, cache index and tier manager

pub mod config;
pub mod error;
pub mod hardware;
pub mod monitor;
pub mod service;
pub mod storage;
pub mod tier;

// Re-export commonly used types
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use hardware::{DriveClass, DriveClassifier};
pub use monitor::Monitor;
pub use service::{CacheService, RunMode, ServiceState, SweepReport};
pub use storage::{FileSystem, LocalFs, MemoryFs};
pub use tier::{CacheIndex, CacheOutcome, RamTier, TierManager};
