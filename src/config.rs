//! Configuration for the tiered file cache.
//!
//! # Example
//!
//! ```
//! use gcache::CacheConfig;
//!
//! let config = CacheConfig::default();
//! assert_eq!(config.cache_percent, 0.5);
//! assert!(config.is_tracked(std::path::Path::new("setup.EXE")));
//!
//! let config = CacheConfig {
//!     min_cache_bytes: 1024 * 1024 * 1024,
//!     monitor_interval_secs: 5,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// One gibibyte
pub const GIB: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the tiered file cache.
///
/// Constructed once at startup and shared read-only by every component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// File extensions promoted to the fast tiers (matched case-insensitively)
    pub tracked_extensions: Vec<String>,

    /// Fraction of fast-disk free space granted to the cache
    pub cache_percent: f64,

    /// Lower clamp for the fast-disk budget in bytes
    pub min_cache_bytes: u64,

    /// Upper clamp for the fast-disk budget in bytes
    pub max_cache_bytes: u64,

    /// Free space below this fraction of total triggers the pressure fallback
    pub low_space_ratio: f64,

    /// Fraction of free space used while under pressure
    pub low_space_fallback_percent: f64,

    /// Fraction of total fast-disk capacity that must stay free
    pub min_free_ratio: f64,

    /// Fraction of available memory granted to the RAM tier
    pub ram_fraction: f64,

    /// Seconds between monitor ticks
    pub monitor_interval_secs: u64,

    /// Seconds between idle-loop polls
    pub idle_poll_interval_secs: u64,

    /// Budget change (bytes) required before a new budget is adopted
    pub budget_change_threshold: u64,

    /// Directory created on the fast device to hold cached files
    pub cache_dir_name: String,

    /// Location of the persisted origin -> cache index
    pub index_path: PathBuf,

    /// Explicit cache root, bypassing `<fast mount>/<cache_dir_name>`
    pub cache_root: Option<PathBuf>,

    /// Explicit slow-storage root, bypassing the slow device mount point
    pub slow_root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tracked_extensions: vec![
                ".exe".to_string(),
                ".dll".to_string(),
                ".sys".to_string(),
                ".iso".to_string(),
            ],
            cache_percent: 0.5,
            min_cache_bytes: 10 * GIB,
            max_cache_bytes: 500 * GIB,
            low_space_ratio: 0.10,
            low_space_fallback_percent: 0.8,
            min_free_ratio: 0.05,
            ram_fraction: 0.9,
            monitor_interval_secs: 60,
            idle_poll_interval_secs: 10,
            budget_change_threshold: GIB,
            cache_dir_name: "Cache".to_string(),
            index_path: PathBuf::from("cache_config.json"),
            cache_root: None,
            slow_root: None,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension)
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => serde_json::from_str(&raw)?,
            _ => serde_yaml::from_str(&raw)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the budget and RAM computations cannot work with
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("cache_percent", self.cache_percent),
            ("low_space_ratio", self.low_space_ratio),
            ("low_space_fallback_percent", self.low_space_fallback_percent),
            ("min_free_ratio", self.min_free_ratio),
            ("ram_fraction", self.ram_fraction),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.min_cache_bytes > self.max_cache_bytes {
            return Err(Error::Config(format!(
                "min_cache_bytes ({}) exceeds max_cache_bytes ({})",
                self.min_cache_bytes, self.max_cache_bytes
            )));
        }

        if self.monitor_interval_secs == 0 || self.idle_poll_interval_secs == 0 {
            return Err(Error::Config("poll intervals must be non-zero".to_string()));
        }

        if self.tracked_extensions.is_empty() {
            return Err(Error::Config("tracked_extensions is empty".to_string()));
        }

        Ok(())
    }

    /// Monitor tick interval
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Idle-loop poll interval
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval_secs)
    }

    /// Whether a file's extension is in the tracked set
    pub fn is_tracked(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.tracked_extensions
            .iter()
            .any(|t| t.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.min_cache_bytes, 10 * GIB);
        assert_eq!(config.max_cache_bytes, 500 * GIB);
        assert_eq!(config.monitor_interval(), Duration::from_secs(60));
        assert_eq!(config.idle_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.budget_change_threshold, GIB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracked_extensions_case_insensitive() {
        let config = CacheConfig::default();
        assert!(config.is_tracked(Path::new("/hdd/Games/launcher.exe")));
        assert!(config.is_tracked(Path::new("/hdd/drivers/NET.SYS")));
        assert!(config.is_tracked(Path::new("disk.Iso")));
        assert!(!config.is_tracked(Path::new("/hdd/readme.txt")));
        assert!(!config.is_tracked(Path::new("/hdd/Makefile")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CacheConfig {
            cache_percent: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            min_cache_bytes: 2 * GIB,
            max_cache_bytes: GIB,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            monitor_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CacheConfig = serde_yaml::from_str(
            "cache_percent: 0.25\ntracked_extensions: [\".bin\"]\n",
        )
        .unwrap();
        assert_eq!(config.cache_percent, 0.25);
        assert_eq!(config.min_cache_bytes, 10 * GIB);
        assert!(config.is_tracked(Path::new("firmware.bin")));
        assert!(!config.is_tracked(Path::new("app.exe")));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcache.json");
        std::fs::write(&path, r#"{"min_cache_bytes": 1024, "max_cache_bytes": 4096}"#).unwrap();

        let config = CacheConfig::load(&path).unwrap();
        assert_eq!(config.min_cache_bytes, 1024);
        assert_eq!(config.max_cache_bytes, 4096);
    }
}
