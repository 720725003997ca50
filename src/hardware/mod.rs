//! Hardware Discovery Module
//!
//! Sorts the machine's block devices into a fast (solid-state) pool and a
//! slow (rotational) pool. The cache lives on the first fast device and
//! promotes files from the first slow device.
//!
//! # Example
//!
//! ```no_run
//! use gcache::hardware::{discover_pools, SysinfoClassifier};
//!
//! # fn example() -> gcache::Result<()> {
//! let classifier = SysinfoClassifier::new();
//! let pools = discover_pools(&classifier)?;
//!
//! println!("cache device: {}", pools.primary_fast().mount_point.display());
//! println!("origin device: {}", pools.primary_slow().mount_point.display());
//! # Ok(())
//! # }
//! ```

pub mod discovery;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{Error, Result};

pub use discovery::{StaticClassifier, SysinfoClassifier};

// =============================================================================
// Drive Types
// =============================================================================

/// Speed class of a storage device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveClass {
    /// Solid-state (SSD/NVMe) - hosts the cache
    Fast,
    /// Rotational (HDD) - holds the origin files
    Slow,
}

impl std::fmt::Display for DriveClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveClass::Fast => write!(f, "fast"),
            DriveClass::Slow => write!(f, "slow"),
        }
    }
}

/// A mounted storage device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device identifier (e.g., /dev/sda1)
    pub name: String,
    /// Where the device is mounted
    pub mount_point: PathBuf,
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Free bytes at enumeration time
    pub available_bytes: u64,
}

impl BlockDevice {
    /// Get capacity in GiB
    pub fn capacity_gib(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

// =============================================================================
// Classifier Port
// =============================================================================

/// Enumerates devices and labels each one fast or slow
pub trait DriveClassifier: Send + Sync {
    /// List the mounted devices
    fn devices(&self) -> Result<Vec<BlockDevice>>;

    /// Classify one device; an error excludes it from both pools
    fn classify(&self, device: &BlockDevice) -> Result<DriveClass>;
}

// =============================================================================
// Drive Pools
// =============================================================================

/// Devices grouped by speed class, in enumeration order
#[derive(Debug, Clone)]
pub struct DrivePools {
    fast: Vec<BlockDevice>,
    slow: Vec<BlockDevice>,
}

impl DrivePools {
    /// Device hosting the cache directory
    pub fn primary_fast(&self) -> &BlockDevice {
        &self.fast[0]
    }

    /// Device whose files are promoted
    pub fn primary_slow(&self) -> &BlockDevice {
        &self.slow[0]
    }

    /// All fast devices
    pub fn fast(&self) -> &[BlockDevice] {
        &self.fast
    }

    /// All slow devices
    pub fn slow(&self) -> &[BlockDevice] {
        &self.slow
    }
}

/// Classify every device and require at least one of each class.
///
/// Devices that fail classification are logged and left out. Missing either
/// class is the one unrecoverable startup condition.
pub fn discover_pools(classifier: &dyn DriveClassifier) -> Result<DrivePools> {
    let mut fast = Vec::new();
    let mut slow = Vec::new();

    for device in classifier.devices()? {
        match classifier.classify(&device) {
            Ok(DriveClass::Fast) => fast.push(device),
            Ok(DriveClass::Slow) => slow.push(device),
            Err(e) => warn!(device = %device.name, "Excluding device: {}", e),
        }
    }

    if fast.is_empty() {
        return Err(Error::NoFastDevice);
    }
    if slow.is_empty() {
        return Err(Error::NoSlowDevice);
    }

    info!(
        "Drive pools: {} fast, {} slow (cache on {}, origin {})",
        fast.len(),
        slow.len(),
        fast[0].mount_point.display(),
        slow[0].mount_point.display()
    );

    Ok(DrivePools { fast, slow })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, mount: &str) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            mount_point: PathBuf::from(mount),
            total_bytes: 1024 * 1024 * 1024 * 1024,
            available_bytes: 512 * 1024 * 1024 * 1024,
        }
    }

    #[test]
    fn test_discover_pools_picks_first_of_each_class() {
        let classifier = StaticClassifier::new()
            .with_device(device("sda1", "/hdd"), Some(DriveClass::Slow))
            .with_device(device("nvme0n1p1", "/ssd"), Some(DriveClass::Fast))
            .with_device(device("sdb1", "/hdd2"), Some(DriveClass::Slow));

        let pools = discover_pools(&classifier).unwrap();
        assert_eq!(pools.primary_fast().name, "nvme0n1p1");
        assert_eq!(pools.primary_slow().name, "sda1");
        assert_eq!(pools.slow().len(), 2);
        assert_eq!(pools.fast().len(), 1);
    }

    #[test]
    fn test_unclassifiable_devices_are_excluded() {
        let classifier = StaticClassifier::new()
            .with_device(device("sda1", "/hdd"), Some(DriveClass::Slow))
            .with_device(device("loop0", "/snap"), None)
            .with_device(device("nvme0n1p1", "/ssd"), Some(DriveClass::Fast));

        let pools = discover_pools(&classifier).unwrap();
        assert_eq!(pools.fast().len() + pools.slow().len(), 2);
    }

    #[test]
    fn test_missing_fast_device_is_fatal() {
        let classifier =
            StaticClassifier::new().with_device(device("sda1", "/hdd"), Some(DriveClass::Slow));
        let err = discover_pools(&classifier).unwrap_err();
        assert!(matches!(err, Error::NoFastDevice));
        assert!(err.is_fatal_init());
    }

    #[test]
    fn test_missing_slow_device_is_fatal() {
        let classifier = StaticClassifier::new()
            .with_device(device("nvme0n1p1", "/ssd"), Some(DriveClass::Fast))
            .with_device(device("sdz", "/mystery"), None);
        assert!(matches!(
            discover_pools(&classifier),
            Err(Error::NoSlowDevice)
        ));
    }

    #[test]
    fn test_drive_class_display() {
        assert_eq!(DriveClass::Fast.to_string(), "fast");
        assert_eq!(DriveClass::Slow.to_string(), "slow");
        assert_eq!(device("a", "/").capacity_gib(), 1024.0);
    }
}
