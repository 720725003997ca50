//! Device classifiers
//!
//! [`SysinfoClassifier`] reads the OS disk inventory (on Linux this is backed
//! by the sysfs `queue/rotational` flag). [`StaticClassifier`] returns a fixed
//! inventory for tests.

use std::path::PathBuf;

use parking_lot::Mutex;
use sysinfo::{DiskKind, Disks};
use tracing::debug;

use super::{BlockDevice, DriveClass, DriveClassifier};
use crate::error::{Error, Result};

// =============================================================================
// OS-backed classifier
// =============================================================================

/// Classifies mounted disks using `sysinfo`
pub struct SysinfoClassifier {
    /// Media kind per mount point from the last enumeration
    kinds: Mutex<Vec<(PathBuf, DiskKind)>>,
}

impl SysinfoClassifier {
    /// Create a classifier; the inventory is read on `devices()`
    pub fn new() -> Self {
        Self {
            kinds: Mutex::new(Vec::new()),
        }
    }
}

impl Default for SysinfoClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveClassifier for SysinfoClassifier {
    fn devices(&self) -> Result<Vec<BlockDevice>> {
        let disks = Disks::new_with_refreshed_list();
        let mut kinds = self.kinds.lock();
        kinds.clear();

        let devices = disks
            .list()
            .iter()
            .map(|disk| {
                kinds.push((disk.mount_point().to_path_buf(), disk.kind()));
                BlockDevice {
                    name: disk.name().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().to_path_buf(),
                    total_bytes: disk.total_space(),
                    available_bytes: disk.available_space(),
                }
            })
            .collect::<Vec<_>>();

        debug!("Enumerated {} mounted devices", devices.len());
        Ok(devices)
    }

    fn classify(&self, device: &BlockDevice) -> Result<DriveClass> {
        let kinds = self.kinds.lock();
        let kind = kinds
            .iter()
            .find(|(mount, _)| *mount == device.mount_point)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| Error::Classification {
                device: device.name.clone(),
                reason: "device not present in the last inventory".to_string(),
            })?;

        match kind {
            DiskKind::SSD => Ok(DriveClass::Fast),
            DiskKind::HDD => Ok(DriveClass::Slow),
            DiskKind::Unknown(code) => Err(Error::Classification {
                device: device.name.clone(),
                reason: format!("unknown media type ({})", code),
            }),
        }
    }
}

// =============================================================================
// Fixed classifier
// =============================================================================

/// Classifier with a fixed inventory; `None` simulates a failed query
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    devices: Vec<(BlockDevice, Option<DriveClass>)>,
}

impl StaticClassifier {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device with its classification result
    pub fn with_device(mut self, device: BlockDevice, class: Option<DriveClass>) -> Self {
        self.devices.push((device, class));
        self
    }
}

impl DriveClassifier for StaticClassifier {
    fn devices(&self) -> Result<Vec<BlockDevice>> {
        Ok(self.devices.iter().map(|(d, _)| d.clone()).collect())
    }

    fn classify(&self, device: &BlockDevice) -> Result<DriveClass> {
        self.devices
            .iter()
            .find(|(d, _)| d == device)
            .and_then(|(_, class)| *class)
            .ok_or_else(|| Error::Classification {
                device: device.name.clone(),
                reason: "query failed".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_classifier_failure() {
        let dev = BlockDevice {
            name: "sdx".into(),
            mount_point: PathBuf::from("/x"),
            total_bytes: 1,
            available_bytes: 1,
        };
        let classifier = StaticClassifier::new().with_device(dev.clone(), None);
        assert!(matches!(
            classifier.classify(&dev),
            Err(Error::Classification { .. })
        ));
    }

    #[test]
    fn test_sysinfo_classifier_rejects_unknown_device() {
        let classifier = SysinfoClassifier::new();
        let dev = BlockDevice {
            name: "ghost".into(),
            mount_point: PathBuf::from("/definitely/not/mounted"),
            total_bytes: 0,
            available_bytes: 0,
        };
        assert!(classifier.classify(&dev).is_err());
    }

    #[test]
    fn test_sysinfo_classifier_enumerates() {
        // Inventory contents depend on the host; only the call must succeed
        let classifier = SysinfoClassifier::new();
        assert!(classifier.devices().is_ok());
    }
}
