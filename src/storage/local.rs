//! OS-backed filesystem
//!
//! Redirects are symbolic links. Volume capacity comes from `sysinfo`,
//! matching a path to the disk with the longest mount-point prefix.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use sysinfo::Disks;
use tracing::{debug, warn};

use super::{DirEntry, DiskSpace, EntryKind, FileSystem};
use crate::error::{Error, Result};

/// Filesystem implementation over `std::fs`
pub struct LocalFs {
    disks: Mutex<Disks>,
}

impl LocalFs {
    /// Create a new local filesystem handle
    pub fn new() -> Self {
        Self {
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }

    fn kind_of(file_type: fs::FileType) -> EntryKind {
        if file_type.is_symlink() {
            EntryKind::Redirect
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        }
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn copy_times(from: &Path, to: &Path) -> io::Result<()> {
        let meta = fs::metadata(from)?;
        let times = fs::FileTimes::new()
            .set_accessed(meta.accessed()?)
            .set_modified(meta.modified()?);
        // A read-only handle is enough; the copy may have inherited 0444
        fs::File::open(to)?.set_times(times)
    }

    /// Cross-volume move. A failed copy never leaves a partial file at `to`.
    fn copy_then_remove(&self, from: &Path, to: &Path) -> Result<()> {
        if let Err(e) = self.copy_preserving(from, to) {
            if let Err(cleanup) = fs::remove_file(to) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %to.display(), "failed to remove partial copy: {}", cleanup);
                }
            }
            return Err(e);
        }
        fs::remove_file(from)?;
        Ok(())
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(path)?))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        // Write-then-rename so a crash never leaves a truncated file behind
        let staging = Self::staging_path(path);
        fs::write(&staging, data)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn copy_preserving(&self, from: &Path, to: &Path) -> Result<u64> {
        let copied = fs::copy(from, to)?;
        Self::copy_times(from, to)?;
        Ok(copied)
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if fs::symlink_metadata(from).is_err() {
                    return Err(rename_err.into());
                }
                // Different volumes: fall back to copy + delete
                debug!(from = %from.display(), to = %to.display(), "rename failed ({}), copying", rename_err);
                self.copy_then_remove(from, to)
            }
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn create_redirect(&self, link: &Path, target: &Path) -> Result<()> {
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, link)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_file(target, link)?;
        Ok(())
    }

    fn remove_redirect(&self, link: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(link)?;
        if !meta.file_type().is_symlink() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a redirect", link.display()),
            )));
        }
        fs::remove_file(link)?;
        Ok(())
    }

    fn kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(Self::kind_of(meta.file_type()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn accessed(&self, path: &Path) -> Result<SystemTime> {
        Ok(fs::metadata(path)?.accessed()?)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let kind = Self::kind_of(entry.file_type()?);
            let len = match kind {
                EntryKind::File => entry.metadata()?.len(),
                _ => 0,
            };
            entries.push(DirEntry {
                path: entry.path(),
                kind,
                len,
            });
        }
        Ok(entries)
    }

    fn disk_space(&self, path: &Path) -> Result<DiskSpace> {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut disks = self.disks.lock();
        disks.refresh();

        disks
            .list()
            .iter()
            .filter(|d| resolved.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| DiskSpace {
                total: d.total_space(),
                free: d.available_space(),
            })
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }
}
