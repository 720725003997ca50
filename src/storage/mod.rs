//! Storage Abstraction
//!
//! Every byte the cache moves goes through the [`FileSystem`] port so the
//! tiering engine can run against the real disks or an in-memory fake.
//!
//! # Implementations
//!
//! - [`LocalFs`] - OS-backed, redirects are symbolic links
//! - [`MemoryFs`] - in-memory tree with fault injection and operation counters

mod local;
mod memory;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use tracing::warn;

use crate::error::Result;

pub use local::LocalFs;
pub use memory::{FsOp, MemoryFs};

// =============================================================================
// Value Types
// =============================================================================

/// Kind of a filesystem object, without following redirects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    /// Regular file holding real content
    File,
    /// Directory
    Dir,
    /// Redirect (symlink/junction) forwarding to another path
    Redirect,
}

/// One child returned by [`FileSystem::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the child
    pub path: PathBuf,
    /// Object kind (redirects are not followed)
    pub kind: EntryKind,
    /// Size in bytes for regular files, 0 otherwise
    pub len: u64,
}

/// Capacity of the volume holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    /// Total bytes on the volume
    pub total: u64,
    /// Bytes currently free
    pub free: u64,
}

// =============================================================================
// FileSystem Port
// =============================================================================

/// Blocking filesystem operations used by the tiering engine.
///
/// Reads, lengths and access times follow redirects; `kind`, `read_dir`,
/// `remove_redirect` and `create_redirect` operate on the redirect itself.
pub trait FileSystem: Send + Sync {
    /// Read a whole file
    fn read(&self, path: &Path) -> Result<Bytes>;

    /// Replace a file's content in full
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create a directory and all missing parents
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Copy a file, preserving permissions and timestamps
    fn copy_preserving(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Move a file, across volumes if necessary
    fn move_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a regular file
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Place a redirect at `link` pointing at `target`
    fn create_redirect(&self, link: &Path, target: &Path) -> Result<()>;

    /// Remove the redirect at `link` (fails if `link` is not a redirect)
    fn remove_redirect(&self, link: &Path) -> Result<()>;

    /// Object kind at `path`, `None` if nothing exists there
    fn kind(&self, path: &Path) -> Result<Option<EntryKind>>;

    /// Size of the file at `path`
    fn file_len(&self, path: &Path) -> Result<u64>;

    /// Last access time of the file at `path`
    fn accessed(&self, path: &Path) -> Result<SystemTime>;

    /// Immediate children of a directory
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Capacity of the volume holding `path`
    fn disk_space(&self, path: &Path) -> Result<DiskSpace>;
}

// =============================================================================
// Tree Helpers
// =============================================================================

/// Walk every non-directory entry under `root` in path order.
///
/// Unreadable directories are logged and skipped. The visitor returns
/// `false` to stop the walk; the function returns `false` in that case.
pub fn walk_files<F>(fs: &dyn FileSystem, root: &Path, mut visit: F) -> bool
where
    F: FnMut(&DirEntry) -> bool,
{
    let mut pending = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = pending.pop_front() {
        let mut children = match fs.read_dir(&dir) {
            Ok(children) => children,
            Err(e) => {
                warn!(dir = %dir.display(), "Skipping unreadable directory: {}", e);
                continue;
            }
        };
        children.sort_by(|a, b| a.path.cmp(&b.path));

        for child in children {
            match child.kind {
                EntryKind::Dir => pending.push_back(child.path),
                EntryKind::File | EntryKind::Redirect => {
                    if !visit(&child) {
                        return false;
                    }
                }
            }
        }
    }

    true
}

/// Total size of regular files under `root`; unreadable subtrees count as zero
pub fn tree_size(fs: &dyn FileSystem, root: &Path) -> u64 {
    let mut total = 0u64;
    walk_files(fs, root, |entry| {
        if entry.kind == EntryKind::File {
            total = total.saturating_add(entry.len);
        }
        true
    });
    total
}
