//! In-memory filesystem for testing
//!
//! Keeps a flat map of path -> node behind one lock. Access times come from a
//! logical clock so eviction order is deterministic, and any operation can be
//! made to fail on a given path.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;

use super::{DirEntry, DiskSpace, EntryKind, FileSystem};
use crate::error::{Error, Result};

const MAX_REDIRECT_HOPS: usize = 8;

/// Operation names used for fault injection and counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    Read,
    Write,
    CreateDir,
    Copy,
    Move,
    RemoveFile,
    CreateRedirect,
    RemoveRedirect,
    ReadDir,
    DiskSpace,
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File {
        data: Bytes,
        accessed: SystemTime,
        modified: SystemTime,
    },
    Redirect {
        target: PathBuf,
    },
}

#[derive(Debug)]
struct MemoryState {
    nodes: BTreeMap<PathBuf, Node>,
    space: DiskSpace,
    clock: u64,
    faults: HashSet<(FsOp, PathBuf)>,
    counts: HashMap<FsOp, u64>,
}

impl MemoryState {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 + self.clock)
    }

    fn record(&mut self, op: FsOp, paths: &[&Path]) -> Result<()> {
        *self.counts.entry(op).or_insert(0) += 1;
        for path in paths {
            if self.faults.contains(&(op, path.to_path_buf())) {
                return Err(Error::Io(io::Error::other(format!(
                    "injected {:?} fault on {}",
                    op,
                    path.display()
                ))));
            }
        }
        Ok(())
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() || parent == Path::new("/") => true,
            Some(parent) => matches!(self.nodes.get(parent), Some(Node::Dir)),
        }
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_REDIRECT_HOPS {
            match self.nodes.get(&current) {
                Some(Node::Redirect { target }) => current = target.clone(),
                Some(_) => return Ok(current),
                None => return Err(not_found(path)),
            }
        }
        Err(Error::Io(io::Error::other(format!(
            "too many redirects at {}",
            path.display()
        ))))
    }

    fn mkdirs(&mut self, path: &Path) -> Result<()> {
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.as_os_str().is_empty() || ancestor == Path::new("/") {
                continue;
            }
            match self.nodes.get(ancestor) {
                Some(Node::Dir) => {}
                Some(_) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", ancestor.display()),
                    )))
                }
                None => {
                    self.nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn put_file(&mut self, path: &Path, data: Bytes, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        if !self.parent_exists(path) {
            return Err(not_found(path.parent().unwrap_or(path)));
        }
        if matches!(self.nodes.get(path), Some(Node::Dir)) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", path.display()),
            )));
        }
        self.nodes.insert(
            path.to_path_buf(),
            Node::File {
                data,
                accessed,
                modified,
            },
        );
        Ok(())
    }
}

fn not_found(path: &Path) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    ))
}

/// In-memory [`FileSystem`] with fault injection
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                nodes: BTreeMap::new(),
                space: DiskSpace {
                    total: 1024 * 1024 * 1024 * 1024,
                    free: 1024 * 1024 * 1024 * 1024,
                },
                clock: 0,
                faults: HashSet::new(),
                counts: HashMap::new(),
            }),
        }
    }
}

impl MemoryFs {
    /// Create an empty in-memory filesystem (1 TiB volume, all free)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file, including missing parent directories
    pub fn add_file(&self, path: impl AsRef<Path>, data: &[u8]) {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if let Some(parent) = path.parent() {
            let _ = state.mkdirs(parent);
        }
        let now = state.tick();
        let _ = state.put_file(path, Bytes::copy_from_slice(data), now, now);
    }

    /// Set the volume capacity reported for every path
    pub fn set_disk_space(&self, total: u64, free: u64) {
        self.state.lock().space = DiskSpace { total, free };
    }

    /// Override the access time of a file (redirects are followed)
    pub fn set_accessed(&self, path: impl AsRef<Path>, at: SystemTime) {
        let mut state = self.state.lock();
        if let Ok(real) = state.resolve(path.as_ref()) {
            if let Some(Node::File { accessed, .. }) = state.nodes.get_mut(&real) {
                *accessed = at;
            }
        }
    }

    /// Make `op` fail whenever it touches `path`
    pub fn fail_on(&self, op: FsOp, path: impl AsRef<Path>) {
        self.state
            .lock()
            .faults
            .insert((op, path.as_ref().to_path_buf()));
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Number of times `op` was attempted
    pub fn op_count(&self, op: FsOp) -> u64 {
        self.state.lock().counts.get(&op).copied().unwrap_or(0)
    }

    /// Content of a regular file at exactly `path` (redirects not followed)
    pub fn content(&self, path: impl AsRef<Path>) -> Option<Bytes> {
        match self.state.lock().nodes.get(path.as_ref()) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Target of the redirect at `path`, if `path` is a redirect
    pub fn redirect_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        match self.state.lock().nodes.get(path.as_ref()) {
            Some(Node::Redirect { target }) => Some(target.clone()),
            _ => None,
        }
    }

    /// Whether anything exists at `path`
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().nodes.contains_key(path.as_ref())
    }
}

impl FileSystem for MemoryFs {
    fn read(&self, path: &Path) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.record(FsOp::Read, &[path])?;
        let real = state.resolve(path)?;
        let now = state.tick();
        match state.nodes.get_mut(&real) {
            Some(Node::File { data, accessed, .. }) => {
                *accessed = now;
                Ok(data.clone())
            }
            _ => Err(Error::Io(io::Error::other(format!(
                "{} is not a file",
                path.display()
            )))),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.record(FsOp::Write, &[path])?;
        let now = state.tick();
        state.put_file(path, Bytes::copy_from_slice(data), now, now)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.record(FsOp::CreateDir, &[path])?;
        state.mkdirs(path)
    }

    fn copy_preserving(&self, from: &Path, to: &Path) -> Result<u64> {
        let mut state = self.state.lock();
        let real = state.resolve(from)?;
        let (data, accessed, modified) = match state.nodes.get(&real) {
            Some(Node::File {
                data,
                accessed,
                modified,
            }) => (data.clone(), *accessed, *modified),
            _ => return Err(not_found(from)),
        };

        if let Err(e) = state.record(FsOp::Copy, &[from, to]) {
            // Leave a truncated destination behind, like an interrupted copy
            let partial = data.slice(..data.len() / 2);
            let _ = state.put_file(to, partial, accessed, modified);
            return Err(e);
        }

        let len = data.len() as u64;
        state.put_file(to, data, accessed, modified)?;
        Ok(len)
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.record(FsOp::Move, &[from, to])?;
        if !state.parent_exists(to) {
            return Err(not_found(to.parent().unwrap_or(to)));
        }
        if matches!(state.nodes.get(to), Some(Node::Dir)) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", to.display()),
            )));
        }
        match state.nodes.remove(from) {
            Some(Node::Dir) => {
                state.nodes.insert(from.to_path_buf(), Node::Dir);
                Err(Error::Io(io::Error::other("moving directories is not supported")))
            }
            Some(node) => {
                state.nodes.insert(to.to_path_buf(), node);
                Ok(())
            }
            None => Err(not_found(from)),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.record(FsOp::RemoveFile, &[path])?;
        match state.nodes.get(path) {
            Some(Node::File { .. }) | Some(Node::Redirect { .. }) => {
                state.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(Error::Io(io::Error::other(format!(
                "{} is a directory",
                path.display()
            )))),
            None => Err(not_found(path)),
        }
    }

    fn create_redirect(&self, link: &Path, target: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.record(FsOp::CreateRedirect, &[link])?;
        if state.nodes.contains_key(link) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", link.display()),
            )));
        }
        if !state.parent_exists(link) {
            return Err(not_found(link.parent().unwrap_or(link)));
        }
        state.nodes.insert(
            link.to_path_buf(),
            Node::Redirect {
                target: target.to_path_buf(),
            },
        );
        Ok(())
    }

    fn remove_redirect(&self, link: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.record(FsOp::RemoveRedirect, &[link])?;
        match state.nodes.get(link) {
            Some(Node::Redirect { .. }) => {
                state.nodes.remove(link);
                Ok(())
            }
            Some(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a redirect", link.display()),
            ))),
            None => Err(not_found(link)),
        }
    }

    fn kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        let state = self.state.lock();
        Ok(state.nodes.get(path).map(|node| match node {
            Node::Dir => EntryKind::Dir,
            Node::File { .. } => EntryKind::File,
            Node::Redirect { .. } => EntryKind::Redirect,
        }))
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        let state = self.state.lock();
        let real = state.resolve(path)?;
        match state.nodes.get(&real) {
            Some(Node::File { data, .. }) => Ok(data.len() as u64),
            _ => Ok(0),
        }
    }

    fn accessed(&self, path: &Path) -> Result<SystemTime> {
        let state = self.state.lock();
        let real = state.resolve(path)?;
        match state.nodes.get(&real) {
            Some(Node::File { accessed, .. }) => Ok(*accessed),
            _ => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut state = self.state.lock();
        state.record(FsOp::ReadDir, &[path])?;
        let is_root = path == Path::new("/");
        if !is_root && !matches!(state.nodes.get(path), Some(Node::Dir)) {
            return Err(not_found(path));
        }

        Ok(state
            .nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(path))
            .map(|(child, node)| {
                let (kind, len) = match node {
                    Node::Dir => (EntryKind::Dir, 0),
                    Node::File { data, .. } => (EntryKind::File, data.len() as u64),
                    Node::Redirect { .. } => (EntryKind::Redirect, 0),
                };
                DirEntry {
                    path: child.clone(),
                    kind,
                    len,
                }
            })
            .collect())
    }

    fn disk_space(&self, path: &Path) -> Result<DiskSpace> {
        let mut state = self.state.lock();
        state.record(FsOp::DiskSpace, &[path])?;
        Ok(state.space)
    }
}
