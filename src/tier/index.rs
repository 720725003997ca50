//! Cache Index
//!
//! Authoritative origin -> cache path mapping, persisted as a single JSON
//! object and rewritten in full on every mutation. Each cache path belongs
//! to exactly one origin.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::storage::FileSystem;

/// Persisted mapping of migrated files
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    /// Where the index is persisted
    location: PathBuf,
    /// origin -> cache
    entries: BTreeMap<PathBuf, PathBuf>,
    /// cache -> origin, for the injectivity check
    owners: BTreeMap<PathBuf, PathBuf>,
}

impl CacheIndex {
    /// Create an empty index persisted at `location`
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    /// Load the index; a missing or unparsable file yields an empty index
    pub fn load(fs: &dyn FileSystem, location: impl Into<PathBuf>) -> Self {
        let mut index = Self::new(location);

        match fs.kind(&index.location) {
            Ok(None) => {
                info!(path = %index.location.display(), "No cache index found, starting empty");
                return index;
            }
            Err(e) => {
                error!(path = %index.location.display(), "Failed to load cache index: {}", e);
                return index;
            }
            Ok(Some(_)) => {}
        }

        let raw: BTreeMap<String, String> = match fs
            .read(&index.location)
            .and_then(|bytes| Ok(serde_json::from_slice(&bytes)?))
        {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %index.location.display(), "Failed to load cache index: {}", e);
                return index;
            }
        };

        for (origin, cache) in raw {
            if let Err(e) = index.insert(PathBuf::from(origin), PathBuf::from(cache)) {
                warn!("Dropping index entry: {}", e);
            }
        }

        info!(path = %index.location.display(), entries = index.len(), "Loaded cache index");
        index
    }

    /// Rewrite the persisted index in full
    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        let raw: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|(o, c)| {
                (
                    o.to_string_lossy().into_owned(),
                    c.to_string_lossy().into_owned(),
                )
            })
            .collect();
        fs.write(&self.location, &serde_json::to_vec(&raw)?)?;
        debug!(entries = raw.len(), "Persisted cache index");
        Ok(())
    }

    /// Record a migrated file
    pub fn insert(&mut self, origin: PathBuf, cache: PathBuf) -> Result<()> {
        if let Some(owner) = self.owners.get(&cache) {
            if *owner != origin {
                return Err(Error::IndexConflict {
                    origin: owner.clone(),
                    cache,
                });
            }
        }
        if let Some(previous) = self.entries.insert(origin.clone(), cache.clone()) {
            self.owners.remove(&previous);
        }
        self.owners.insert(cache, origin);
        Ok(())
    }

    /// Forget a file; returns its cache path
    pub fn remove(&mut self, origin: &Path) -> Option<PathBuf> {
        let cache = self.entries.remove(origin)?;
        self.owners.remove(&cache);
        Some(cache)
    }

    /// Cache path of a migrated file
    pub fn get(&self, origin: &Path) -> Option<&Path> {
        self.entries.get(origin).map(PathBuf::as_path)
    }

    /// Origin owning a cache path
    pub fn owner_of(&self, cache: &Path) -> Option<&Path> {
        self.owners.get(cache).map(PathBuf::as_path)
    }

    pub fn contains(&self, origin: &Path) -> bool {
        self.entries.contains_key(origin)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in origin-path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.entries
            .iter()
            .map(|(o, c)| (o.as_path(), c.as_path()))
    }

    /// Where the index is persisted
    pub fn location(&self) -> &Path {
        &self.location
    }
}
