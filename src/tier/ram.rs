//! RAM Tier - Volatile Hot Cache
//!
//! Byte payloads keyed by origin path, evicted in strict LRU order.
//!
//! # Design
//!
//! - Capacity is a fraction of *currently available* system memory and is
//!   recomputed on every insert and on monitor ticks
//! - Recency is a monotonically increasing generation number per entry;
//!   a `BTreeMap<generation, key>` yields the LRU victim in O(log n)
//! - One `parking_lot::Mutex` guards all entries, sizes and ordering

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use sysinfo::System;
use tracing::debug;

// =============================================================================
// Memory Probe
// =============================================================================

/// Source of the "available memory" figure the RAM tier is sized from
pub trait MemoryProbe: Send + Sync {
    /// Bytes of memory currently available to new allocations
    fn available_memory(&self) -> u64;
}

/// Reads available memory from the OS
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn available_memory(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.available_memory()
    }
}

/// Fixed, adjustable memory figure for tests
#[derive(Debug, Default)]
pub struct FixedMemory {
    available: AtomicU64,
}

impl FixedMemory {
    pub fn new(available: u64) -> Self {
        Self {
            available: AtomicU64::new(available),
        }
    }

    /// Change the reported available memory
    pub fn set(&self, available: u64) {
        self.available.store(available, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemory {
    fn available_memory(&self) -> u64 {
        self.available.load(Ordering::Relaxed)
    }
}

// =============================================================================
// RAM Tier
// =============================================================================

#[derive(Debug)]
struct RamEntry {
    data: Bytes,
    generation: u64,
}

#[derive(Debug, Default)]
struct RamState {
    entries: HashMap<PathBuf, RamEntry>,
    /// generation -> key, oldest first
    recency: BTreeMap<u64, PathBuf>,
    next_generation: u64,
    size: u64,
    capacity: u64,
}

impl RamState {
    fn touch(&mut self, key: &Path) {
        let generation = self.next_generation;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.generation);
            entry.generation = generation;
            self.recency.insert(generation, key.to_path_buf());
            self.next_generation += 1;
        }
    }

    fn remove(&mut self, key: &Path) -> Option<RamEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.generation);
        self.size -= entry.data.len() as u64;
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<PathBuf> {
        let (_, key) = self.recency.pop_first()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.size -= entry.data.len() as u64;
        }
        Some(key)
    }

    /// Evict until `size + reserve <= capacity` or nothing is left
    fn shrink_to(&mut self, reserve: u64) -> u64 {
        let mut evicted = 0;
        while self.size.saturating_add(reserve) > self.capacity && !self.entries.is_empty() {
            if let Some(key) = self.evict_lru() {
                debug!(key = %key.display(), "Evicted from RAM tier");
                evicted += 1;
            }
        }
        evicted
    }
}

/// Bounded in-memory LRU tier
pub struct RamTier {
    state: Mutex<RamState>,
    probe: Arc<dyn MemoryProbe>,
    fraction: f64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    rejected: AtomicU64,
}

impl RamTier {
    /// Create a tier sized at `fraction` of the probe's available memory
    pub fn new(probe: Arc<dyn MemoryProbe>, fraction: f64) -> Self {
        let tier = Self {
            state: Mutex::new(RamState::default()),
            probe,
            fraction,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        };
        let capacity = tier.compute_capacity();
        tier.state.lock().capacity = capacity;
        tier
    }

    fn compute_capacity(&self) -> u64 {
        (self.probe.available_memory() as f64 * self.fraction) as u64
    }

    /// Capacity the tier would adopt now. Does not resize the tier.
    pub fn capacity(&self) -> u64 {
        self.compute_capacity()
    }

    /// Recompute capacity, then trim to it
    pub fn update_capacity(&self) {
        let capacity = self.compute_capacity();
        let mut state = self.state.lock();
        state.capacity = capacity;
        let evicted = state.shrink_to(0);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Evict least-recently-used entries until the stored size fits the
    /// current capacity
    pub fn trim(&self) {
        self.update_capacity();
    }

    /// Insert a payload as most-recently-used.
    ///
    /// Returns `false` without touching any entry when the payload alone is
    /// larger than the tier.
    pub fn add(&self, key: &Path, data: Bytes) -> bool {
        let capacity = self.compute_capacity();
        let len = data.len() as u64;
        if len > capacity {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut state = self.state.lock();
        state.capacity = capacity;
        state.remove(key);
        let evicted = state.shrink_to(len);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);

        let generation = state.next_generation;
        state.next_generation += 1;
        state.recency.insert(generation, key.to_path_buf());
        state.entries.insert(key.to_path_buf(), RamEntry { data, generation });
        state.size += len;
        true
    }

    /// Fetch a payload, marking it most-recently-used
    pub fn get(&self, key: &Path) -> Option<Bytes> {
        let mut state = self.state.lock();
        let data = state.entries.get(key).map(|e| e.data.clone());
        match data {
            Some(data) => {
                state.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop an entry; no-op when absent
    pub fn remove(&self, key: &Path) {
        self.state.lock().remove(key);
    }

    /// Check presence without affecting recency
    pub fn contains(&self, key: &Path) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Aggregate payload bytes
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the tier is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<PathBuf> {
        self.state.lock().recency.values().cloned().collect()
    }

    /// Get tier statistics
    pub fn stats(&self) -> RamStats {
        let state = self.state.lock();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        RamStats {
            entries: state.entries.len(),
            size: state.size,
            capacity: state.capacity,
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// RAM tier statistics
#[derive(Debug, Clone)]
pub struct RamStats {
    /// Number of entries
    pub entries: usize,
    /// Stored bytes
    pub size: u64,
    /// Capacity at the last recomputation
    pub capacity: u64,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Eviction count
    pub evictions: u64,
    /// Payloads refused for being larger than the tier
    pub rejected: u64,
}

// =============================================================================
// Tests
// =============================================================================
