//! Storage Tiers
//!
//! Promotes hot files from slow storage to the fastest tier that fits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Tier Manager                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  RAM Tier (LRU)      │ Fast Disk (cache root) │ Slow Disk        │
//! │  ┌───────────────┐   │ ┌───────────────────┐  │ ┌─────────────┐  │
//! │  │ path -> bytes │   │ │ mirrored tree     │  │ │ origin +    │  │
//! │  │ 90% avail RAM │   │ │ budget-bounded    │  │ │ redirects   │  │
//! │  └───────────────┘   │ └───────────────────┘  │ └─────────────┘  │
//! │          │           │          │             │        │         │
//! │          └───────────┴──────────┴─────────────┴────────┘         │
//! │                              │                                   │
//! │              Cache Index (origin -> cache, JSON)                 │
//! │              Budget Controller (free-space driven)               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod budget;
pub mod index;
mod manager;
pub mod ram;

pub use budget::{compute_disk_budget, BudgetController, BudgetPolicy};
pub use index::CacheIndex;
pub use manager::{CacheOutcome, TierManager, TierRoots, TierStats};
pub use ram::{FixedMemory, MemoryProbe, RamStats, RamTier, SystemMemory};
