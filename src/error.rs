//! Error types for the tiered file cache

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered file cache
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Hardware Discovery Errors
    // =========================================================================
    /// No solid-state device available for the cache tier
    #[error("No fast (SSD) device detected")]
    NoFastDevice,

    /// No rotational device available as the origin tier
    #[error("No slow (HDD) device detected")]
    NoSlowDevice,

    /// Device type could not be determined
    #[error("Could not determine type for {device}: {reason}")]
    Classification { device: String, reason: String },

    // =========================================================================
    // Tiering Errors
    // =========================================================================
    /// File is not located under the slow-storage root
    #[error("Path {} is outside the slow-storage root", path.display())]
    OutsideSlowRoot { path: PathBuf },

    /// Cache path already belongs to another origin
    #[error("Cache path {} is already mapped from {}", cache.display(), origin.display())]
    IndexConflict { origin: PathBuf, cache: PathBuf },

    /// Migration to the fast tier failed (rolled back)
    #[error("Failed to cache {}: {reason}", path.display())]
    MigrationFailed { path: PathBuf, reason: String },

    /// Moving a cached file back to slow storage failed
    #[error("Failed to evict {}: {reason}", path.display())]
    EvictionFailed { path: PathBuf, reason: String },

    /// Path does not exist
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl Error {
    /// Returns true for the one startup condition the service cannot recover from
    pub fn is_fatal_init(&self) -> bool {
        matches!(self, Error::NoFastDevice | Error::NoSlowDevice)
    }
}
