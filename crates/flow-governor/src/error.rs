//! Error types for the flow setup governor.
//!
//! Only construction and configuration can fail recoverably. Contract
//! violations on the admission path (zero packet counts, corrupt table
//! sizes) are programming errors and panic instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Errors that can occur while building or configuring a governor.
#[derive(Debug, Error)]
pub enum GovernorError {
    /// The counting table could not be allocated.
    #[error("Failed to allocate {bytes} byte governor hash table")]
    AllocationFailed {
        /// Requested table size in bytes.
        bytes: usize,
    },

    /// A table size bound is unusable.
    #[error("Invalid governor table size {size}: {reason}")]
    InvalidTableSize {
        /// The offending size in bytes.
        size: usize,
        /// Why the size was rejected.
        reason: String,
    },

    /// The flow setup threshold does not fit a 4-bit counter.
    #[error("Invalid flow setup threshold {threshold}: must be in 2..=15")]
    InvalidThreshold {
        /// The offending threshold.
        threshold: u8,
    },

    /// The generation timing window is inverted.
    #[error("Invalid generation window: min {min_ms} ms exceeds max {max_ms} ms")]
    InvalidElapsed {
        /// Configured minimum generation time.
        min_ms: u64,
        /// Configured maximum generation time.
        max_ms: u64,
    },

    /// Failed to read a configuration file.
    #[error("Failed to read governor config {}: {source}", path.display())]
    ConfigIo {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A configuration file was not valid JSON for [`crate::GovernorConfig`].
    #[error("Failed to parse governor config {}: {source}", path.display())]
    ConfigParse {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying parser error.
        #[source]
        source: serde_json::Error,
    },
}

impl GovernorError {
    /// Creates an invalid table size error.
    pub fn invalid_size(size: usize, reason: impl Into<String>) -> Self {
        Self::InvalidTableSize {
            size,
            reason: reason.into(),
        }
    }

    /// Returns true if this error came from the configuration layer rather
    /// than from resource exhaustion.
    pub fn is_config_error(&self) -> bool {
        !matches!(self, GovernorError::AllocationFailed { .. })
    }
}
