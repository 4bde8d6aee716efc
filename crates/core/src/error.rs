//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid shard size: {size} (must be between {min} and {max})")]
    InvalidShardSize { size: u64, min: u64, max: u64 },

    #[error("staging frame {frame} is {state}, cannot {action}")]
    FrameClosed {
        frame: String,
        state: String,
        action: &'static str,
    },

    #[error("shard registered out of order: expected index {expected}, got {actual}")]
    OutOfOrder { expected: u32, actual: u32 },

    #[error("invalid pointer set: {0}")]
    InvalidPointers(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error is an ordering/state invariant violation rather than bad input.
    pub fn is_sequencing(&self) -> bool {
        matches!(self, Self::FrameClosed { .. } | Self::OutOfOrder { .. } | Self::InvalidPointers(_))
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
