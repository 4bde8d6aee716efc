//! Transfer error types.

use thiserror::Error;

/// Errors surfaced by uploads, downloads and the bridge.
///
/// `Transport` and `Protocol` display the bare message so callers see exactly
/// what the connection layer or the server reported.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The connection failed before a response was obtained.
    #[error("{0}")]
    Transport(String),

    /// The remote side rejected the request.
    #[error("{0}")]
    Protocol(String),

    /// An ordering or state invariant was violated.
    #[error("sequencing error: {0}")]
    Sequencing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?} waiting for peer channel to open")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Signer(#[from] ferry_signer::SignerError),
}

impl From<ferry_core::Error> for TransferError {
    fn from(err: ferry_core::Error) -> Self {
        use ferry_core::Error as CoreError;
        match err {
            e if e.is_sequencing() => Self::Sequencing(e.to_string()),
            e @ (CoreError::InvalidShardSize { .. } | CoreError::InvalidConfig(_)) => {
                Self::Config(e.to_string())
            }
            e => Self::Protocol(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type for transfer operations.
pub type TransferResult<T> = std::result::Result<T, TransferError>;
