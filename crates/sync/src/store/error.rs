//! Local store errors.

use thiserror::Error;

/// Errors that can occur when reading or writing the local snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The collection could not be serialized.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing would exceed the configured storage quota.
    #[error("storage quota exceeded: snapshot needs {needed} bytes, limit is {limit}")]
    QuotaExceeded {
        /// Size of the rejected write.
        needed: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The blocking task running the operation panicked or was cancelled.
    #[error("storage task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}
