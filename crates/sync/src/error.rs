//! Errors surfaced by the pipeline's command surface.

use thiserror::Error;

use crate::cloud::CloudError;
use crate::gateway::ExtractionError;
use crate::store::StoreError;

/// One file that could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

impl std::fmt::Display for FileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file, self.error)
    }
}

/// Failure of an import or backup restore. State is unchanged on `Err`.
#[derive(Debug, Error)]
pub enum ImportError {
    /// No extraction gateway is configured.
    #[error("file import needs CLAUDE_API_KEY to be set")]
    NotConfigured,

    /// A file failed and the batch was aborted.
    #[error("{file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractionError,
    },

    /// Every file in the batch failed.
    #[error("all {} files failed to extract", .0.len())]
    AllFilesFailed(Vec<FileFailure>),

    /// Extraction succeeded but recognized nothing.
    #[error("no customer records found in the uploaded files")]
    NoRecordsFound,

    /// The merged collection could not be saved.
    #[error("failed to save customers: {0}")]
    Persistence(#[from] StoreError),

    /// A backup file is not a customer array.
    #[error("invalid backup file: {0}")]
    Parse(String),
}

/// Failure of a cloud sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no cloud store is configured")]
    NotConfigured,

    #[error("a cloud sync is already running")]
    AlreadySyncing,

    #[error("cloud sync failed: {0}")]
    Cloud(#[from] CloudError),

    /// The remote accepted the batch but the local snapshot could not be
    /// updated.
    #[error("failed to save synced customers: {0}")]
    Persistence(#[from] StoreError),

    /// The sync task panicked or was cancelled.
    #[error("cloud sync interrupted: {0}")]
    Interrupted(String),
}
