//! Observable pipeline state and command results.

use customer_atlas_core::{CloudErrorKind, CloudLinkStatus, Customer, DataSource};

use crate::error::FileFailure;

/// Everything a front end renders, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    /// The collection, newest first.
    pub customers: Vec<Customer>,
    /// Where the last load came from.
    pub source: DataSource,
    pub cloud_status: CloudLinkStatus,
    /// Classification of the last cloud failure, cleared on success.
    pub cloud_error: Option<CloudErrorKind>,
    /// Set while an import is extracting files.
    pub progress: Option<ImportProgress>,
}

/// Extraction progress within one import batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    /// 1-based index of the file being extracted.
    pub current: usize,
    pub total: usize,
    pub file: String,
}

/// Result of [`load_initial`](super::SyncPipeline::load_initial).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub customers: Vec<Customer>,
    pub source: DataSource,
    /// Why the cloud copy was not used, if one is configured.
    pub cloud_error: Option<CloudErrorKind>,
}

/// Result of a successful import or backup restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Records produced by extraction or read from the backup.
    pub extracted: usize,
    /// Records that were new and got persisted.
    pub added: usize,
    /// Records dropped because their id was already known.
    pub duplicates: usize,
    /// Files skipped under the permissive extraction policy.
    pub failed: Vec<FileFailure>,
    /// Whether a background cloud sync was started afterwards.
    pub sync_started: bool,
}

impl ImportReport {
    /// `true` when nothing new was found and nothing was saved.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.added == 0
    }
}
