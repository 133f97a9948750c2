//! Gateway errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::claude::ClaudeError;

/// The extraction gateway could not produce records for an input.
///
/// Distinct from an empty result, which means the input was read but no
/// customer rows were recognized.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The Claude request itself failed.
    #[error("extraction failed: {0}")]
    Claude(#[from] ClaudeError),

    /// Claude answered, but not with a JSON array of records.
    #[error("extraction failed: unreadable reply: {0}")]
    InvalidReply(String),
}

/// Enrichment failed. Never surfaced past the pipeline; see
/// [`enrich_best_effort`](super::enrich_best_effort).
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment request failed: {0}")]
    Claude(#[from] ClaudeError),

    #[error("unreadable enrichment reply: {0}")]
    InvalidReply(String),
}

/// A file could not be turned into an extraction input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("unsupported file type for {path}: expected CSV text or a PNG, JPEG, GIF or WebP image")]
    Unsupported { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8 text")]
    NotUtf8 { path: PathBuf },
}
