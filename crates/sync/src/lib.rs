//! Customer Atlas sync library.
//!
//! Turns spreadsheet photos and CSV files into a de-duplicated, persisted
//! customer collection:
//!
//! 1. [`gateway`] - extraction through the Claude API and best-effort map
//!    link enrichment
//! 2. [`store`] - the local snapshot (one JSON blob under one fixed key)
//! 3. [`cloud`] - optional Firestore mirror, authoritative on read
//! 4. [`pipeline`] - the coordinator that owns application state and exposes
//!    the command surface used by front ends
//!
//! Gateways and stores sit behind traits so the pipeline can be exercised
//! with in-memory fakes.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod claude;
pub mod cloud;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod store;

pub use config::AtlasConfig;
pub use error::{FileFailure, ImportError, SyncError};
pub use pipeline::{
    ImportProgress, ImportReport, LoadOutcome, PipelineState, SyncPipeline, SyncPipelineBuilder,
};
