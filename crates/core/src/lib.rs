//! Customer Atlas Core - Shared types library.
//!
//! This crate provides the types and pure functions used across all Customer
//! Atlas components:
//! - `sync` - Extraction, enrichment, persistence and cloud reconciliation
//! - `cli` - Command-line front end driving the sync pipeline
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere, including from tests that never touch the network.
//!
//! # Modules
//!
//! - [`types`] - Customer records, identifiers, and status enums
//! - [`merge`] - De-duplicating merge of incoming records into a collection
//! - [`stats`] - Per-city aggregation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod merge;
pub mod stats;
pub mod types;

pub use merge::{MergeOutcome, merge};
pub use stats::{CityCount, aggregate};
pub use types::*;
