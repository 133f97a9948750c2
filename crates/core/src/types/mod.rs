//! Core types for Customer Atlas.
//!
//! This module provides type-safe wrappers for the customer domain.

pub mod customer;
pub mod id;
pub mod status;

pub use customer::{Customer, sort_newest_first};
pub use id::CustomerId;
pub use status::*;
