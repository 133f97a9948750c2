//! Local persistence.
//!
//! [`LocalStore`] holds the entire collection as one serialized snapshot
//! under [`STORAGE_KEY`] in a [`KeyValueStore`].

mod error;
mod kv;
mod local;

pub use error::StoreError;
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use local::{LocalStore, STORAGE_KEY};
