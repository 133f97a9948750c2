//! The local snapshot of the customer collection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use customer_atlas_core::{Customer, sort_newest_first};
use tracing::{instrument, warn};

use super::error::StoreError;
use super::kv::KeyValueStore;

/// Fixed key the whole collection lives under.
pub const STORAGE_KEY: &str = "customer-atlas.customers";

/// Persists the full customer collection as one JSON blob.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("key", &STORAGE_KEY)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Write the whole collection, stamping `created_at` on records that
    /// have never been persisted.
    ///
    /// Returns the records as written. On `Err` nothing was written and the
    /// previous snapshot is still in place.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on serialization failure, quota overrun, or a
    /// backend write failure.
    pub fn save(&self, customers: Vec<Customer>) -> Result<Vec<Customer>, StoreError> {
        self.save_at(customers, Utc::now())
    }

    /// [`save`](Self::save) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    #[instrument(skip(self, customers), fields(count = customers.len()))]
    pub fn save_at(
        &self,
        mut customers: Vec<Customer>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Customer>, StoreError> {
        for customer in &mut customers {
            customer.stamp_created_at(now);
        }

        let blob = serde_json::to_string(&customers)?;
        self.backend.set(STORAGE_KEY, &blob)?;
        Ok(customers)
    }

    /// Read the collection, newest first.
    ///
    /// A missing, unreadable or corrupt snapshot yields an empty collection.
    #[must_use]
    pub fn load(&self) -> Vec<Customer> {
        let blob = match self.backend.get(STORAGE_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Local snapshot unreadable, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Customer>>(&blob) {
            Ok(mut customers) => {
                sort_newest_first(&mut customers);
                customers
            }
            Err(e) => {
                warn!(error = %e, "Local snapshot corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Delete the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot remove it.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(STORAGE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::kv::{FileKeyValueStore, MemoryKeyValueStore};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn memory_store() -> (Arc<MemoryKeyValueStore>, LocalStore) {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let store = LocalStore::new(backend.clone());
        (backend, store)
    }

    #[test]
    fn test_save_twice_keeps_created_at() {
        let (_, store) = memory_store();

        let first = store
            .save_at(vec![Customer::new("a", "", "", "")], at(100))
            .expect("first save");
        let second = store.save_at(first, at(200)).expect("second save");

        assert_eq!(second[0].created_at, Some(at(100)));
        assert_eq!(store.load()[0].created_at, Some(at(100)));
    }

    #[test]
    fn test_save_stamps_only_missing_timestamps() {
        let (_, store) = memory_store();
        let mut old = Customer::new("old", "", "", "");
        old.created_at = Some(at(10));

        let saved = store
            .save_at(vec![Customer::new("new", "", "", ""), old], at(50))
            .expect("save");

        assert_eq!(saved[0].created_at, Some(at(50)));
        assert_eq!(saved[1].created_at, Some(at(10)));
    }

    #[test]
    fn test_load_sorts_newest_first_with_missing_last() {
        let (backend, store) = memory_store();
        backend.insert_raw(
            STORAGE_KEY,
            r#"[
                {"id":"none","city":"A"},
                {"id":"old","city":"B","createdAt":"2024-01-01T00:00:00Z"},
                {"id":"new","city":"C","createdAt":"2025-06-01T12:00:00Z"}
            ]"#,
        );

        let ids: Vec<String> = store
            .load()
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, ["new", "old", "none"]);
    }

    #[test]
    fn test_load_corrupt_blob_is_empty() {
        let (backend, store) = memory_store();
        backend.insert_raw(STORAGE_KEY, "{not json");
        assert!(store.load().is_empty());

        backend.insert_raw(STORAGE_KEY, r#"{"id":"1"}"#);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_absent_is_empty() {
        let (_, store) = memory_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_failed_save_keeps_previous_snapshot() {
        let backend = Arc::new(MemoryKeyValueStore::with_quota(200));
        let store = LocalStore::new(backend);
        store
            .save_at(vec![Customer::new("1", "", "", "")], at(1))
            .expect("small save");

        let big: Vec<Customer> = (0..50)
            .map(|i| Customer::new(i.to_string(), "Somebody", "Somewhere", "Taipei"))
            .collect();
        let result = store.save_at(big, at(2));

        assert!(matches!(result, Err(StoreError::QuotaExceeded { .. })));
        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_str(), "1");
    }

    #[test]
    fn test_clear_then_load_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(Arc::new(FileKeyValueStore::new(dir.path())));
        store
            .save(vec![Customer::new("1", "", "", "")])
            .expect("save");
        assert_eq!(store.load().len(), 1);

        store.clear().expect("clear");
        assert!(store.load().is_empty());
    }
}
