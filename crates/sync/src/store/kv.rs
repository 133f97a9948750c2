//! Key-value backends for the local snapshot.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::error::StoreError;

/// A durable, synchronous key-value slot store.
///
/// `set` must replace the value atomically: a concurrent or later `get`
/// observes either the previous value or the new one, never a mix.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the write fails or exceeds the quota.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be modified.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

fn check_quota(quota: Option<u64>, value: &str) -> Result<(), StoreError> {
    let needed = value.len() as u64;
    match quota {
        Some(limit) if needed > limit => Err(StoreError::QuotaExceeded { needed, limit }),
        _ => Ok(()),
    }
}

fn write_then_rename(tmp: &Path, target: &Path, value: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()?;
    fs::rename(tmp, target)
}

/// One file per key inside a data directory.
///
/// Writes go to a temporary sibling file that is flushed to disk and then
/// renamed over the key file, so readers never see a partial snapshot.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    quota: Option<u64>,
}

impl FileKeyValueStore {
    /// Store files under `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: None,
        }
    }

    /// Reject writes larger than `bytes`.
    #[must_use]
    pub const fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(self.quota, value)?;
        fs::create_dir_all(&self.dir)?;

        let target = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(e) = write_then_rename(&tmp, &target, value) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(path = %target.display(), bytes = value.len(), "Snapshot written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes larger than `bytes`.
    #[must_use]
    pub fn with_quota(bytes: u64) -> Self {
        Self {
            values: Mutex::default(),
            quota: Some(bytes),
        }
    }

    /// Put a raw value in place, bypassing the quota.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(self.quota, value)?;
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip_and_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyValueStore::new(dir.path().join("nested"));

        assert!(store.get("k").expect("get").is_none());

        store.set("k", "first").expect("set");
        store.set("k", "second").expect("overwrite");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("second"));

        store.remove("k").expect("remove");
        store.remove("k").expect("remove twice");
        assert!(store.get("k").expect("get").is_none());
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyValueStore::new(dir.path());
        store.set("snapshot", "[]").expect("set");

        let names: Vec<String> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["snapshot.json"]);
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let store = FileKeyValueStore::new("/data");
        assert_eq!(
            store.path_for("../escape/key"),
            PathBuf::from("/data/.._escape_key.json")
        );
    }

    #[test]
    fn test_file_store_quota_keeps_previous_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyValueStore::new(dir.path()).with_quota(4);

        store.set("k", "1234").expect("within quota");
        let result = store.set("k", "12345");

        assert!(matches!(
            result,
            Err(StoreError::QuotaExceeded {
                needed: 5,
                limit: 4
            })
        ));
        assert_eq!(store.get("k").expect("get").as_deref(), Some("1234"));
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryKeyValueStore::with_quota(2);
        assert!(store.set("k", "abc").is_err());
        assert!(store.get("k").expect("get").is_none());
        store.insert_raw("k", "bypass");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("bypass"));
    }
}
