//! Cart storage backends.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::domain::aggregates::{CartStorage, CartStorageError};

/// Process-local storage. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryCartStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl CartStorage for MemoryCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartStorageError> {
        let entries = self.entries.lock().map_err(|e| CartStorageError::Unavailable(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartStorageError> {
        let mut entries = self.entries.lock().map_err(|e| CartStorageError::Unavailable(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory owned by a single client.
#[derive(Clone, Debug)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    fn path_for(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}.json")) }
}

impl CartStorage for FileCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartStorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartStorageError> {
        fs::create_dir_all(&self.dir)?;
        // Atomic replace.
        let target = self.path_for(key);
        let staging = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&staging, value)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartStore, CART_STORAGE_KEY};
    use testresult::TestResult;

    #[test]
    fn memory_storage_clones_share_state() -> TestResult {
        let storage = MemoryCartStorage::default();
        let other = storage.clone();
        storage.save("k", "v")?;
        assert_eq!(other.load("k")?.as_deref(), Some("v"));
        assert_eq!(other.load("missing")?, None);
        Ok(())
    }

    #[test]
    fn file_storage_missing_key_is_none() -> TestResult {
        let dir = tempfile::tempdir()?;
        let storage = FileCartStorage::new(dir.path());
        assert_eq!(storage.load(CART_STORAGE_KEY)?, None);
        Ok(())
    }

    #[test]
    fn file_storage_survives_reopen() -> TestResult {
        let dir = tempfile::tempdir()?;
        let cart_dir = dir.path().join("nested");

        let mut store = CartStore::open(FileCartStorage::new(&cart_dir));
        store.add_item("cuenco-de-cuarzo", 2);
        store.update_coupon("cuenco-de-cuarzo", "AHORRO");
        drop(store);

        assert!(cart_dir.join("alma-natura-cart.json").exists());

        let reopened = CartStore::open(FileCartStorage::new(&cart_dir));
        assert_eq!(reopened.total_item_count(), 2);
        assert_eq!(reopened.lines()[0].coupon_code.as_deref(), Some("AHORRO"));
        Ok(())
    }

    #[test]
    fn file_storage_garbage_loads_empty_cart() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("alma-natura-cart.json"), "[{\"slug\": 3")?;
        let store = CartStore::open(FileCartStorage::new(dir.path()));
        assert!(store.cart().is_empty());
        Ok(())
    }
}
