use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::StorageError;

/// Local key-value storage owned by the visitor's client.
///
/// Mirrors the browser `localStorage` contract: string keys, string values,
/// synchronous access from a single UI thread.
pub trait ClientStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.read().map_err(|_| StorageError::Unavailable)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| StorageError::Unavailable)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| StorageError::Unavailable)?;
        items.remove(key);
        Ok(())
    }
}

/// Storage persisted as a single JSON object on disk.
///
/// Every operation re-reads the file so that two processes sharing the
/// path observe each other's writes.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(items)?;

        // Readers only ever see the old or the new file, never a partial one
        let staging = self.staging_path();
        fs::write(&staging, raw)?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ClientStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Unavailable)?;
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Unavailable)?;
        let mut items = self.read_all()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}

/// Storage that refuses every operation (private mode, quota exceeded).
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl ClientStorage for UnavailableStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("quiz-funnel-storage-{}", Uuid::new_v4()))
            .join("storage.json")
    }

    #[test]
    fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));

        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let path = temp_path();

        let storage = FileStorage::new(&path);
        storage.set_item("session", "abc").unwrap();
        storage.set_item("other", "1").unwrap();
        drop(storage);

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get_item("session").unwrap().as_deref(), Some("abc"));

        reopened.remove_item("other").unwrap();
        assert_eq!(reopened.get_item("other").unwrap(), None);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_storage_reports_corrupt_file() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.get_item("anything"),
            Err(StorageError::Corrupt(_))
        ));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_storage_replaces_file_whole() {
        let path = temp_path();
        let storage = FileStorage::new(&path);
        storage.set_item("session", "abc").unwrap();

        // leftover from an interrupted write
        let staging = storage.staging_path();
        fs::write(&staging, "{\"session\": \"trunc").unwrap();
        assert_eq!(storage.get_item("session").unwrap().as_deref(), Some("abc"));

        storage.set_item("session", "def").unwrap();
        assert!(!staging.exists());
        assert_eq!(
            FileStorage::new(&path).get_item("session").unwrap().as_deref(),
            Some("def")
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unavailable_storage_always_fails() {
        let storage = UnavailableStorage;
        assert!(storage.get_item("k").is_err());
        assert!(storage.set_item("k", "v").is_err());
        assert!(storage.remove_item("k").is_err());
    }
}
