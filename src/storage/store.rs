use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid stored JSON for {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Durable string storage, one value per key
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One file per key under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let value = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.root).map_err(io_err)?;

        // Write beside the target then rename, so readers never see half a record
        let tmp = self.root.join(format!(".{}.tmp", key));
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;

        debug!("Stored {} ({} bytes) at {}", key, value.len(), path.display());
        Ok(())
    }
}

/// Process-local store, used for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("session-levels-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = scratch_dir();
        let store = FileStore::new(&dir);

        assert_eq!(store.get("RIJA_TERMINAL_DATA_V1").unwrap(), None);
        store.set("RIJA_TERMINAL_DATA_V1", "{\"a\":1}").unwrap();
        store.set("RIJA_TERMINAL_DATA_V1", "{\"a\":2}").unwrap();
        assert_eq!(store.get("RIJA_TERMINAL_DATA_V1").unwrap().as_deref(), Some("{\"a\":2}"));
        assert!(!dir.join(".RIJA_TERMINAL_DATA_V1.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let store = FileStore::new(scratch_dir());
        assert!(matches!(store.get("../etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(store.set("", "x"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(store.set(".hidden", "x"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
