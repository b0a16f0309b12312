use std::path::Path;
use std::sync::Arc;

use ims_kv::{KVError, KVStore, MemoryStore, RedbStore};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

/// Durable storage keys.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER: &str = "user";
    pub const PERMISSIONS: &str = "permissions";
    pub const DARK_MODE: &str = "darkMode";
    pub const SELECTED: &str = "selected";
    pub const PAGE: &str = "page";
}

/// String-keyed durable storage shared by the console services.
///
/// Values are UTF-8 strings; the JSON helpers encode structured values.
/// Reads never fail: unreadable or corrupt entries are logged and treated
/// as absent.
#[derive(Clone)]
pub struct LocalStorage {
    kv: Arc<dyn KVStore>,
}

impl LocalStorage {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    pub fn open(path: &Path) -> Result<Self, KVError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KVError::Storage(e.to_string()))?;
        }
        Ok(Self::new(Arc::new(RedbStore::open(path)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        let bytes = match self.kv.get(key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(key, "storage read failed: {}", e);
                return None;
            }
        };
        match String::from_utf8(bytes) {
            Ok(s) => Some(s),
            Err(_) => {
                warn!(key, "stored value is not UTF-8, ignoring");
                None
            }
        }
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), KVError> {
        self.kv.set(key, value.as_bytes())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_string(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, "corrupt stored JSON, ignoring: {}", e);
                None
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), KVError> {
        let raw = serde_json::to_string(value).map_err(|e| KVError::Serialization(e.to_string()))?;
        self.set_string(key, &raw)
    }

    pub fn remove(&self, keys: &[&str]) -> Result<(), KVError> {
        self.kv.batch_delete(keys)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.kv.contains(key).unwrap_or(false)
    }
}
