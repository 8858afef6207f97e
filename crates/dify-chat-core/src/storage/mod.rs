//! Key/value persistence for apps, conversations and the account.
//!
//! Values are JSON strings. Typed reads fail soft: a missing or corrupt
//! entry reads as the default value and is logged, so one damaged file never
//! locks the user out of the rest of their data.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::CoreError;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const APPS_KEY: &str = "dify_apps";
pub const CURRENT_APP_KEY: &str = "dify_current_app_id";
pub const CONVERSATIONS_KEY: &str = "dify_conversations";
pub const USER_KEY: &str = "dify_user";
pub const ACCOUNT_KEY: &str = "dify_account";

/// String key/value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// Shared store handle used by the repositories.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Where to keep local data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    /// Process-local; lost on exit.
    Memory,
    /// One JSON file per key under this directory.
    File(PathBuf),
}

impl StoreConfig {
    pub fn open(&self) -> Result<SharedStore, CoreError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryStore::new())),
            Self::File(dir) => Ok(Arc::new(FileStore::open(dir)?)),
        }
    }
}

/// Reads and decodes `key`, falling back to `T::default()` when the entry is
/// absent or does not decode.
pub fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<T, CoreError>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = store.get(key)? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "stored value does not decode; using default");
            Ok(T::default())
        }
    }
}

/// Encodes `value` and writes it under `key`.
pub fn save_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), CoreError>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|e| CoreError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_json_defaults_when_missing_or_corrupt() {
        let store = MemoryStore::new();
        let missing: Vec<String> = load_json(&store, APPS_KEY).unwrap();
        assert!(missing.is_empty());

        store.set(APPS_KEY, "{not json").unwrap();
        let corrupt: Vec<String> = load_json(&store, APPS_KEY).unwrap();
        assert!(corrupt.is_empty());
    }

    #[test]
    fn save_then_load_through_shared_handle() {
        let store = StoreConfig::Memory.open().unwrap();
        save_json(store.as_ref(), USER_KEY, &vec!["a", "b"]).unwrap();
        let back: Vec<String> = load_json(store.as_ref(), USER_KEY).unwrap();
        assert_eq!(back, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn file_config_opens_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreConfig::File(dir.path().join("data")).open().unwrap();
        store.set(CURRENT_APP_KEY, "\"a-1\"").unwrap();
        assert!(dir.path().join("data").join("dify_current_app_id.json").exists());
    }
}
