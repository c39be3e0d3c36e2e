// src/storage.rs
//! Key-value persistence used by signer discovery.
//!
//! Three things are persisted: the previously selected extension wallet name
//! (for auto-reconnect), the explicit-logout marker, and the hosted session
//! token. Backends are pluggable through [`KeyValueStore`]; [`Store`] adds
//! store2-style namespacing (`"<namespace>.<key>"`) on top.

use crate::config::ConnectConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Un-namespaced key holding the last successfully connected extension wallet.
pub const PREFERRED_WALLET_KEY: &str = "preferredSuiWallet";
pub const SUI_NAMESPACE: &str = "sui";
/// Set under [`SUI_NAMESPACE`] when the user logged out explicitly.
pub const DISCONNECTED_KEY: &str = "disconnected";
pub const AUTH_NAMESPACE: &str = "auth";
pub const ACCESS_TOKEN_KEY: &str = "access_token";

const STORE_FILE_NAME: &str = "connect_store.json";

// Custom error type that implements Send
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StorageError(String);

impl From<String> for StorageError {
    fn from(s: String) -> Self {
        StorageError(s)
    }
}

impl From<&str> for StorageError {
    fn from(s: &str) -> Self {
        StorageError(s.to_string())
    }
}

/// Raw persistence backend. Implementations must be cheap to call from the
/// event loop; nothing here is async.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::from("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::from("memory store poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::from("memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

// Get the appropriate storage directory for the current platform
pub fn default_storage_dir() -> PathBuf {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(format!("{home_dir}/.signer_connect"))
}

/// JSON-object file store. Every write rewrites the whole file; the data set
/// is a handful of keys.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (and creates if needed) the store file inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        ensure_storage_dir(dir)?;
        Ok(Self {
            path: dir.join(STORE_FILE_NAME),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read {}: {}", self.path.display(), e))?;
        if data.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                log::warn!("Store file {} is not a JSON object, starting fresh", self.path.display());
                Ok(Map::new())
            }
            Err(e) => Err(format!("Failed to parse {}: {}", self.path.display(), e).into()),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
        let data = serde_json::to_string_pretty(map)
            .map_err(|e| format!("Failed to serialize store: {}", e))?;
        std::fs::write(&self.path, data)
            .map_err(|e| format!("Failed to write {}: {}", self.path.display(), e).into())
    }

    fn update<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.lock.lock().map_err(|_| StorageError::from("file store poisoned"))?;
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::from("file store poisoned"))?;
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

// Ensure storage directory exists with logging
fn ensure_storage_dir(dir: &Path) -> Result<(), StorageError> {
    log::debug!("Ensuring storage directory exists: {}", dir.display());
    std::fs::create_dir_all(dir).map_err(|e| {
        log::error!("❌ Failed to create storage directory {}: {}", dir.display(), e);
        StorageError::from(format!("Failed to create {}: {}", dir.display(), e))
    })
}

/// Browser `localStorage` backend. Values are stored as JSON text.
#[cfg(target_arch = "wasm32")]
pub struct LocalStorageStore;

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .ok_or_else(|| StorageError::from("no window"))?
            .local_storage()
            .map_err(|_| StorageError::from("localStorage unavailable"))?
            .ok_or_else(|| StorageError::from("localStorage unavailable"))
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let raw = Self::storage()?
            .get_item(key)
            .map_err(|_| StorageError::from(format!("Failed to read {}", key)))?;
        // Plain strings written by other code are kept as strings.
        Ok(raw.map(|s| serde_json::from_str(&s).unwrap_or(Value::String(s))))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        Self::storage()?
            .set_item(key, &value.to_string())
            .map_err(|_| StorageError::from(format!("Failed to write {}", key)))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        Self::storage()?
            .remove_item(key)
            .map_err(|_| StorageError::from(format!("Failed to remove {}", key)))
    }
}

/// Shareable, optionally namespaced handle over a backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KeyValueStore>,
    namespace: Option<String>,
}

impl Store {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend, namespace: None }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Platform default backend: `localStorage` in the browser, otherwise a
    /// file under `storage_dir` (or [`default_storage_dir`]).
    pub fn from_config(config: &ConnectConfig) -> Result<Self, StorageError> {
        #[cfg(target_arch = "wasm32")]
        {
            let _ = config;
            Ok(Self::new(Arc::new(LocalStorageStore)))
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let dir = config
                .storage_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(default_storage_dir);
            log::debug!("Using file store in {}", dir.display());
            Ok(Self::new(Arc::new(FileStore::open(dir)?)))
        }
    }

    pub fn namespace(&self, namespace: &str) -> Store {
        let namespace = match &self.namespace {
            Some(parent) => format!("{parent}.{namespace}"),
            None => namespace.to_string(),
        };
        Store {
            backend: Arc::clone(&self.backend),
            namespace: Some(namespace),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{key}"),
            None => key.to_string(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(&self.full_key(key))? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| format!("Invalid value for {}: {}", self.full_key(key), e).into()),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)
            .map_err(|e| format!("Failed to serialize {}: {}", self.full_key(key), e))?;
        self.backend.set(&self.full_key(key), value)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(&self.full_key(key))
    }

    /// Missing and unreadable flags both read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get::<bool>(key).ok().flatten().unwrap_or(false)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("namespace", &self.namespace).finish()
    }
}
