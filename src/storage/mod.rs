//! Persistent key/value storage
//!
//! The core persists a handful of small values across restarts: the session
//! key, per-key validity flags and the animation preference. Backends
//! implement [`KeyValueStore`]:
//! - [`SledStore`]: sled-backed, durable
//! - [`InMemoryStore`]: tests and `--offline` runs
//!
//! [`Preferences`] layers the typed keys on top of any backend.

pub mod preferences;
pub mod sled_store;

pub use preferences::Preferences;
pub use sled_store::SledStore;

use std::collections::HashMap;
use std::sync::RwLock;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("value for '{0}' is not valid UTF-8")]
    Encoding(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// String/bool key/value store.
///
/// Missing keys yield the caller's default. Implementations must be
/// thread-safe; validation jobs write from background workers.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str, default: &str) -> Result<String, StorageError>;

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StorageError>;

    fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError>;

    /// Make pending writes durable.
    fn flush(&self) -> Result<(), StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
enum StoredValue {
    Text(String),
    Flag(bool),
}

/// In-memory store. Not durable.
#[derive(Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryStore {
    fn get_string(&self, key: &str, default: &str) -> Result<String, StorageError> {
        let values = self.values.read().map_err(|_| StorageError::Poisoned)?;
        Ok(match values.get(key) {
            Some(StoredValue::Text(s)) => s.clone(),
            _ => default.to_string(),
        })
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StorageError> {
        let values = self.values.read().map_err(|_| StorageError::Poisoned)?;
        Ok(match values.get(key) {
            Some(StoredValue::Flag(b)) => *b,
            _ => default,
        })
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), StoredValue::Text(value.to_string()));
        Ok(())
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), StoredValue::Flag(value));
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
