//! sled-backed key/value store.
//!
//! Strings are stored as raw UTF-8, booleans as a single byte (`0`/`1`).
//! Every write is flushed before returning.

use super::{KeyValueStore, StorageError};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        tracing::info!("Preference storage opened at {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }

    fn get_raw(&self, key: &str) -> Result<Option<sled::IVec>, StorageError> {
        Ok(self.db.get(key.as_bytes())?)
    }
}

impl KeyValueStore for SledStore {
    fn get_string(&self, key: &str, default: &str) -> Result<String, StorageError> {
        match self.get_raw(key)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|_| StorageError::Encoding(key.to_string())),
            None => Ok(default.to_string()),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StorageError> {
        Ok(match self.get_raw(key)? {
            Some(bytes) if bytes.len() == 1 => bytes[0] != 0,
            _ => default,
        })
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db.insert(key.as_bytes(), value.as_bytes())?;
        self.flush()
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError> {
        self.db.insert(key.as_bytes(), &[u8::from(value)])?;
        self.flush()
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
