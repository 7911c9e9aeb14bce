//! Typed access to the persisted preference keys.

use super::{KeyValueStore, StorageError};
use std::sync::Arc;

pub const SESSION_KEY: &str = "sessionKey";
pub const ANIMATION_ENABLED: &str = "animationEnabled";

/// Storage key for the cached validity of `session_key`.
///
/// Validity is cached per key, so switching back to a known-good key skips
/// revalidation.
pub fn validity_key(session_key: &str) -> String {
    format!("{}_validity", session_key.to_uppercase())
}

#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn session_key(&self) -> Result<String, StorageError> {
        self.store.get_string(SESSION_KEY, "")
    }

    pub fn set_session_key(&self, key: &str) -> Result<(), StorageError> {
        self.store.set_string(SESSION_KEY, key)
    }

    /// Whether `session_key` was previously confirmed valid by the server.
    pub fn is_known_valid(&self, session_key: &str) -> Result<bool, StorageError> {
        if session_key.is_empty() {
            return Ok(false);
        }
        self.store.get_bool(&validity_key(session_key), false)
    }

    pub fn remember_valid(&self, session_key: &str) -> Result<(), StorageError> {
        self.store.set_bool(&validity_key(session_key), true)
    }

    pub fn animation_enabled(&self) -> Result<bool, StorageError> {
        self.store.get_bool(ANIMATION_ENABLED, true)
    }

    pub fn set_animation_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        self.store.set_bool(ANIMATION_ENABLED, enabled)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.store.flush()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}
