//! Session Key Lifecycle
//!
//! Owns the account session key and its validity:
//!
//! ```text
//! Empty ──set──► Unvalidated ──200──► Valid
//!                     │
//!                     └─────404─────► Invalid
//! ```
//!
//! Setting a key persists it at once. A key previously confirmed valid (the
//! `<UPPER>_validity` flag) goes straight to `Valid`; any other key becomes
//! `Unvalidated` and a single validation round-trip is enqueued. There is no
//! retry loop here: the UI's retry action calls [`SessionKeyLifecycle::validate`]
//! again.
//!
//! The key lives in an `ArcSwap` and the flags are independent atomics, so
//! readers on any thread never take a lock. Writers (key changes and
//! validation responses) serialize on a small transition mutex so a response
//! is only applied while its key is still current.

use crate::background::{ConnectionHealthMonitor, WorkerPool};
use crate::state::Connectivity;
use crate::storage::{Preferences, StorageError};
use crate::submission::payload::ValidateRequest;
use crate::transport::{HttpClient, HttpRequest};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Unvalidated,
    Valid,
    Invalid,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Empty => write!(f, "EMPTY"),
            SessionState::Unvalidated => write!(f, "UNVALIDATED"),
            SessionState::Valid => write!(f, "VALID"),
            SessionState::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Everything a validation job needs besides the lifecycle itself.
pub struct SessionDeps {
    pub client: Arc<dyn HttpClient>,
    pub connectivity: Arc<Connectivity>,
    pub health: ConnectionHealthMonitor,
    pub pool: Arc<WorkerPool>,
    pub validate_url: String,
    pub plugin_version: String,
    pub user_agent: String,
}

struct SessionInner {
    key: ArcSwap<String>,
    validated: AtomicBool,
    known_invalid: AtomicBool,
    prefs: Preferences,
    deps: SessionDeps,
    validations_sent: AtomicU64,
    /// Held across every key-check-then-flag-update.
    transition: Mutex<()>,
}

impl SessionInner {
    fn begin_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
pub struct SessionKeyLifecycle {
    inner: Arc<SessionInner>,
}

impl SessionKeyLifecycle {
    /// Restore the stored key and its cached validity.
    pub fn load(prefs: Preferences, deps: SessionDeps) -> Result<Self, StorageError> {
        let key = prefs.session_key()?;
        let validated = prefs.is_known_valid(&key)?;
        debug!(
            has_key = !key.is_empty(),
            validated, "[Session] Loaded session key from storage"
        );
        Ok(Self {
            inner: Arc::new(SessionInner {
                key: ArcSwap::from_pointee(key),
                validated: AtomicBool::new(validated),
                known_invalid: AtomicBool::new(false),
                prefs,
                deps,
                validations_sent: AtomicU64::new(0),
                transition: Mutex::new(()),
            }),
        })
    }

    pub fn key(&self) -> Arc<String> {
        self.inner.key.load_full()
    }

    pub fn state(&self) -> SessionState {
        if self.inner.key.load().is_empty() {
            SessionState::Empty
        } else if self.inner.validated.load(Ordering::Acquire) {
            SessionState::Valid
        } else if self.inner.known_invalid.load(Ordering::Acquire) {
            SessionState::Invalid
        } else {
            SessionState::Unvalidated
        }
    }

    /// Key is set and its validity is no longer ambiguous.
    pub fn is_validated(&self) -> bool {
        !self.inner.key.load().is_empty()
            && (self.inner.validated.load(Ordering::Acquire)
                || self.inner.known_invalid.load(Ordering::Acquire))
    }

    pub fn is_valid(&self) -> bool {
        self.state() == SessionState::Valid
    }

    pub fn is_invalid(&self) -> bool {
        self.state() == SessionState::Invalid
    }

    /// Validation requests sent since construction.
    pub fn validations_sent(&self) -> u64 {
        self.inner.validations_sent.load(Ordering::Relaxed)
    }

    /// Store `key` and move to `Valid` or `Unvalidated`.
    ///
    /// An unknown key triggers a validation job.
    pub fn set_session_key(&self, key: &str) -> Result<SessionState, StorageError> {
        let inner = &self.inner;
        {
            let _transition = inner.begin_transition();
            inner.prefs.set_session_key(key)?;

            // Flags first: the new key must never be read with the old key's
            // validity.
            inner.validated.store(false, Ordering::Release);
            inner.known_invalid.store(false, Ordering::Release);
            inner.key.store(Arc::new(key.to_string()));

            if inner.prefs.is_known_valid(key)? {
                inner.validated.store(true, Ordering::Release);
                info!("[Session] Session key previously validated");
                return Ok(SessionState::Valid);
            }
        }

        if key.is_empty() {
            return Ok(SessionState::Empty);
        }
        self.validate();
        Ok(SessionState::Unvalidated)
    }

    /// Enqueue one validation round-trip for the current key.
    ///
    /// No-op (returns false) when the key is empty or already valid.
    pub fn validate(&self) -> bool {
        let key = self.key();
        if key.is_empty() || self.inner.validated.load(Ordering::Acquire) {
            return false;
        }

        let deps = &self.inner.deps;
        let body = ValidateRequest {
            plugin_version: deps.plugin_version.clone(),
            session_key: key.to_string(),
        };
        let body = match serde_json::to_value(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "[Session] Failed to encode validation request");
                return false;
            }
        };
        let request = HttpRequest::post_json(deps.validate_url.clone(), body)
            .header("User-Agent", deps.user_agent.clone());
        let client = Arc::clone(&deps.client);
        let weak = Arc::downgrade(&self.inner);

        let spawned = deps.pool.spawn("validate_session_key", async move {
            let resp = client.execute(request).await;
            apply_validation(&weak, &key, resp.status, resp.lost_connectivity());
        });
        if spawned {
            self.inner.validations_sent.fetch_add(1, Ordering::Relaxed);
        }
        spawned
    }
}

fn apply_validation(weak: &Weak<SessionInner>, key: &str, status: u16, lost_connectivity: bool) {
    let Some(inner) = weak.upgrade() else {
        debug!("[Session] Owner gone, dropping validation response");
        return;
    };
    let _transition = inner.begin_transition();
    if inner.key.load().as_str() != key {
        debug!(status, "[Session] Key changed during validation, ignoring response");
        return;
    }

    match status {
        200 => {
            inner.known_invalid.store(false, Ordering::Release);
            inner.validated.store(true, Ordering::Release);
            if let Err(e) = inner.prefs.remember_valid(key) {
                warn!(error = %e, "[Session] Failed to persist key validity");
            }
            inner.deps.connectivity.mark_healthy();
            info!("[Session] Session key validated");
        }
        404 => {
            inner.validated.store(false, Ordering::Release);
            inner.known_invalid.store(true, Ordering::Release);
            inner.deps.connectivity.mark_healthy();
            warn!("[Session] Session key rejected by server");
        }
        429 => {
            inner.deps.connectivity.mark_healthy();
            warn!("[Session] Validation rate limited");
        }
        0 => {
            inner.deps.connectivity.mark_unhealthy();
            warn!(lost_connectivity, "[Session] Validation transport failure");
            inner.deps.health.probe();
        }
        other => {
            warn!(status = other, "[Session] Unexpected validation response");
        }
    }
}
