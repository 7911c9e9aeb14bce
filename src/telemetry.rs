//! Telemetry core (`TelemetryCore`)
//!
//! [`TelemetryCore`] owns every component and exposes the three surfaces the
//! plugin talks to:
//!
//! - **Real-time**: [`TelemetryCore::process_block`], called once per audio
//!   block. Lock-free reads plus one `try_lock`; no I/O, no logging.
//! - **Driver**: [`TelemetryCore::tick`], called at a low fixed rate (spawned
//!   by [`TelemetryCore::start`]). Advances both window trackers, seals the
//!   running activity window, debounces `signal_hot` and enqueues commits.
//! - **UI**: [`TelemetryCore::snapshot`] plus the action entry points.
//!
//! Background jobs hold only weak references to the shared state, so
//! dropping the core stops them at their next liveness check.

use crate::activity::{block_duration_ms, ActivityAccumulator, ActivityDetector};
use crate::background::{spawn_driver, ConnectionHealthMonitor, Tick, WorkerPool};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, TelemetryConfig};
use crate::host::HostInfo;
use crate::session::{SessionDeps, SessionKeyLifecycle, SessionState};
use crate::state::{Connectivity, SignalFlags};
use crate::storage::{KeyValueStore, Preferences, SledStore, StorageError};
use crate::submission::{
    CommitDecision, DeduplicationId, EngineDeps, RetryPolicy, SubmissionEngine, SubmissionStats,
};
use crate::transport::{HttpClient, ReqwestClient, TransportError};
use crate::window::{TimeWindowTracker, Window, WindowError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

// ============================================================================
// Errors
// ============================================================================

/// Errors constructing or configuring the core. Nothing after construction
/// is fatal; network failures only show up in the snapshot flags.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("window setup failed: {0}")]
    Window(#[from] WindowError),
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("HTTP client setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("no tokio runtime available; use TelemetryCore::with_owned_runtime")]
    NoRuntime,
}

// ============================================================================
// Dependencies & Snapshot
// ============================================================================

/// External collaborators injected into the core.
pub struct CoreDeps {
    pub client: Arc<dyn HttpClient>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub host: HostInfo,
    /// Fixed for tests; generated once per process otherwise.
    pub dedup_id: Option<DeduplicationId>,
}

impl CoreDeps {
    /// reqwest transport, sled store at `config.storage.path`, system clock.
    pub fn production(config: &TelemetryConfig, host: HostInfo) -> Result<Self, TelemetryError> {
        let client = ReqwestClient::new(Duration::from_secs(config.api.request_timeout_secs))?;
        let store = SledStore::open(&config.storage.path)?;
        Ok(Self {
            client: Arc::new(client),
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            host,
            dedup_id: None,
        })
    }
}

/// Read-only view for the editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Progress through the current submission window (0..100).
    pub window_progress_percent: f64,
    pub connection_healthy: bool,
    pub session_validated: bool,
    pub session_invalid: bool,
    /// Active blocks since the last confirmed delivery.
    pub pending_activity: u64,
    /// Active milliseconds not yet confirmed delivered.
    pub unsent_ms: u64,
    pub host_display_name: String,
    pub signal_hot: bool,
    pub animation_enabled: bool,
    pub bypassed: bool,
}

// ============================================================================
// Core
// ============================================================================

struct CoreShared {
    config: TelemetryConfig,
    clock: Arc<dyn Clock>,
    activity_window: TimeWindowTracker,
    submission_window: TimeWindowTracker,
    detector: ActivityDetector,
    accumulator: Arc<ActivityAccumulator>,
    signal: SignalFlags,
    connectivity: Arc<Connectivity>,
    health: ConnectionHealthMonitor,
    session: SessionKeyLifecycle,
    engine: SubmissionEngine,
    prefs: Preferences,
    animation_enabled: AtomicBool,
    host: HostInfo,
    pool: Arc<WorkerPool>,
    /// Wall-clock millis of the last commit the driver enqueued.
    last_commit_millis: AtomicI64,
}

pub struct TelemetryCore {
    shared: Arc<CoreShared>,
}

impl TelemetryCore {
    /// Build the core on the current tokio runtime.
    pub fn new(config: TelemetryConfig, deps: CoreDeps) -> Result<Self, TelemetryError> {
        let handle = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;
        let pool = WorkerPool::from_handle(handle, config.workers.pool_size);
        Self::with_pool(config, deps, pool)
    }

    /// Build the core with a dedicated worker runtime, for hosts without one.
    pub fn with_owned_runtime(config: TelemetryConfig, deps: CoreDeps) -> Result<Self, TelemetryError> {
        let pool = WorkerPool::with_owned_runtime(config.workers.pool_size)?;
        Self::with_pool(config, deps, pool)
    }

    fn with_pool(config: TelemetryConfig, deps: CoreDeps, pool: WorkerPool) -> Result<Self, TelemetryError> {
        config.validate()?;

        let CoreDeps {
            client,
            store,
            clock,
            host,
            dedup_id,
        } = deps;
        let pool = Arc::new(pool);
        let retry = RetryPolicy::from_config(&config.retry);

        let activity_window = TimeWindowTracker::new(config.windows.activity_secs, Arc::clone(&clock))?;
        let submission_window = TimeWindowTracker::new(config.windows.submission_secs, Arc::clone(&clock))?;
        let accumulator = Arc::new(ActivityAccumulator::new(activity_window.current_window_id()));
        let connectivity = Arc::new(Connectivity::default());

        let health = ConnectionHealthMonitor::new(
            Arc::clone(&client),
            Arc::clone(&connectivity),
            Arc::clone(&pool),
            config.api.health_url(),
            retry,
        );

        let prefs = Preferences::new(store);
        let animation_enabled = prefs.animation_enabled()?;

        let session = SessionKeyLifecycle::load(
            prefs.clone(),
            SessionDeps {
                client: Arc::clone(&client),
                connectivity: Arc::clone(&connectivity),
                health: health.clone(),
                pool: Arc::clone(&pool),
                validate_url: config.api.validate_url(),
                plugin_version: config.plugin.version.clone(),
                user_agent: host.user_agent().to_string(),
            },
        )?;

        let dedup_id = dedup_id.unwrap_or_else(DeduplicationId::from_entropy);
        let engine = SubmissionEngine::new(EngineDeps {
            client,
            accumulator: Arc::clone(&accumulator),
            connectivity: Arc::clone(&connectivity),
            session: session.clone(),
            health: health.clone(),
            pool: Arc::clone(&pool),
            host: host.clone(),
            submit_url: config.api.submit_url(),
            plugin_version: config.plugin.version.clone(),
            retry,
            dedup_id,
        });

        info!(
            host = host.display_name(),
            storage = prefs.backend_name(),
            dd_id = %engine.dedup_id(),
            session = %session.state(),
            "[Core] Telemetry core initialized"
        );

        Ok(Self {
            shared: Arc::new(CoreShared {
                detector: ActivityDetector::from_config(&config.detection),
                config,
                clock,
                activity_window,
                submission_window,
                accumulator,
                signal: SignalFlags::new(),
                connectivity,
                health,
                session,
                engine,
                prefs,
                animation_enabled: AtomicBool::new(animation_enabled),
                host,
                pool,
                last_commit_millis: AtomicI64::new(i64::MIN),
            }),
        })
    }

    /// Start the tick driver, probe connectivity and validate a stored
    /// unvalidated key.
    pub fn start(&self) -> bool {
        let shared = &self.shared;
        let period = Duration::from_millis(shared.config.driver.tick_interval_ms);
        if !spawn_driver(&shared.pool, Arc::downgrade(shared), period) {
            return false;
        }
        shared.health.probe();
        shared.session.validate();
        info!(
            tick_ms = shared.config.driver.tick_interval_ms,
            "[Core] Background services started"
        );
        true
    }

    // ------------------------------------------------------------------------
    // Real-time path
    // ------------------------------------------------------------------------

    /// Observe one audio block. Returns true if the block counted as active.
    pub fn process_block<C: AsRef<[f32]>>(&self, channels: &[C], sample_rate: f64) -> bool {
        let shared = &self.shared;
        let now = shared.clock.now_millis();
        shared.signal.touch_block(now);

        if shared.signal.is_bypassed() {
            shared.signal.clear_hot();
            return false;
        }
        if !shared.detector.is_active(channels) {
            return false;
        }

        let sample_count = channels.first().map_or(0, |c| c.as_ref().len());
        let window_id = Window::containing(now, shared.activity_window.length_secs())
            .id
            .max(shared.activity_window.current_window_id());
        shared
            .accumulator
            .record_activity(window_id, block_duration_ms(sample_count, sample_rate));
        shared.signal.mark_hot(window_id);
        true
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.shared.signal.set_bypass(bypass);
        if bypass {
            self.shared.signal.clear_hot();
        }
    }

    // ------------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------------

    /// One driver step. Never blocks on I/O.
    pub fn tick(&self) {
        self.shared.run_tick();
    }

    // ------------------------------------------------------------------------
    // UI surface
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let shared = &self.shared;
        TelemetrySnapshot {
            window_progress_percent: shared.submission_window.progress_within_window(),
            connection_healthy: shared.connectivity.is_healthy(),
            session_validated: shared.session.is_validated(),
            session_invalid: shared.session.is_invalid(),
            pending_activity: shared.accumulator.pending_blocks(),
            unsent_ms: shared.accumulator.unsent_ms(),
            host_display_name: shared.host.display_name().to_string(),
            signal_hot: shared.signal.is_signal_hot(),
            animation_enabled: shared.animation_enabled.load(Ordering::Acquire),
            bypassed: shared.signal.is_bypassed(),
        }
    }

    pub fn set_session_key(&self, key: &str) -> Result<SessionState, TelemetryError> {
        Ok(self.shared.session.set_session_key(key)?)
    }

    /// Retry validation of the current key (UI "retry" action).
    pub fn validate_session_key(&self) -> bool {
        self.shared.session.validate()
    }

    /// Submit everything sealed so far, without jitter.
    pub fn flush_accumulator(&self) -> CommitDecision {
        let shared = &self.shared;
        shared.accumulator.roll_over(shared.activity_window.current_window_id());
        shared.engine.commit(true)
    }

    pub fn toggle_animation(&self, enabled: bool) -> Result<(), TelemetryError> {
        self.shared.prefs.set_animation_enabled(enabled)?;
        self.shared.animation_enabled.store(enabled, Ordering::Release);
        debug!(enabled, "[Core] Animation preference changed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn session_state(&self) -> SessionState {
        self.shared.session.state()
    }

    pub fn session_key(&self) -> Arc<String> {
        self.shared.session.key()
    }

    pub fn accumulator(&self) -> &ActivityAccumulator {
        &self.shared.accumulator
    }

    pub fn submission_stats(&self) -> SubmissionStats {
        self.shared.engine.stats()
    }

    pub fn dedup_id(&self) -> &DeduplicationId {
        self.shared.engine.dedup_id()
    }

    pub fn host(&self) -> &HostInfo {
        &self.shared.host
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.shared.config
    }

    pub fn current_activity_window(&self) -> i64 {
        self.shared.activity_window.current_window_id()
    }

    pub fn current_submission_window(&self) -> i64 {
        self.shared.submission_window.current_window_id()
    }

    /// Wait for all queued background jobs (tests, orderly flush).
    pub async fn wait_idle(&self) {
        self.shared.pool.wait_idle().await;
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Cancel pending jobs, wait for them up to the configured timeout, then
    /// flush storage.
    pub async fn shutdown(&self) {
        let timeout = Duration::from_millis(self.shared.config.workers.shutdown_timeout_ms);
        let clean = self.shared.pool.shutdown(timeout).await;
        self.shared.flush_store();
        info!(clean, "[Core] Telemetry core shut down");
    }

    /// Blocking variant of [`TelemetryCore::shutdown`] for non-async owners.
    /// Must not be called from inside an async context.
    pub fn shutdown_blocking(&self) {
        let timeout = Duration::from_millis(self.shared.config.workers.shutdown_timeout_ms);
        let clean = self.shared.pool.shutdown_blocking(timeout);
        self.shared.flush_store();
        info!(clean, "[Core] Telemetry core shut down");
    }
}

impl CoreShared {
    fn run_tick(&self) {
        let now = self.clock.now_millis();
        self.activity_window.advance();
        let submission_rollover = self.submission_window.advance();

        let activity_id = self.activity_window.current_window_id();
        self.accumulator.roll_over(activity_id);
        self.signal.debounce(activity_id);

        if let Some(window) = submission_rollover {
            debug!(window_id = window.id, "[Core] Submission window rolled over");
            self.last_commit_millis.store(now, Ordering::Release);
            self.engine.commit(false);
            return;
        }

        if self.idle_fallback_due(now) {
            info!("[Core] No audio processed recently, submitting pending activity");
            self.last_commit_millis.store(now, Ordering::Release);
            self.engine.commit(false);
        }
    }

    /// Pending activity newer than the last commit, and the host has stopped
    /// calling the processing path.
    fn idle_fallback_due(&self, now: i64) -> bool {
        if self.accumulator.pending_blocks() == 0 {
            return false;
        }
        let Some(last_block) = self.signal.last_block_millis() else {
            return false;
        };
        let idle_ms = self.config.driver.idle_fallback_secs.saturating_mul(1000);
        now.saturating_sub(last_block) > idle_ms
            && last_block > self.last_commit_millis.load(Ordering::Acquire)
    }

    fn flush_store(&self) {
        if let Err(e) = self.prefs.flush() {
            warn!(error = %e, "[Core] Failed to flush preference storage");
        }
    }
}

impl Tick for CoreShared {
    fn tick(&self) {
        self.run_tick();
    }
}
