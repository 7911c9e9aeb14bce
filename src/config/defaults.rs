//! System-wide default constants.
//!
//! Grouped by subsystem. Every `TelemetryConfig` default points at one of
//! these, so an absent config file reproduces this table exactly.

// ============================================================================
// Collection API
// ============================================================================

/// Production collection endpoint.
pub const API_BASE_URL: &str = "https://api.signalbash.com";

/// Activity submission path (`POST`).
pub const SUBMIT_PATH: &str = "/submit";

/// Session key validation path (`POST`).
pub const VALIDATE_PATH: &str = "/validate-session-key";

/// Health probe path (`GET`).
pub const HEALTH_PATH: &str = "/ping";

/// Transport-level ceiling for any single request (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Windows
// ============================================================================

/// Activity bucket length (seconds).
pub const ACTIVITY_WINDOW_SECS: i64 = 10;

/// Submission cadence (seconds). 120 = 2 minutes.
pub const SUBMISSION_WINDOW_SECS: i64 = 120;

// ============================================================================
// Detection
// ============================================================================

/// A block is active when any channel is at or above this level (dBFS).
pub const ACTIVITY_THRESHOLD_DBFS: f64 = -60.0;

/// Level reported for zero RMS (dB).
pub const SILENCE_FLOOR_DB: f64 = -196.0;

// ============================================================================
// Retry
// ============================================================================

/// Attempts per submission or health probe job.
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff unit: delay after attempt `n` is `n² × unit`.
pub const BACKOFF_UNIT_MS: u64 = 1_000;

/// Upper bound of the random delay before a scheduled submission (ms).
pub const MAX_JITTER_MS: u64 = 10_000;

// ============================================================================
// Driver & Workers
// ============================================================================

/// Tick period of the window driver (ms). 500 = 2 Hz.
pub const TICK_INTERVAL_MS: u64 = 500;

/// Submit pending activity once the host has not processed audio for this
/// long (seconds).
pub const IDLE_FALLBACK_SECS: i64 = 10;

/// Background worker threads when the core owns its runtime.
pub const WORKER_POOL_SIZE: usize = 2;

/// How long shutdown waits for in-flight jobs (ms).
pub const SHUTDOWN_TIMEOUT_MS: u64 = 100;

// ============================================================================
// Plugin & Storage
// ============================================================================

/// Version string reported to the collection API.
pub const PLUGIN_VERSION: &str = "1.1.0";

/// Default sled database path.
pub const STORAGE_PATH: &str = "./data/telemetry.sled";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PLUGIN_TELEMETRY_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "telemetry.toml";
