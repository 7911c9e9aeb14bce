//! Telemetry Configuration - endpoints, windows, detection and retry tuning
//!
//! Each struct implements `Default` with the values in [`super::defaults`],
//! so behavior is unchanged when no config file is present.

use super::defaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the telemetry core.
///
/// Load with `TelemetryConfig::load()` which searches:
/// 1. `$PLUGIN_TELEMETRY_CONFIG` env var
/// 2. `./telemetry.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub windows: WindowConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub plugin: PluginConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl TelemetryConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that fails to load or validate is logged and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded telemetry config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load telemetry config, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded telemetry config from ./{}", defaults::CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        info!("No telemetry config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check the config for values the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.api.base_url.trim().is_empty() {
            errors.push("api.base_url must not be empty".to_string());
        }
        if self.windows.activity_secs <= 0 {
            errors.push(format!(
                "windows.activity_secs ({}) must be > 0",
                self.windows.activity_secs
            ));
        }
        if self.windows.submission_secs <= 0 {
            errors.push(format!(
                "windows.submission_secs ({}) must be > 0",
                self.windows.submission_secs
            ));
        } else if self.windows.submission_secs < self.windows.activity_secs {
            errors.push(format!(
                "windows.submission_secs ({}) must be >= windows.activity_secs ({})",
                self.windows.submission_secs, self.windows.activity_secs
            ));
        }
        if self.detection.threshold_dbfs > 0.0 {
            errors.push(format!(
                "detection.threshold_dbfs ({:.1}) must be <= 0 dBFS",
                self.detection.threshold_dbfs
            ));
        }
        if self.detection.silence_floor_db >= self.detection.threshold_dbfs {
            errors.push(format!(
                "detection.silence_floor_db ({:.1}) must be below threshold_dbfs ({:.1})",
                self.detection.silence_floor_db, self.detection.threshold_dbfs
            ));
        }
        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be > 0".to_string());
        }
        if self.driver.tick_interval_ms == 0 {
            errors.push("driver.tick_interval_ms must be > 0".to_string());
        }
        if self.workers.pool_size == 0 {
            errors.push("workers.pool_size must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Collection API endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_submit_path")]
    pub submit_path: String,

    #[serde(default = "default_validate_path")]
    pub validate_path: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Transport timeout per request (seconds).
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String { defaults::API_BASE_URL.to_string() }
fn default_submit_path() -> String { defaults::SUBMIT_PATH.to_string() }
fn default_validate_path() -> String { defaults::VALIDATE_PATH.to_string() }
fn default_health_path() -> String { defaults::HEALTH_PATH.to_string() }
fn default_timeout_secs() -> u64 { defaults::HTTP_TIMEOUT_SECS }

impl ApiConfig {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn submit_url(&self) -> String {
        self.url(&self.submit_path)
    }

    pub fn validate_url(&self) -> String {
        self.url(&self.validate_path)
    }

    pub fn health_url(&self) -> String {
        self.url(&self.health_path)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            submit_path: default_submit_path(),
            validate_path: default_validate_path(),
            health_path: default_health_path(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Window lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Activity bucket length (seconds).
    #[serde(default = "default_activity_secs")]
    pub activity_secs: i64,

    /// Submission cadence (seconds).
    #[serde(default = "default_submission_secs")]
    pub submission_secs: i64,
}

fn default_activity_secs() -> i64 { defaults::ACTIVITY_WINDOW_SECS }
fn default_submission_secs() -> i64 { defaults::SUBMISSION_WINDOW_SECS }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            activity_secs: default_activity_secs(),
            submission_secs: default_submission_secs(),
        }
    }
}

/// Signal detection levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold_dbfs")]
    pub threshold_dbfs: f64,

    #[serde(default = "default_silence_floor_db")]
    pub silence_floor_db: f64,
}

fn default_threshold_dbfs() -> f64 { defaults::ACTIVITY_THRESHOLD_DBFS }
fn default_silence_floor_db() -> f64 { defaults::SILENCE_FLOOR_DB }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: default_threshold_dbfs(),
            silence_floor_db: default_silence_floor_db(),
        }
    }
}

/// Retry, backoff and jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_attempts() -> u32 { defaults::MAX_ATTEMPTS }
fn default_backoff_unit_ms() -> u64 { defaults::BACKOFF_UNIT_MS }
fn default_max_jitter_ms() -> u64 { defaults::MAX_JITTER_MS }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

/// Tick driver cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_idle_fallback_secs")]
    pub idle_fallback_secs: i64,
}

fn default_tick_interval_ms() -> u64 { defaults::TICK_INTERVAL_MS }
fn default_idle_fallback_secs() -> i64 { defaults::IDLE_FALLBACK_SECS }

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            idle_fallback_secs: default_idle_fallback_secs(),
        }
    }
}

/// Background worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_pool_size() -> usize { defaults::WORKER_POOL_SIZE }
fn default_shutdown_timeout_ms() -> u64 { defaults::SHUTDOWN_TIMEOUT_MS }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

/// Plugin identity reported to the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_plugin_version")]
    pub version: String,
}

fn default_plugin_version() -> String { defaults::PLUGIN_VERSION.to_string() }

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            version: default_plugin_version(),
        }
    }
}

/// Durable store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf { PathBuf::from(defaults::STORAGE_PATH) }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Config loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error ({0:?}): {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("config parse error ({0:?}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}
