//! Telemetry Configuration Module
//!
//! TOML configuration for endpoints, window lengths, detection threshold,
//! retry policy, tick cadence and storage location.
//!
//! ## Loading Order
//!
//! 1. `PLUGIN_TELEMETRY_CONFIG` environment variable (path to TOML file)
//! 2. `telemetry.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded config is passed explicitly to `TelemetryCore::new`; there is no
//! process-global config.

mod telemetry_config;
pub mod defaults;
pub mod validation;

pub use telemetry_config::*;
