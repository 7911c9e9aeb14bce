//! Plugin Telemetry: usage telemetry core for an audio plugin
//!
//! Detects when the plugin is processing signal, accumulates active time
//! into fixed wall-clock windows and reports those windows to a collection
//! API, while tracking session key validity and endpoint reachability.
//!
//! ## Architecture
//!
//! - **Time Window Tracker**: wall clock → window id and progress
//! - **Activity Accumulator**: per-window active milliseconds, real-time safe
//! - **Connection Health Monitor**: background reachability probes
//! - **Session Key Lifecycle**: key storage and validation state machine
//! - **Submission Engine**: snapshot, submit with retry/backoff, prune on success
//!
//! [`TelemetryCore`] wires them together behind a real-time entry point, a
//! low-rate tick and a read-only UI snapshot.

pub mod activity;
pub mod background;
pub mod clock;
pub mod config;
pub mod host;
pub mod session;
pub mod state;
pub mod storage;
pub mod submission;
pub mod telemetry;
pub mod transport;
pub mod window;

// Re-export the core surface
pub use telemetry::{CoreDeps, TelemetryCore, TelemetryError, TelemetrySnapshot};

// Re-export configuration
pub use config::TelemetryConfig;

// Re-export components
pub use activity::{ActivityAccumulator, ActivityBuckets, ActivityDetector};
pub use background::{ConnectionHealthMonitor, WorkerPool};
pub use clock::{Clock, ManualClock, SystemClock};
pub use host::HostInfo;
pub use session::{SessionKeyLifecycle, SessionState};
pub use storage::{InMemoryStore, KeyValueStore, Preferences, SledStore, StorageError};
pub use submission::{CommitDecision, DeduplicationId, RetryPolicy, SubmissionEngine, SubmissionStats};
pub use transport::{HttpClient, HttpRequest, HttpResponse, ReqwestClient, ScriptedHttpClient, TransportError};
pub use window::{TimeWindowTracker, Window, WindowError};
