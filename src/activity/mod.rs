//! Signal activity: detection and windowed accumulation
//!
//! - **ActivityDetector**: RMS → dBFS threshold test over one processing block
//! - **ActivityAccumulator**: per-window active milliseconds, guarded for the
//!   real-time path, with a delivery high-water mark

pub mod accumulator;
pub mod detector;

pub use accumulator::{ActivityAccumulator, ActivityBuckets};
pub use detector::{block_duration_ms, rms, ActivityDetector};
