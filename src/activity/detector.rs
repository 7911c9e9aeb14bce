//! Block-level signal detection.
//!
//! A processing block counts as active when any input channel's RMS level is
//! at or above the threshold (in dBFS). Scanning stops at the first channel
//! that crosses.

use crate::config::DetectionConfig;

/// Decides whether an audio block carries signal.
#[derive(Debug, Clone, Copy)]
pub struct ActivityDetector {
    threshold_dbfs: f64,
    silence_floor_db: f64,
}

impl ActivityDetector {
    pub fn new(threshold_dbfs: f64, silence_floor_db: f64) -> Self {
        Self {
            threshold_dbfs,
            silence_floor_db,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.threshold_dbfs, config.silence_floor_db)
    }

    /// Convert an RMS magnitude to decibels, clamping silence to the floor.
    pub fn rms_to_db(&self, rms: f64) -> f64 {
        if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            self.silence_floor_db
        }
    }

    /// True if any channel's level is at or above the threshold.
    pub fn is_active<C: AsRef<[f32]>>(&self, channels: &[C]) -> bool {
        channels
            .iter()
            .any(|channel| self.rms_to_db(rms(channel.as_ref())) >= self.threshold_dbfs)
    }

    pub fn threshold_dbfs(&self) -> f64 {
        self.threshold_dbfs
    }
}

impl Default for ActivityDetector {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

/// Root-mean-square magnitude of a block of samples.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Duration of a block in whole milliseconds (truncated).
pub fn block_duration_ms(sample_count: usize, sample_rate: f64) -> u64 {
    if sample_rate <= 0.0 || !sample_rate.is_finite() {
        return 0;
    }
    (sample_count as f64 / sample_rate * 1000.0) as u64
}
