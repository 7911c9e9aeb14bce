//! Cross-thread flags.
//!
//! Each flag is an independent atomic cell. No invariant spans two of them,
//! so they are never grouped under a lock; the real-time path reads and
//! writes them without contention.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Reachability of the collection endpoint.
///
/// Written by the health monitor and by observed request outcomes; read by
/// the UI. Starts healthy until something says otherwise.
#[derive(Debug)]
pub struct Connectivity {
    healthy: AtomicBool,
}

impl Connectivity {
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
        }
    }

    pub fn mark_healthy(&self) {
        self.healthy.store(true, Ordering::Release);
    }

    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Sentinel for "never" in the timestamp/window cells below.
const NEVER: i64 = i64::MIN;

/// Flags touched by the real-time path.
#[derive(Debug)]
pub struct SignalFlags {
    signal_hot: AtomicBool,
    bypass: AtomicBool,
    /// Activity window of the most recent active block.
    last_hot_window: AtomicI64,
    /// Wall-clock millis of the most recent processed block.
    last_block_millis: AtomicI64,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self {
            signal_hot: AtomicBool::new(false),
            bypass: AtomicBool::new(false),
            last_hot_window: AtomicI64::new(NEVER),
            last_block_millis: AtomicI64::new(NEVER),
        }
    }

    pub fn is_signal_hot(&self) -> bool {
        self.signal_hot.load(Ordering::Acquire)
    }

    /// Mark signal detected in `window_id`.
    pub fn mark_hot(&self, window_id: i64) {
        self.last_hot_window.store(window_id, Ordering::Release);
        self.signal_hot.store(true, Ordering::Release);
    }

    pub fn clear_hot(&self) {
        self.signal_hot.store(false, Ordering::Release);
    }

    /// Clear `signal_hot` once more than one activity window has passed since
    /// the last detection. Returns true if the flag was cleared.
    pub fn debounce(&self, current_window: i64) -> bool {
        if !self.is_signal_hot() {
            return false;
        }
        let last = self.last_hot_window.load(Ordering::Acquire);
        if last == NEVER || current_window.saturating_sub(last) > 1 {
            self.clear_hot();
            return true;
        }
        false
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Acquire)
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Release);
    }

    pub fn touch_block(&self, now_millis: i64) {
        self.last_block_millis.store(now_millis, Ordering::Release);
    }

    /// Wall-clock millis of the last processed block, if any.
    pub fn last_block_millis(&self) -> Option<i64> {
        match self.last_block_millis.load(Ordering::Acquire) {
            NEVER => None,
            millis => Some(millis),
        }
    }
}

impl Default for SignalFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_defaults_healthy() {
        let c = Connectivity::default();
        assert!(c.is_healthy());
        c.mark_unhealthy();
        assert!(!c.is_healthy());
        c.mark_healthy();
        assert!(c.is_healthy());
    }

    #[test]
    fn test_debounce_waits_more_than_one_window() {
        let flags = SignalFlags::new();
        flags.mark_hot(50);

        assert!(!flags.debounce(50));
        assert!(!flags.debounce(51));
        assert!(flags.is_signal_hot());

        assert!(flags.debounce(52));
        assert!(!flags.is_signal_hot());
        assert!(!flags.debounce(53));
    }

    #[test]
    fn test_last_block_millis() {
        let flags = SignalFlags::new();
        assert_eq!(flags.last_block_millis(), None);
        flags.touch_block(1234);
        assert_eq!(flags.last_block_millis(), Some(1234));
    }
}
