//! Time Window Tracker
//!
//! Converts wall-clock time into fixed-length, wall-clock-aligned windows:
//! `window_id = floor(unix_seconds / length)`. The tracker is advanced by the
//! tick driver and read lock-free by the real-time path, so its state lives in
//! atomics.

use crate::clock::Clock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A fixed-length time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Window {
    pub id: i64,
    /// Start of the window in Unix seconds (`id * length`).
    pub start_secs: i64,
}

impl Window {
    /// The window of `length_secs` containing the given instant.
    pub fn containing(now_millis: i64, length_secs: i64) -> Self {
        let length_ms = length_secs * 1000;
        let id = now_millis.div_euclid(length_ms);
        Self {
            id,
            start_secs: id * length_secs,
        }
    }
}

/// Window construction errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window length must be > 0 seconds (got {0})")]
    NonPositiveLength(i64),
}

/// Tracks the current window and progress within it.
pub struct TimeWindowTracker {
    length_secs: i64,
    clock: Arc<dyn Clock>,
    window_id: AtomicI64,
    remainder_ms: AtomicI64,
}

impl TimeWindowTracker {
    /// Create a tracker for windows of `length_secs` and position it at "now".
    pub fn new(length_secs: i64, clock: Arc<dyn Clock>) -> Result<Self, WindowError> {
        if length_secs <= 0 {
            return Err(WindowError::NonPositiveLength(length_secs));
        }

        let tracker = Self {
            length_secs,
            clock,
            window_id: AtomicI64::new(i64::MIN),
            remainder_ms: AtomicI64::new(0),
        };
        tracker.advance();
        Ok(tracker)
    }

    /// Recompute the window from the clock.
    ///
    /// Returns the new window when the id changed since the last call. The id
    /// never moves backwards: a clock stepping back keeps the previous window.
    pub fn advance(&self) -> Option<Window> {
        let now = self.clock.now_millis();
        let length_ms = self.length_secs * 1000;
        let id = now.div_euclid(length_ms);
        self.remainder_ms
            .store(now.rem_euclid(length_ms), Ordering::Relaxed);

        let previous = self.window_id.fetch_max(id, Ordering::AcqRel);
        if id > previous {
            Some(Window {
                id,
                start_secs: id * self.length_secs,
            })
        } else {
            None
        }
    }

    pub fn current_window_id(&self) -> i64 {
        self.window_id.load(Ordering::Acquire)
    }

    /// Start of the current window in Unix seconds.
    pub fn current_window_start(&self) -> i64 {
        self.current_window_id() * self.length_secs
    }

    pub fn current_window(&self) -> Window {
        let id = self.current_window_id();
        Window {
            id,
            start_secs: id * self.length_secs,
        }
    }

    /// Percentage (0.0..100.0) of the current window that has elapsed.
    pub fn progress_within_window(&self) -> f64 {
        let remainder = self.remainder_ms.load(Ordering::Relaxed) as f64;
        100.0 * remainder / (self.length_secs * 1000) as f64
    }

    pub fn length_secs(&self) -> i64 {
        self.length_secs
    }
}

impl std::fmt::Debug for TimeWindowTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowTracker")
            .field("length_secs", &self.length_secs)
            .field("window_id", &self.current_window_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker(length: i64, clock: &Arc<ManualClock>) -> TimeWindowTracker {
        TimeWindowTracker::new(length, Arc::clone(clock) as Arc<dyn Clock>).unwrap()
    }

    #[test]
    fn test_rejects_zero_and_negative_length() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_secs(0));
        assert_eq!(
            TimeWindowTracker::new(0, Arc::clone(&clock)).unwrap_err(),
            WindowError::NonPositiveLength(0)
        );
        assert!(TimeWindowTracker::new(-10, clock).is_err());
    }

    #[test]
    fn test_window_id_is_floor_of_seconds_over_length() {
        let clock = Arc::new(ManualClock::at_secs(0));
        let t = tracker(10, &clock);

        for secs in [0_i64, 9, 10, 11, 99, 1_700_000_003, 1_700_000_010] {
            clock.set_millis(secs * 1000 + 999);
            t.advance();
            assert_eq!(t.current_window_id(), secs / 10, "at {secs}s");
            assert_eq!(t.current_window_start(), (secs / 10) * 10);
        }
    }

    #[test]
    fn test_window_id_non_decreasing() {
        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        let t = tracker(10, &clock);
        let mut last = t.current_window_id();

        for step in 0..200 {
            clock.advance_millis(137 + (step % 7) * 311);
            t.advance();
            let id = t.current_window_id();
            assert!(id >= last);
            last = id;
        }
    }

    #[test]
    fn test_advance_reports_rollover_once() {
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let t = tracker(120, &clock);
        assert!(t.advance().is_none());

        clock.set_millis(1_080_000);
        let rolled = t.advance().expect("window should roll over");
        assert_eq!(rolled.id, 9);
        assert_eq!(rolled.start_secs, 1_080);
        assert!(t.advance().is_none());
    }

    #[test]
    fn test_clock_stepping_back_keeps_window() {
        let clock = Arc::new(ManualClock::at_secs(100));
        let t = tracker(10, &clock);
        assert_eq!(t.current_window_id(), 10);

        clock.set_millis(50_000);
        assert!(t.advance().is_none());
        assert_eq!(t.current_window_id(), 10);
    }

    #[test]
    fn test_progress_percentage() {
        let clock = Arc::new(ManualClock::new(2_500));
        let t = tracker(10, &clock);
        assert!((t.progress_within_window() - 25.0).abs() < 1e-9);

        clock.set_millis(9_999);
        t.advance();
        assert!(t.progress_within_window() < 100.0);
        assert!(t.progress_within_window() > 99.0);
    }

    #[test]
    fn test_window_containing_matches_tracker() {
        let w = Window::containing(1_700_000_123_456, 10);
        assert_eq!(w.id, 170_000_012);
        assert_eq!(w.start_secs, 1_700_000_120);
    }
}
