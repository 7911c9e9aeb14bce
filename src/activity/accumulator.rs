//! Activity Accumulator
//!
//! Counts signal-active milliseconds per activity window. The running window
//! lives next to the sealed bucket map and the submission high-water mark
//! inside one mutex; every critical section is a short copy or mutation.
//!
//! The real-time path never waits on that mutex: it uses `try_lock`, and if
//! the lock is held by the tick driver or a submission snapshot, the block's
//! milliseconds are parked in an atomic counter and folded in at the next
//! acquisition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Bucket map: activity window id → accumulated active milliseconds.
pub type ActivityBuckets = BTreeMap<i64, u64>;

#[derive(Debug)]
struct BucketState {
    /// Activity window the running counter belongs to.
    current_window: i64,
    /// Milliseconds accumulated in `current_window` so far.
    running_ms: u64,
    /// Sealed windows awaiting delivery.
    buckets: ActivityBuckets,
    /// Greatest window id confirmed delivered.
    high_water_mark: Option<i64>,
}

impl BucketState {
    fn prune_delivered(&mut self) {
        if let Some(mark) = self.high_water_mark {
            if self.buckets.first_key_value().is_some_and(|(&k, _)| k <= mark) {
                self.buckets = self.buckets.split_off(&mark.saturating_add(1));
            }
        }
    }

    fn roll_to(&mut self, window_id: i64) {
        if window_id <= self.current_window {
            return;
        }
        if self.running_ms > 0 {
            *self.buckets.entry(self.current_window).or_insert(0) += self.running_ms;
        }
        self.current_window = window_id;
        self.running_ms = 0;
    }
}

/// Thread-safe activity accumulator shared by the real-time path, the tick
/// driver and the submission engine.
#[derive(Debug)]
pub struct ActivityAccumulator {
    state: Mutex<BucketState>,
    /// Milliseconds recorded while the lock was contended.
    deferred_ms: AtomicU64,
    /// Active blocks recorded since the last confirmed delivery.
    pending_blocks: AtomicU64,
}

impl ActivityAccumulator {
    pub fn new(current_window: i64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                current_window,
                running_ms: 0,
                buckets: BTreeMap::new(),
                high_water_mark: None,
            }),
            deferred_ms: AtomicU64::new(0),
            pending_blocks: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // A panic while holding the lock cannot leave the map half-updated in
        // a way that matters more than losing telemetry, so keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fold_deferred(&self, state: &mut BucketState) {
        let deferred = self.deferred_ms.swap(0, Ordering::AcqRel);
        state.running_ms += deferred;
    }

    /// Record `duration_ms` of activity observed in `window_id`.
    ///
    /// Real-time safe: never blocks. Also prunes delivered buckets and seals
    /// the previous window when `window_id` has moved on.
    pub fn record_activity(&self, window_id: i64, duration_ms: u64) {
        self.pending_blocks.fetch_add(1, Ordering::AcqRel);

        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.deferred_ms.fetch_add(duration_ms, Ordering::AcqRel);
                return;
            }
        };

        self.fold_deferred(&mut state);
        state.prune_delivered();
        state.roll_to(window_id);
        state.running_ms += duration_ms;
    }

    /// Seal the running window if `window_id` has moved past it.
    ///
    /// Called from the tick driver so the last active window is committed to
    /// the bucket map even when the host stops calling the processing path.
    pub fn roll_over(&self, window_id: i64) {
        let mut state = self.lock();
        self.fold_deferred(&mut state);
        state.prune_delivered();
        state.roll_to(window_id);
    }

    /// Copy of the sealed buckets with nonzero activity.
    pub fn snapshot(&self) -> ActivityBuckets {
        let state = self.lock();
        state
            .buckets
            .iter()
            .filter(|(_, &ms)| ms > 0)
            .map(|(&k, &v)| (k, v))
            .collect()
    }

    /// Copy the bucket map, then remove every entry with key `<= mark`.
    ///
    /// Both steps happen under one lock acquisition.
    pub fn snapshot_and_prune(&self, mark: i64) -> ActivityBuckets {
        let mut state = self.lock();
        let copy = state.buckets.clone();
        state.buckets = state.buckets.split_off(&mark.saturating_add(1));
        copy
    }

    /// Confirm delivery of every window up to and including `mark`.
    ///
    /// Raises the high-water mark (never lowers it) and resets the pending
    /// block counter. The buckets themselves are pruned at the next
    /// `record_activity` or `roll_over`.
    pub fn acknowledge(&self, mark: i64) {
        {
            let mut state = self.lock();
            state.high_water_mark = Some(state.high_water_mark.map_or(mark, |m| m.max(mark)));
        }
        self.pending_blocks.store(0, Ordering::Release);
    }

    pub fn high_water_mark(&self) -> Option<i64> {
        self.lock().high_water_mark
    }

    pub fn pending_blocks(&self) -> u64 {
        self.pending_blocks.load(Ordering::Acquire)
    }

    /// Total milliseconds not yet confirmed delivered, sealed and running.
    pub fn unsent_ms(&self) -> u64 {
        let state = self.lock();
        let mark = state.high_water_mark.unwrap_or(i64::MIN);
        let sealed: u64 = state
            .buckets
            .range((mark.saturating_add(1))..)
            .map(|(_, &ms)| ms)
            .sum();
        sealed + state.running_ms + self.deferred_ms.load(Ordering::Acquire)
    }

    /// Activity window id the running counter belongs to.
    pub fn current_window(&self) -> i64 {
        self.lock().current_window
    }

    /// Milliseconds accumulated in the running window.
    pub fn running_ms(&self) -> u64 {
        self.lock().running_ms + self.deferred_ms.load(Ordering::Acquire)
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }
}
