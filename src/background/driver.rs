//! Periodic tick driver.
//!
//! A low-rate service task that calls [`Tick::tick`] on its target every
//! period. The target is held weakly; the loop ends once the owner is gone
//! or the pool is cancelled.

use super::WorkerPool;
use std::sync::Weak;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Something driven by the periodic tick. Must not block on I/O.
pub trait Tick: Send + Sync + 'static {
    fn tick(&self);
}

/// Start the driver on `pool`. Returns false if the pool is shutting down.
pub fn spawn_driver<T: Tick>(pool: &WorkerPool, target: Weak<T>, period: Duration) -> bool {
    pool.spawn_service("tick_driver", async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(target) = target.upgrade() else {
                debug!("[Driver] Owner gone, stopping");
                break;
            };
            target.tick();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    #[derive(Default)]
    struct Counter(AtomicU32);

    impl Tick for Counter {
        fn tick(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_period() {
        let pool = WorkerPool::from_handle(Handle::current(), 2);
        let counter = Arc::new(Counter::default());
        assert!(spawn_driver(&pool, Arc::downgrade(&counter), Duration::from_millis(500)));

        // First tick fires immediately, then every 500ms.
        tokio::time::sleep(Duration::from_millis(2_250)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 5);
        assert!(pool.shutdown(Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_owner_dropped() {
        let pool = WorkerPool::from_handle(Handle::current(), 2);
        let counter = Arc::new(Counter::default());
        spawn_driver(&pool, Arc::downgrade(&counter), Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(counter);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        // The service has exited on its own; shutdown has nothing to wait for.
        assert!(pool.shutdown(Duration::from_millis(1)).await);
    }
}
