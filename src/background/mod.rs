//! Background services: worker pool, connection health monitor, tick driver
//!
//! Network jobs never run on the real-time thread or the tick driver. They
//! are enqueued on a bounded [`WorkerPool`] and report back through atomic
//! flags only.

pub mod driver;
pub mod health_monitor;
pub mod pool;

pub use driver::{spawn_driver, Tick};
pub use health_monitor::{ConnectionHealthMonitor, ProbeOutcome};
pub use pool::WorkerPool;
