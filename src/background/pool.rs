//! Bounded worker pool for network jobs
//!
//! Jobs (submissions, validations, health probes) run as tokio tasks on a
//! runtime handle, tracked by a `TaskTracker` and bounded by a semaphore so
//! at most `size` jobs make progress at once. A shared `CancellationToken`
//! stops queued and sleeping jobs at shutdown.
//!
//! The pool either borrows an existing runtime (`from_handle`) or owns a
//! dedicated multi-thread runtime (`with_owned_runtime`) for hosts that have
//! none, such as a plugin loaded into a DAW.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

pub struct WorkerPool {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    tracker: TaskTracker,
    services: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    size: usize,
}

impl WorkerPool {
    /// Pool that spawns onto an existing runtime.
    pub fn from_handle(handle: Handle, size: usize) -> Self {
        let size = size.max(1);
        Self {
            handle,
            runtime: Mutex::new(None),
            tracker: TaskTracker::new(),
            services: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(size)),
            cancel: CancellationToken::new(),
            size,
        }
    }

    /// Pool backed by its own multi-thread runtime with `size` workers.
    pub fn with_owned_runtime(size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name("telemetry-worker")
            .enable_all()
            .build()?;
        let pool = Self::from_handle(runtime.handle().clone(), size);
        if let Ok(mut slot) = pool.runtime.lock() {
            *slot = Some(runtime);
        }
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Token cancelled when the pool shuts down. Jobs select on it around
    /// every sleep.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Enqueue a job. Returns false if the pool is shutting down.
    pub fn spawn<F>(&self, job: &'static str, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(job, "[WorkerPool] Rejected job during shutdown");
            return false;
        }

        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        self.tracker.spawn_on(
            async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return,
                    },
                    _ = cancel.cancelled() => {
                        debug!(job, "[WorkerPool] Job cancelled before start");
                        return;
                    }
                };
                fut.await;
            },
            &self.handle,
        );
        true
    }

    /// Spawn a long-lived service task (the tick driver). Cancelled with the
    /// pool, but it does not occupy a job slot and `wait_idle` ignores it.
    pub fn spawn_service<F>(&self, name: &'static str, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(name, "[WorkerPool] Rejected service during shutdown");
            return false;
        }
        let cancel = self.cancel.clone();
        self.services.spawn_on(
            async move {
                tokio::select! {
                    _ = fut => {}
                    _ = cancel.cancelled() => debug!(name, "[WorkerPool] Service stopped"),
                }
            },
            &self.handle,
        );
        true
    }

    /// Number of jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every tracked job has finished, including jobs spawned by
    /// jobs while waiting. The pool stays usable afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel pending jobs and wait up to `timeout` for them to finish.
    ///
    /// Returns false if jobs were still running when the timeout elapsed.
    /// A request already in flight is left to its own transport timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tracker.close();
        self.services.close();
        let all_done = async {
            self.services.wait().await;
            self.tracker.wait().await;
        };
        match tokio::time::timeout(timeout, all_done).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "[WorkerPool] Jobs still running after shutdown timeout"
                );
                false
            }
        }
    }

    /// Synchronous shutdown for owners without an async context.
    ///
    /// Cancels, then blocks up to `timeout` for tracked jobs on whichever
    /// runtime they run on. An owned runtime is then shut down with the same
    /// bound. Must not be called from inside an async context.
    ///
    /// Returns false if jobs were still running when the timeout elapsed.
    pub fn shutdown_blocking(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tracker.close();
        self.services.close();

        let tracker = self.tracker.clone();
        let services = self.services.clone();
        let all_done = async move {
            tokio::time::timeout(timeout, async {
                services.wait().await;
                tracker.wait().await;
            })
            .await
            .is_ok()
        };

        let runtime = self.runtime.lock().ok().and_then(|mut slot| slot.take());
        let clean = match runtime {
            Some(runtime) => {
                let clean = runtime.block_on(all_done);
                runtime.shutdown_timeout(timeout);
                clean
            }
            None => self.handle.block_on(all_done),
        };
        if !clean {
            warn!(
                remaining = self.tracker.len(),
                timeout_ms = timeout.as_millis() as u64,
                "[WorkerPool] Jobs still running after shutdown timeout"
            );
        }
        clean
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
        let runtime = self.runtime.get_mut().ok().and_then(Option::take);
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}
