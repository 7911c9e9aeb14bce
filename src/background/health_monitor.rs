//! Connection Health Monitor
//!
//! Probes `GET /ping` on a worker and folds the result into the shared
//! [`Connectivity`] flag:
//! - 200: healthy, stop
//! - no network / unreachable: unhealthy, keep trying
//! - anything else: keep trying, state untouched
//!
//! Up to `max_attempts` attempts with quadratic backoff between them. When
//! attempts run out the last observed state stands. At most one probe job is
//! outstanding; triggers while one is in flight are coalesced.

use super::WorkerPool;
use crate::state::Connectivity;
use crate::submission::RetryPolicy;
use crate::transport::{HttpClient, HttpRequest};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Outcome of one probe job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy { attempts: u32 },
    Exhausted,
    Cancelled,
    OwnerGone,
}

struct MonitorInner {
    client: Arc<dyn HttpClient>,
    connectivity: Arc<Connectivity>,
    pool: Arc<WorkerPool>,
    health_url: String,
    retry: RetryPolicy,
    in_flight: AtomicBool,
    probes_started: AtomicU64,
}

/// Cheap to clone; clones share one in-flight guard.
#[derive(Clone)]
pub struct ConnectionHealthMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectionHealthMonitor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        connectivity: Arc<Connectivity>,
        pool: Arc<WorkerPool>,
        health_url: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                client,
                connectivity,
                pool,
                health_url,
                retry,
                in_flight: AtomicBool::new(false),
                probes_started: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue a probe. Returns false if one is already outstanding or the
    /// pool is shutting down.
    pub fn probe(&self) -> bool {
        if self.inner.in_flight.swap(true, Ordering::AcqRel) {
            debug!("[HealthMonitor] Probe already in flight, coalescing");
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        let client = Arc::clone(&self.inner.client);
        let request = HttpRequest::get(self.inner.health_url.clone());
        let retry = self.inner.retry;
        let cancel = self.inner.pool.cancel_token();

        let spawned = self.inner.pool.spawn("health_probe", async move {
            let outcome = tokio::select! {
                outcome = run_probe(&weak, client, request, retry) => outcome,
                _ = cancel.cancelled() => ProbeOutcome::Cancelled,
            };
            debug!(?outcome, "[HealthMonitor] Probe finished");
            if let Some(inner) = weak.upgrade() {
                inner.in_flight.store(false, Ordering::Release);
            }
        });

        if spawned {
            self.inner.probes_started.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.in_flight.store(false, Ordering::Release);
        }
        spawned
    }

    pub fn is_probing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Probe jobs started since construction.
    pub fn probes_started(&self) -> u64 {
        self.inner.probes_started.load(Ordering::Relaxed)
    }
}

async fn run_probe(
    weak: &Weak<MonitorInner>,
    client: Arc<dyn HttpClient>,
    request: HttpRequest,
    retry: RetryPolicy,
) -> ProbeOutcome {
    for attempt in 1..=retry.max_attempts {
        if weak.strong_count() == 0 {
            return ProbeOutcome::OwnerGone;
        }

        let resp = client.execute(request.clone()).await;

        let Some(inner) = weak.upgrade() else {
            return ProbeOutcome::OwnerGone;
        };
        if resp.status == 200 {
            if !inner.connectivity.is_healthy() {
                info!(attempt, "[HealthMonitor] Connection restored");
            }
            inner.connectivity.mark_healthy();
            return ProbeOutcome::Healthy { attempts: attempt };
        }
        if resp.lost_connectivity() {
            inner.connectivity.mark_unhealthy();
            warn!(
                attempt,
                error = ?resp.error,
                "[HealthMonitor] Endpoint unreachable"
            );
        } else {
            debug!(attempt, status = resp.status, "[HealthMonitor] Unexpected probe response");
        }
        drop(inner);

        if retry.has_next(attempt) {
            tokio::time::sleep(retry.backoff(attempt)).await;
        }
    }
    ProbeOutcome::Exhausted
}
