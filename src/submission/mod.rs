//! Submission Engine
//!
//! `commit` copies the sealed activity buckets (without pruning), picks the
//! greatest window id as the candidate high-water mark and enqueues one
//! submission job. The job:
//!
//! 1. sleeps a random `0..=max_jitter` unless the commit was immediate
//! 2. up to `max_attempts` times: abort if the pending counter is already
//!    zero, POST the payload, classify the response, back off `n² × unit`
//! 3. on 200 raises the high-water mark; the buckets are pruned by the next
//!    accumulator call
//! 4. on exhaustion re-triggers the health monitor and leaves the buckets in
//!    place for the next commit
//!
//! Delivery is at-least-once: a retried or overlapping submission may carry
//! windows the server has already seen, which `dd_id` lets it collapse.

pub mod dedup;
pub mod payload;
pub mod retry;

pub use dedup::DeduplicationId;
pub use payload::{SubmitRequest, ValidateRequest};
pub use retry::RetryPolicy;

use crate::activity::ActivityAccumulator;
use crate::background::{ConnectionHealthMonitor, WorkerPool};
use crate::host::HostInfo;
use crate::session::SessionKeyLifecycle;
use crate::state::Connectivity;
use crate::transport::{HttpClient, HttpRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What `commit` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    SkippedNoKey,
    SkippedNoActivity,
    SkippedShuttingDown,
    Scheduled { high_water_candidate: i64, windows: usize },
}

/// How a submission job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Delivered { high_water_mark: i64, attempts: u32 },
    /// The pending counter reached zero before an attempt.
    Superseded,
    Exhausted,
    Cancelled,
    OwnerGone,
}

/// Counters for the simulator and tests.
#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    attempts: AtomicU64,
    delivered: AtomicU64,
    exhausted: AtomicU64,
    superseded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    pub scheduled: u64,
    pub attempts: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub superseded: u64,
}

/// Collaborators wired in by the core.
pub struct EngineDeps {
    pub client: Arc<dyn HttpClient>,
    pub accumulator: Arc<ActivityAccumulator>,
    pub connectivity: Arc<Connectivity>,
    pub session: SessionKeyLifecycle,
    pub health: ConnectionHealthMonitor,
    pub pool: Arc<WorkerPool>,
    pub host: HostInfo,
    pub submit_url: String,
    pub plugin_version: String,
    pub retry: RetryPolicy,
    pub dedup_id: DeduplicationId,
}

struct EngineInner {
    deps: EngineDeps,
    counters: Counters,
}

#[derive(Clone)]
pub struct SubmissionEngine {
    inner: Arc<EngineInner>,
}

impl SubmissionEngine {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                deps,
                counters: Counters::default(),
            }),
        }
    }

    pub fn dedup_id(&self) -> &DeduplicationId {
        &self.inner.deps.dedup_id
    }

    pub fn stats(&self) -> SubmissionStats {
        let c = &self.inner.counters;
        SubmissionStats {
            scheduled: c.scheduled.load(Ordering::Relaxed),
            attempts: c.attempts.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
            superseded: c.superseded.load(Ordering::Relaxed),
        }
    }

    /// Snapshot the buckets and enqueue a submission.
    ///
    /// `immediate` skips the jitter (explicit user flush).
    pub fn commit(&self, immediate: bool) -> CommitDecision {
        let deps = &self.inner.deps;

        let key = deps.session.key();
        if key.is_empty() {
            debug!("[Submission] No session key, skipping commit");
            return CommitDecision::SkippedNoKey;
        }

        let activity = deps.accumulator.snapshot();
        let Some(&candidate) = activity.keys().next_back() else {
            debug!("[Submission] No activity, skipping commit");
            return CommitDecision::SkippedNoActivity;
        };
        let windows = activity.len();

        let payload = SubmitRequest::new(
            deps.host.raw_name(),
            &deps.plugin_version,
            &key,
            &deps.dedup_id,
            activity,
        );
        let body = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "[Submission] Failed to encode payload");
                return CommitDecision::SkippedNoActivity;
            }
        };
        let request = HttpRequest::post_json(deps.submit_url.clone(), body)
            .header("User-Agent", deps.host.user_agent());

        let job = SubmissionJob {
            weak: Arc::downgrade(&self.inner),
            client: Arc::clone(&deps.client),
            request,
            candidate,
            immediate,
            retry: deps.retry,
            cancel: deps.pool.cancel_token(),
        };

        if !deps.pool.spawn("submit_activity", job.run()) {
            return CommitDecision::SkippedShuttingDown;
        }
        self.inner.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        info!(
            windows,
            high_water_candidate = candidate,
            total_ms = payload.total_ms(),
            immediate,
            "[Submission] Submission scheduled"
        );
        CommitDecision::Scheduled {
            high_water_candidate: candidate,
            windows,
        }
    }
}

struct SubmissionJob {
    weak: Weak<EngineInner>,
    client: Arc<dyn HttpClient>,
    request: HttpRequest,
    candidate: i64,
    immediate: bool,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl SubmissionJob {
    async fn run(self) {
        let outcome = self.attempt_all().await;
        debug!(?outcome, "[Submission] Job finished");

        let Some(inner) = self.weak.upgrade() else {
            return;
        };
        match outcome {
            SubmissionOutcome::Exhausted => {
                inner.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    attempts = self.retry.max_attempts,
                    "[Submission] Attempts exhausted, activity kept for next commit"
                );
                inner.deps.health.probe();
            }
            SubmissionOutcome::Superseded => {
                inner.counters.superseded.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Sleep for `delay`; false if cancelled first.
    async fn sleep(&self, delay: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    async fn attempt_all(&self) -> SubmissionOutcome {
        if !self.immediate {
            let jitter = self.retry.jitter(&mut rand::thread_rng());
            debug!(jitter_ms = jitter.as_millis() as u64, "[Submission] Jitter before first attempt");
            if !self.sleep(jitter).await {
                return SubmissionOutcome::Cancelled;
            }
        }

        for attempt in 1..=self.retry.max_attempts {
            {
                let Some(inner) = self.weak.upgrade() else {
                    return SubmissionOutcome::OwnerGone;
                };
                if inner.deps.accumulator.pending_blocks() == 0 {
                    debug!(attempt, "[Submission] Pending activity already cleared");
                    return SubmissionOutcome::Superseded;
                }
                inner.counters.attempts.fetch_add(1, Ordering::Relaxed);
            }

            let resp = self.client.execute(self.request.clone()).await;

            let Some(inner) = self.weak.upgrade() else {
                return SubmissionOutcome::OwnerGone;
            };
            match resp.status {
                200 => {
                    inner.deps.accumulator.acknowledge(self.candidate);
                    inner.deps.connectivity.mark_healthy();
                    inner.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    info!(
                        attempt,
                        high_water_mark = self.candidate,
                        "[Submission] Activity delivered"
                    );
                    return SubmissionOutcome::Delivered {
                        high_water_mark: self.candidate,
                        attempts: attempt,
                    };
                }
                429 => {
                    inner.deps.connectivity.mark_healthy();
                    warn!(attempt, "[Submission] Rate limited");
                }
                0 => {
                    inner.deps.connectivity.mark_unhealthy();
                    warn!(attempt, error = ?resp.error, "[Submission] Transport failure");
                }
                status => {
                    warn!(attempt, status, "[Submission] Unexpected response");
                }
            }
            drop(inner);

            if self.retry.has_next(attempt) && !self.sleep(self.retry.backoff(attempt)).await {
                return SubmissionOutcome::Cancelled;
            }
        }
        SubmissionOutcome::Exhausted
    }
}
