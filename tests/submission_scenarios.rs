//! Submission Scenario Tests
//!
//! End-to-end runs of the telemetry core against a scripted transport and a
//! manual wall clock. Network sleeps (jitter, backoff) run on tokio's paused
//! clock, so every scenario completes instantly and deterministically.

use plugin_telemetry::transport::ScriptedReply;
use plugin_telemetry::{
    Clock, CommitDecision, CoreDeps, HostInfo, InMemoryStore, ManualClock, ScriptedHttpClient,
    SessionState, TelemetryConfig, TelemetryCore,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// 2024-01-01T00:00:00Z, aligned to both 10s and 120s windows.
const T0_SECS: i64 = 1_704_067_200;
const SAMPLE_RATE: f64 = 48_000.0;
/// 480 samples at 48 kHz = 10 ms per block.
const BLOCK: usize = 480;

struct Harness {
    core: TelemetryCore,
    clock: Arc<ManualClock>,
    client: Arc<ScriptedHttpClient>,
}

async fn harness() -> Harness {
    let clock = Arc::new(ManualClock::at_secs(T0_SECS));
    let client = Arc::new(ScriptedHttpClient::new());
    let deps = CoreDeps {
        client: client.clone(),
        store: Arc::new(InMemoryStore::new()),
        clock: clock.clone(),
        host: HostInfo::detect("ProTools", None, Some("2024.6")),
        dedup_id: None,
    };
    let core = TelemetryCore::new(TelemetryConfig::default(), deps).unwrap();
    core.set_session_key("SESSION-1").unwrap();
    core.wait_idle().await;
    assert_eq!(core.session_state(), SessionState::Valid);
    Harness { core, clock, client }
}

/// Feed `secs` of loud audio, advancing the wall clock block by block.
fn play(h: &Harness, secs: u64) {
    let block = vec![vec![0.25_f32; BLOCK]; 2];
    for _ in 0..(secs * 100) {
        h.core.process_block(&block, SAMPLE_RATE);
        h.clock.advance_millis(10);
    }
}

/// Jump the wall clock to the start of the next submission window.
fn jump_to_next_submission_window(h: &Harness) {
    let now = h.clock.now_millis();
    let next = (now.div_euclid(120_000) + 1) * 120_000;
    h.clock.set_millis(next);
}

fn activity_of(body: &serde_json::Value) -> BTreeMap<i64, u64> {
    body["activity"]
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.parse().unwrap(), v.as_u64().unwrap()))
        .collect()
}

// ============================================================================
// Retry & Backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limited_three_times_then_accepted() {
    let h = harness().await;
    h.client.push_many(
        "/submit",
        [
            ScriptedReply::Status(429),
            ScriptedReply::Status(429),
            ScriptedReply::Status(429),
            ScriptedReply::Status(200),
        ],
    );

    play(&h, 5);
    h.clock.advance_secs(5);
    h.core.tick();

    let window = T0_SECS / 10;
    assert_eq!(
        h.core.flush_accumulator(),
        CommitDecision::Scheduled {
            high_water_candidate: window,
            windows: 1
        }
    );
    h.core.wait_idle().await;

    let submits = h.client.requests_to("/submit");
    assert_eq!(submits.len(), 4, "exactly three retries");
    let gaps: Vec<Duration> = submits.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(4000),
            Duration::from_millis(9000)
        ]
    );

    assert_eq!(h.core.accumulator().high_water_mark(), Some(window));
    assert_eq!(h.core.accumulator().pending_blocks(), 0);
    assert!(h.core.snapshot().connection_healthy);

    // Pruning happens at the next accumulator touch.
    h.core.tick();
    assert_eq!(h.core.accumulator().bucket_count(), 0);
    assert_eq!(h.client.count("/ping"), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_failures_mark_unhealthy_then_probe() {
    let h = harness().await;
    h.client.push_many(
        "/submit",
        (0..5).map(|_| {
            ScriptedReply::Failure(plugin_telemetry::TransportError::Unreachable(
                "connection refused".into(),
            ))
        }),
    );
    h.client.push(
        "/ping",
        ScriptedReply::Failure(plugin_telemetry::TransportError::Unreachable(
            "connection refused".into(),
        )),
    );

    // Stay under the idle fallback so only the flush commits.
    play(&h, 1);
    h.clock.advance_secs(9);
    h.core.tick();
    h.core.flush_accumulator();
    h.core.wait_idle().await;

    assert_eq!(h.client.count("/submit"), 5);
    // First probe attempt fails, second (default 200) restores health.
    assert_eq!(h.client.count("/ping"), 2);
    assert!(h.core.snapshot().connection_healthy);
    assert_eq!(h.core.accumulator().high_water_mark(), None);
    assert_eq!(h.core.accumulator().unsent_ms(), 1000);
}

// ============================================================================
// Window Rollover & No Loss
// ============================================================================

#[tokio::test(start_paused = true)]
async fn five_seconds_of_signal_fill_one_bucket() {
    let h = harness().await;
    play(&h, 5);
    h.clock.advance_secs(5);
    h.core.tick();

    let buckets = h.core.accumulator().snapshot();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets.get(&(T0_SECS / 10)), Some(&5000));
}

#[tokio::test(start_paused = true)]
async fn unsent_windows_are_kept_and_folded_into_next_submission() {
    let h = harness().await;
    // Two full submission cycles of five failed attempts each.
    h.client
        .push_many("/submit", (0..10).map(|_| ScriptedReply::Status(500)));

    let mut recorded = BTreeMap::new();
    for _ in 0..2 {
        let window = h.clock.now_millis().div_euclid(10_000);
        play(&h, 5);
        recorded.insert(window, 5000_u64);

        jump_to_next_submission_window(&h);
        h.core.tick();
        h.core.wait_idle().await;
    }

    assert_eq!(h.client.count("/submit"), 10);
    assert_eq!(h.core.accumulator().high_water_mark(), None);
    assert_eq!(h.core.accumulator().unsent_ms(), 10_000);
    assert_eq!(h.core.accumulator().snapshot(), recorded);

    // Third rollover: the server accepts.
    jump_to_next_submission_window(&h);
    h.core.tick();
    h.core.wait_idle().await;

    let last = h.client.requests_to("/submit").pop().unwrap();
    let body = last.body.unwrap();
    let sent = activity_of(&body);
    assert_eq!(sent, recorded);
    let max_sent = *sent.keys().next_back().unwrap();
    assert_eq!(h.core.accumulator().high_water_mark(), Some(max_sent));

    h.core.tick();
    assert_eq!(h.core.accumulator().unsent_ms(), 0);
}

#[tokio::test(start_paused = true)]
async fn rollover_without_key_sends_nothing() {
    let h = harness().await;
    h.core.set_session_key("").unwrap();
    play(&h, 2);
    jump_to_next_submission_window(&h);
    h.core.tick();
    h.core.wait_idle().await;

    assert_eq!(h.client.count("/submit"), 0);
    assert_eq!(h.core.accumulator().unsent_ms(), 2000);
}

// ============================================================================
// Request Shape
// ============================================================================

#[tokio::test(start_paused = true)]
async fn submissions_share_dedup_id_and_headers() {
    let h = harness().await;

    for _ in 0..2 {
        play(&h, 1);
        h.clock.advance_secs(9);
        h.core.tick();
        h.core.flush_accumulator();
        h.core.wait_idle().await;
    }

    let submits = h.client.requests_to("/submit");
    assert_eq!(submits.len(), 2);
    for req in &submits {
        let body = req.body.as_ref().unwrap();
        assert_eq!(body["dd_id"], h.core.dedup_id().to_string());
        assert_eq!(body["host"], "ProTools");
        assert_eq!(body["plugin_version"], "1.1.0");
        assert_eq!(body["session_key"], "SESSION-1");
        assert!(req
            .header("User-Agent")
            .unwrap()
            .starts_with("ProTools/2024.6 - "));
    }
    // The second request only carries the window recorded after the first
    // delivery.
    assert_eq!(activity_of(submits[1].body.as_ref().unwrap()).len(), 1);
}
