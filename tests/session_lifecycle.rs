//! Session Key Lifecycle Tests
//!
//! Key persistence across restarts on the sled backend, the
//! Unvalidated → Valid/Invalid transitions, and stale-response handling.

use plugin_telemetry::transport::ScriptedReply;
use plugin_telemetry::{
    CoreDeps, HostInfo, HttpClient, HttpRequest, HttpResponse, InMemoryStore, KeyValueStore,
    ManualClock, Preferences, ScriptedHttpClient, SessionState, SledStore, TelemetryConfig,
    TelemetryCore,
};
use std::sync::Arc;
use std::time::Duration;

const T0_SECS: i64 = 1_704_067_200;
const VALIDATE: &str = "/validate-session-key";

fn core_with(store: Arc<dyn KeyValueStore>, client: Arc<ScriptedHttpClient>) -> TelemetryCore {
    let deps = CoreDeps {
        client,
        store,
        clock: Arc::new(ManualClock::at_secs(T0_SECS)),
        host: HostInfo::detect("Reaper", None, Some("7.0")),
        dedup_id: None,
    };
    TelemetryCore::new(TelemetryConfig::default(), deps).unwrap()
}

// ============================================================================
// Persistence Across Restarts
// ============================================================================

#[tokio::test]
async fn validated_key_survives_reload_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.sled");

    {
        let client = Arc::new(ScriptedHttpClient::new());
        let store = Arc::new(SledStore::open(&path).unwrap());
        let core = core_with(store, Arc::clone(&client));

        assert_eq!(core.set_session_key("PERSIST-ME").unwrap(), SessionState::Unvalidated);
        core.wait_idle().await;
        assert_eq!(core.session_state(), SessionState::Valid);
        assert_eq!(client.count(VALIDATE), 1);
        core.shutdown().await;
    }

    let client = Arc::new(ScriptedHttpClient::new());
    let store = Arc::new(SledStore::open(&path).unwrap());
    let core = core_with(store, Arc::clone(&client));

    assert_eq!(core.session_key().as_str(), "PERSIST-ME");
    assert_eq!(core.session_state(), SessionState::Valid);
    assert!(core.snapshot().session_validated);
    assert!(!core.validate_session_key(), "valid key is not revalidated");
    core.wait_idle().await;
    assert_eq!(client.count(VALIDATE), 0);
}

#[tokio::test]
async fn unvalidated_key_is_revalidated_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.sled");

    {
        let client = Arc::new(ScriptedHttpClient::with_default(ScriptedReply::Status(500)));
        let store = Arc::new(SledStore::open(&path).unwrap());
        let core = core_with(store, client);
        core.set_session_key("LATER").unwrap();
        core.wait_idle().await;
        assert_eq!(core.session_state(), SessionState::Unvalidated);
        core.shutdown().await;
    }

    let client = Arc::new(ScriptedHttpClient::new());
    let store = Arc::new(SledStore::open(&path).unwrap());
    let core = core_with(store, Arc::clone(&client));
    assert_eq!(core.session_state(), SessionState::Unvalidated);

    assert!(core.start());
    core.wait_idle().await;
    assert_eq!(client.count(VALIDATE), 1);
    assert_eq!(client.count("/ping"), 1);
    assert_eq!(core.session_state(), SessionState::Valid);
    core.shutdown().await;
}

// ============================================================================
// State Transitions
// ============================================================================

#[tokio::test]
async fn rejected_key_then_new_key_starts_unvalidated() {
    let client = Arc::new(ScriptedHttpClient::new());
    client.push(VALIDATE, ScriptedReply::Status(404));
    client.push(VALIDATE, ScriptedReply::Status(500));
    let core = core_with(Arc::new(InMemoryStore::new()), Arc::clone(&client));

    core.set_session_key("WRONG").unwrap();
    core.wait_idle().await;
    assert_eq!(core.session_state(), SessionState::Invalid);
    let snap = core.snapshot();
    assert!(snap.session_invalid);
    assert!(snap.session_validated);
    assert!(snap.connection_healthy);

    assert_eq!(core.set_session_key("SECOND").unwrap(), SessionState::Unvalidated);
    assert!(!core.snapshot().session_invalid);
    core.wait_idle().await;
    // 500 leaves the key unvalidated.
    assert_eq!(core.session_state(), SessionState::Unvalidated);
    assert!(!core.snapshot().session_validated);
}

#[tokio::test]
async fn switching_back_to_known_key_skips_validation() {
    let client = Arc::new(ScriptedHttpClient::new());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let core = core_with(Arc::clone(&store), Arc::clone(&client));

    core.set_session_key("A").unwrap();
    core.wait_idle().await;
    core.set_session_key("B").unwrap();
    core.wait_idle().await;
    assert_eq!(client.count(VALIDATE), 2);

    assert_eq!(core.set_session_key("A").unwrap(), SessionState::Valid);
    core.wait_idle().await;
    assert_eq!(client.count(VALIDATE), 2);

    let prefs = Preferences::new(store);
    assert!(prefs.is_known_valid("A").unwrap());
    assert!(prefs.is_known_valid("B").unwrap());
}

#[tokio::test]
async fn clearing_key_goes_empty() {
    let client = Arc::new(ScriptedHttpClient::new());
    let core = core_with(Arc::new(InMemoryStore::new()), Arc::clone(&client));
    core.set_session_key("SOMETHING").unwrap();
    core.wait_idle().await;

    assert_eq!(core.set_session_key("").unwrap(), SessionState::Empty);
    assert!(!core.snapshot().session_validated);
    assert!(!core.validate_session_key());
}

// ============================================================================
// Stale Responses
// ============================================================================

#[tokio::test]
async fn response_for_replaced_key_is_ignored() {
    let client = Arc::new(ScriptedHttpClient::new());
    // FIFO: the first job (for OLD) gets 200, the second (for NEW) gets 404.
    client.push(VALIDATE, ScriptedReply::Status(200));
    client.push(VALIDATE, ScriptedReply::Status(404));
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let core = core_with(Arc::clone(&store), Arc::clone(&client));

    // Both jobs are queued before either runs on this single-threaded runtime.
    core.set_session_key("OLD").unwrap();
    core.set_session_key("NEW").unwrap();
    core.wait_idle().await;

    assert_eq!(client.count(VALIDATE), 2);
    assert_eq!(core.session_state(), SessionState::Invalid);
    let prefs = Preferences::new(store);
    assert!(!prefs.is_known_valid("OLD").unwrap());
    assert!(!prefs.is_known_valid("NEW").unwrap());
}

#[tokio::test(start_paused = true)]
async fn lost_connectivity_during_validation_triggers_probe() {
    let client = Arc::new(ScriptedHttpClient::new());
    client.push(
        VALIDATE,
        ScriptedReply::Failure(plugin_telemetry::TransportError::NoNetwork(
            "dns error".into(),
        )),
    );
    let core = core_with(Arc::new(InMemoryStore::new()), Arc::clone(&client));

    core.set_session_key("OFFLINE").unwrap();
    core.wait_idle().await;

    assert_eq!(core.session_state(), SessionState::Unvalidated);
    assert_eq!(client.count("/ping"), 1);
    assert!(core.snapshot().connection_healthy);

    assert!(core.validate_session_key());
    core.wait_idle().await;
    assert_eq!(core.session_state(), SessionState::Valid);
}

// ============================================================================
// Blocking Shutdown
// ============================================================================

/// Answers like the scripted client, but only after `delay`.
struct SlowClient {
    inner: ScriptedHttpClient,
    delay: Duration,
}

#[async_trait::async_trait]
impl HttpClient for SlowClient {
    async fn execute(&self, request: HttpRequest) -> HttpResponse {
        tokio::time::sleep(self.delay).await;
        self.inner.execute(request).await
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[test]
fn blocking_shutdown_waits_for_in_flight_validation() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());

    let mut config = TelemetryConfig::default();
    config.workers.shutdown_timeout_ms = 2_000;
    let core = {
        let _enter = runtime.enter();
        let deps = CoreDeps {
            client: Arc::new(SlowClient {
                inner: ScriptedHttpClient::new(),
                delay: Duration::from_millis(40),
            }),
            store: Arc::clone(&store),
            clock: Arc::new(ManualClock::at_secs(T0_SECS)),
            host: HostInfo::detect("Reaper", None, Some("7.0")),
            dedup_id: None,
        };
        TelemetryCore::new(config, deps).unwrap()
    };

    assert_eq!(core.set_session_key("K").unwrap(), SessionState::Unvalidated);
    std::thread::sleep(Duration::from_millis(5));
    core.shutdown_blocking();

    // The validation finished, and was persisted, before shutdown returned.
    assert_eq!(core.session_state(), SessionState::Valid);
    assert!(Preferences::new(store).is_known_valid("K").unwrap());
}
