//! plugin-telemetry - headless host simulator
//!
//! Drives the telemetry core the way a DAW drives the plugin: a dedicated
//! "audio" thread feeds synthetic blocks into the real-time entry point while
//! the core's tick driver and worker pool do the rest.
//!
//! # Usage
//!
//! ```bash
//! # Loud sine for two minutes against a local collection API
//! cargo run --release -- --api-base http://127.0.0.1:7575 --session-key ABC123 --duration-secs 120
//!
//! # No network at all: every request answers 200
//! cargo run --release -- --offline --session-key test --flush-on-exit
//! ```
//!
//! # Environment Variables
//!
//! - `PLUGIN_TELEMETRY_CONFIG`: Path to a TOML config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use plugin_telemetry::{
    CoreDeps, HostInfo, InMemoryStore, ScriptedHttpClient, SystemClock, TelemetryConfig,
    TelemetryCore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "plugin-telemetry")]
#[command(about = "Headless host simulator for the plugin telemetry core")]
#[command(version)]
struct CliArgs {
    /// Override the collection API base URL
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,

    /// Session key to set at startup
    #[arg(long)]
    session_key: Option<String>,

    /// Stop after this many seconds (default: run until Ctrl+C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// RMS level of the synthetic signal in dBFS (-60 is the detection threshold)
    #[arg(long, default_value = "-12", allow_hyphen_values = true)]
    level_dbfs: f64,

    #[arg(long, default_value = "48000")]
    sample_rate: f64,

    /// Samples per channel per block
    #[arg(long, default_value = "512")]
    block_size: usize,

    #[arg(long, default_value = "2")]
    channels: usize,

    /// Host description as the DAW would report it (e.g. "ProTools")
    #[arg(long, default_value = "Unknown")]
    host_name: String,

    /// Host executable path (tells Ableton Live versions apart)
    #[arg(long)]
    host_path: Option<String>,

    #[arg(long)]
    host_version: Option<String>,

    /// Directory for the preference database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use an in-memory store and a transport that answers 200 to everything
    #[arg(long)]
    offline: bool,

    /// Submit pending activity immediately before exiting
    #[arg(long)]
    flush_on_exit: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "5")]
    status_interval_secs: u64,
}

// ============================================================================
// Synthetic audio
// ============================================================================

/// Sine generator whose RMS equals `level_dbfs`.
struct SineSource {
    amplitude: f32,
    phase: f64,
    step: f64,
}

impl SineSource {
    fn new(level_dbfs: f64, frequency: f64, sample_rate: f64) -> Self {
        let rms = 10f64.powf(level_dbfs / 20.0);
        Self {
            amplitude: (rms * std::f64::consts::SQRT_2) as f32,
            phase: 0.0,
            step: std::f64::consts::TAU * frequency / sample_rate,
        }
    }

    fn fill(&mut self, block: &mut [Vec<f32>]) {
        let len = block.first().map_or(0, Vec::len);
        for i in 0..len {
            let sample = self.amplitude * (self.phase.sin() as f32);
            for channel in block.iter_mut() {
                channel[i] = sample;
            }
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        }
    }
}

/// Run the audio thread until `cancel` fires. Pre-allocates its buffers so
/// the loop itself never allocates.
fn spawn_audio_thread(
    core: Arc<TelemetryCore>,
    args: &CliArgs,
    cancel: CancellationToken,
) -> Result<std::thread::JoinHandle<u64>> {
    let mut source = SineSource::new(args.level_dbfs, 440.0, args.sample_rate);
    let mut block = vec![vec![0.0_f32; args.block_size]; args.channels.max(1)];
    let sample_rate = args.sample_rate;
    let period = Duration::from_secs_f64(args.block_size as f64 / args.sample_rate);

    std::thread::Builder::new()
        .name("audio".to_string())
        .spawn(move || {
            let mut active_blocks = 0_u64;
            while !cancel.is_cancelled() {
                source.fill(&mut block);
                if core.process_block(&block, sample_rate) {
                    active_blocks += 1;
                }
                std::thread::sleep(period);
            }
            active_blocks
        })
        .context("Failed to spawn audio thread")
}

// ============================================================================
// Main
// ============================================================================

fn build_config(args: &CliArgs) -> Result<TelemetryConfig> {
    let mut config = TelemetryConfig::load();
    if let Some(base) = &args.api_base {
        config.api.base_url = base.trim_end_matches('/').to_string();
    }
    if let Some(dir) = &args.data_dir {
        config.storage.path = dir.join("telemetry.sled");
    }
    config.validate().context("Invalid telemetry configuration")?;
    Ok(config)
}

fn build_deps(args: &CliArgs, config: &TelemetryConfig) -> Result<CoreDeps> {
    let host = HostInfo::detect(
        &args.host_name,
        args.host_path.as_deref(),
        args.host_version.as_deref(),
    );
    if args.offline {
        info!("Offline mode: scripted transport, in-memory storage");
        return Ok(CoreDeps {
            client: Arc::new(ScriptedHttpClient::new()),
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(SystemClock),
            host,
            dedup_id: None,
        });
    }
    if let Some(parent) = config.storage.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {:?}", parent))?;
    }
    CoreDeps::production(config, host).context("Failed to initialize telemetry dependencies")
}

fn log_status(core: &TelemetryCore) {
    let snap = core.snapshot();
    info!(
        progress_pct = snap.window_progress_percent,
        healthy = snap.connection_healthy,
        session = %core.session_state(),
        pending = snap.pending_activity,
        unsent_ms = snap.unsent_ms,
        signal_hot = snap.signal_hot,
        host = %snap.host_display_name,
        "Status"
    );
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = build_config(&args)?;
    info!(
        api = %config.api.base_url,
        activity_secs = config.windows.activity_secs,
        submission_secs = config.windows.submission_secs,
        "Starting plugin telemetry simulator"
    );

    let deps = build_deps(&args, &config)?;
    let core = Arc::new(TelemetryCore::new(config, deps).context("Failed to start telemetry core")?);

    if let Some(key) = &args.session_key {
        let state = core.set_session_key(key).context("Failed to store session key")?;
        info!(%state, "Session key set");
    }
    core.start();

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let audio = spawn_audio_thread(Arc::clone(&core), &args, cancel_token.clone())?;

    let deadline = args.duration_secs.map(Duration::from_secs);
    let run_for = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(run_for);

    let mut status = tokio::time::interval(Duration::from_secs(args.status_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = &mut run_for => {
                info!("Run duration elapsed");
                break;
            }
            _ = status.tick() => log_status(&core),
        }
    }

    cancel_token.cancel();
    let active_blocks = tokio::task::spawn_blocking(move || audio.join())
        .await
        .context("Audio thread join task failed")?
        .map_err(|_| anyhow::anyhow!("Audio thread panicked"))?;

    if args.flush_on_exit {
        let decision = core.flush_accumulator();
        info!(?decision, "Flushing pending activity");
        if tokio::time::timeout(Duration::from_secs(60), core.wait_idle()).await.is_err() {
            warn!("Flush did not finish within 60s");
        }
    }

    log_status(&core);
    let stats = core.submission_stats();
    info!(
        active_blocks,
        scheduled = stats.scheduled,
        delivered = stats.delivered,
        exhausted = stats.exhausted,
        dd_id = %core.dedup_id(),
        "Simulator finished"
    );

    core.shutdown().await;
    Ok(())
}
