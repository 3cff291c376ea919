//! Stealth Watcher Daemon
//!
//! Main entry point. Bootstraps the registry mirror, then runs until a
//! fatal condition:
//!   - pending transaction stream or registry log stream ended
//!   - aliveness timeout (no mempool activity, relayer-bound or not)
//!   - gas feed closed
//!   - registry resync failed
//! Any of these exits with code 1. SIGINT/SIGTERM exit cleanly with 0.
//! There is no reconnect logic: a supervisor restarts the process, and a
//! fresh start always re-bootstraps the mirror.
//!
//! Usage:
//!   stealth-watcher --config .env.mainnet
//!   stealth-watcher --config watcher.toml --dry-run --log-json
//!
//! Created: 2026-10-18

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::signers::local::PrivateKeySigner;

use stealth_watcher::aliveness::AlivenessMonitor;
use stealth_watcher::config::{load_config, load_config_from_file, load_config_toml};
use stealth_watcher::gas_oracle::{self, GasPriceOracle};
use stealth_watcher::mempool::{
    spawn_mempool_heartbeat, EligibilityFilter, FilteredPendingSource, HashPendingSource,
    PendingTransactionSource, TenderlySimulator,
};
use stealth_watcher::registry::{
    run_event_applier, spawn_event_stream, RegistryMirror, RegistrySource, RegistryState,
    RegistrySync,
};
use stealth_watcher::reporter::{NonceManager, ProviderSubmitter, ReportJournal, Reporter};
use stealth_watcher::types::{PendingSourceMode, WatcherConfig};
use stealth_watcher::watcher::Watcher;

/// Registry events buffered between the log stream and the applier
const REGISTRY_CHANNEL_CAPACITY: usize = 1024;

/// Stealth hash reporter for the StealthVault / StealthRelayer
#[derive(Parser)]
#[command(name = "stealth-watcher")]
struct Args {
    /// Config file: `.toml` → TOML loader, anything else → dotenv file
    #[arg(short, long, env = "WATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Price and sign reports but never broadcast them
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn load(args: &Args) -> Result<WatcherConfig> {
    let mut config = match &args.config {
        Some(path) if path.extension().is_some_and(|ext| ext == "toml") => load_config_toml(path)?,
        Some(path) => load_config_from_file(&path.to_string_lossy())?,
        None => load_config()?,
    };
    if args.dry_run {
        config.dry_run = true;
    }
    Ok(config)
}

/// Flatten a task's join result into the task's own result
async fn join_task(name: &str, handle: JoinHandle<stealth_watcher::Result<()>>) -> Result<()> {
    match handle.await {
        Ok(Ok(())) => Err(anyhow!("{} task exited", name)),
        Ok(Err(e)) => Err(anyhow!(e).context(format!("{} task failed", name))),
        Err(e) => Err(anyhow!("{} task panicked: {}", name, e)),
    }
}

/// Like `join_task`, but pends forever when the task was never started
async fn join_optional(name: &str, handle: Option<JoinHandle<stealth_watcher::Result<()>>>) -> Result<()> {
    match handle {
        Some(handle) => join_task(name, handle).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!("Stealth Watcher starting...");
    let config = load(&args).context("Failed to load configuration")?;
    info!(
        "Configuration loaded | chain_id={} | vault={:?} | relayer={:?} | authorization={:?} | source={:?} | dry_run={}",
        config.chain_id,
        config.stealth_vault,
        config.stealth_relayer,
        config.authorization,
        config.pending_source,
        config.dry_run
    );

    let signer: PrivateKeySigner = config
        .private_key
        .trim()
        .parse()
        .context("PRIVATE_KEY is not a valid secp256k1 key")?;
    info!("Reporter account: {:?}", signer.address());

    // ── Provider ────────────────────────────────────────────────────
    info!("Connecting via WebSocket...");
    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(config.ws_url.as_str()))
        .await
        .context("WebSocket connection failed")?;
    let block = provider.get_block_number().await?;
    info!("Connected! Current block: {}", block);

    // ── Registry mirror ─────────────────────────────────────────────
    // Subscribe first so nothing emitted during bootstrap is lost
    let (event_tx, event_rx) = mpsc::channel(REGISTRY_CHANNEL_CAPACITY);
    let event_stream = spawn_event_stream(
        provider.clone(),
        config.stealth_vault,
        config.stealth_relayer,
        event_tx,
    )
    .await
    .context("Registry log subscription failed")?;

    let sync = RegistrySync::new(
        provider.clone(),
        config.stealth_vault,
        config.stealth_relayer,
        config.reporter_reward_divisor,
    );
    let (snapshot, watermark) = sync.bootstrap().await.context("Registry bootstrap failed")?;
    let mirror = RegistryMirror::new(RegistryState::from_snapshot(
        &snapshot,
        config.reporter_reward_divisor,
    ));
    let applier = {
        let mirror = mirror.clone();
        tokio::spawn(async move { run_event_applier(mirror, &sync, event_rx, watermark).await })
    };

    // ── Gas oracle ──────────────────────────────────────────────────
    let (oracle, gas_feed) = match &config.gas_feed_url {
        Some(url) => {
            let (feed, oracle) = gas_oracle::channel();
            let url = url.clone();
            let handle = tokio::spawn(async move { feed.run(&url).await });
            (oracle, Some(handle))
        }
        None => {
            warn!("GAS_FEED_URL not set - report price has no oracle floor");
            (GasPriceOracle::disabled(), None)
        }
    };

    // ── Reporter ────────────────────────────────────────────────────
    let nonces = NonceManager::from_chain(&provider, signer.address()).await?;
    let journal = match &config.journal_dir {
        Some(dir) => {
            let (journal, _writer) = ReportJournal::spawn(dir)?;
            Some(Arc::new(journal))
        }
        None => None,
    };
    let reporter = Reporter::new(
        &config,
        signer,
        nonces,
        oracle,
        Arc::new(ProviderSubmitter::new(provider.clone())),
        journal,
    );

    // ── Watcher ─────────────────────────────────────────────────────
    let aliveness = AlivenessMonitor::new(config.aliveness_timeout_ms);
    let mut watcher = Watcher::new(
        mirror,
        EligibilityFilter::new(config.stealth_relayer, config.authorization),
        config.stealth_vault,
        Arc::new(reporter),
        aliveness.clone(),
    );
    if let Some(simulation) = config.simulation.clone() {
        info!("Simulation preflight enabled | hash_source={:?}", config.hash_source);
        watcher = watcher.with_simulator(Arc::new(TenderlySimulator::new(simulation)?), config.hash_source);
    }

    let source: Box<dyn PendingTransactionSource> = match config.pending_source {
        PendingSourceMode::Filtered => Box::new(FilteredPendingSource::new(
            provider.clone(),
            config.stealth_relayer,
        )),
        PendingSourceMode::Hashes => Box::new(
            HashPendingSource::new(
                provider.clone(),
                Duration::from_millis(config.tx_fetch_timeout_ms),
            )
            .with_aliveness(aliveness.clone()),
        ),
    };
    let stream = source.subscribe().await.context("Pending subscription failed")?;

    // Relayer traffic alone is too sparse to prove the mempool feed is alive
    let heartbeat = if config.pending_source == PendingSourceMode::Filtered && aliveness.is_enabled() {
        let handle = spawn_mempool_heartbeat(provider.clone(), aliveness.clone())
            .await
            .context("Mempool heartbeat subscription failed")?;
        Some(handle)
    } else {
        None
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();

    info!("Watching for leaked stealth hashes...");
    let result = tokio::select! {
        r = watcher.run(stream) => r.map_err(anyhow::Error::from),
        r = aliveness.run() => r.map_err(anyhow::Error::from),
        r = join_task("registry applier", applier) => r,
        r = join_task("registry log stream", event_stream) => r,
        r = join_optional("gas feed", gas_feed) => r,
        r = join_optional("mempool heartbeat", heartbeat) => r,
        sig = signals.next() => {
            info!("Received signal {:?}, shutting down", sig);
            Ok(())
        }
    };
    signals_handle.close();

    let (seen, candidates, reported) = watcher.stats().summary();
    info!(
        "Stealth Watcher stopped | seen={} | candidates={} | reported={}",
        seen, candidates, reported
    );
    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    result
}
