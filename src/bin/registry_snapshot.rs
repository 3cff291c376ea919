//! Registry Snapshot Tool
//!
//! Reads the StealthVault caller registry and the relayer penalty from
//! chain (same bulk read the watcher bootstraps with) and prints it as
//! JSON. Useful for checking what the watcher would consider eligible.
//!
//! Usage:
//!   registry-snapshot --config .env.mainnet
//!   registry-snapshot --config watcher.toml --block 19000000 --pretty
//!
//! Created: 2026-10-18

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use alloy::providers::{Provider, ProviderBuilder, WsConnect};

use stealth_watcher::config::{load_config, load_config_from_file, load_config_toml};
use stealth_watcher::mempool::EligibilityFilter;
use stealth_watcher::registry::{RegistrySource, RegistryState, RegistrySync};

#[derive(Parser)]
#[command(name = "registry-snapshot")]
struct Args {
    /// Config file: `.toml` → TOML loader, anything else → dotenv file
    #[arg(short, long, env = "WATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Read at this block instead of latest
    #[arg(long)]
    block: Option<u64>,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,

    /// Only print callers the watcher would report (bonded >= penalty and
    /// authorized under the configured authorization mode)
    #[arg(long)]
    eligible_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays pure JSON
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) if path.extension().is_some_and(|ext| ext == "toml") => load_config_toml(path)?,
        Some(path) => load_config_from_file(&path.to_string_lossy())?,
        None => load_config()?,
    };

    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(config.ws_url.as_str()))
        .await
        .context("WebSocket connection failed")?;

    let sync = RegistrySync::new(
        provider.clone(),
        config.stealth_vault,
        config.stealth_relayer,
        config.reporter_reward_divisor,
    );
    let (mut snapshot, block) = match args.block {
        Some(block) => (sync.bootstrap_at(block).await?, block),
        None => sync.bootstrap().await?,
    };
    info!("Snapshot at block {} | latest={}", block, provider.get_block_number().await?);

    if args.eligible_only {
        let state = RegistryState::from_snapshot(&snapshot, config.reporter_reward_divisor);
        let filter = EligibilityFilter::new(config.stealth_relayer, config.authorization);
        snapshot
            .callers
            .retain(|entry| filter.is_eligible_caller(&entry.caller, &state));
        info!(
            "Eligible callers: {} | authorization={:?}",
            snapshot.callers.len(),
            config.authorization
        );
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    println!("{}", json);
    Ok(())
}
