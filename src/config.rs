//! Configuration management
//!
//! Two sources, same `WatcherConfig`:
//!   - dotenv-style file + process environment (`load_config_from_file`)
//!   - TOML document (`load_config_toml`), handy for checked-in deployments

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

// Re-export WatcherConfig for external access
pub use crate::types::WatcherConfig;
use crate::types::{
    AuthorizationTarget, HashSource, PendingSourceMode, SimulationConfig,
};
use alloy::primitives::Address;

const DEFAULT_TX_FETCH_TIMEOUT_MS: u64 = 1_500;
const DEFAULT_ALIVENESS_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MARKUP_NUMERATOR: u64 = 4;
const DEFAULT_MARKUP_DENOMINATOR: u64 = 3;
const DEFAULT_MAX_GAS_PRICE_GWEI: u64 = 500;
const DEFAULT_REPORT_GAS_LIMIT: u64 = 1_000_000;
const DEFAULT_REPORTER_REWARD_DIVISOR: u64 = 10;

/// Load config from `.env` (if present) and the process environment
pub fn load_config() -> Result<WatcherConfig> {
    dotenv::dotenv().ok();
    from_env()
}

/// Load config from a specific dotenv file, falling back to the environment
/// for keys the file does not set.
pub fn load_config_from_file(path: &str) -> Result<WatcherConfig> {
    dotenv::from_filename(path).with_context(|| format!("Failed to read env file: {}", path))?;
    from_env()
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{} not set", key))
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid {}='{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_address(key: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("Invalid address for {}: {}", key, raw))
}

fn from_env() -> Result<WatcherConfig> {
    // Simulation is enabled only when all three keys are present
    let simulation = match (
        env_optional("SIMULATION_API_URL"),
        env_optional("SIMULATION_ACCESS_KEY"),
        env_optional("SIMULATION_NETWORK_ID"),
    ) {
        (Some(api_url), Some(access_key), Some(network_id)) => Some(SimulationConfig {
            api_url,
            access_key,
            network_id,
            timeout_ms: env_or("SIMULATION_TIMEOUT_MS", 2_000u64)?,
        }),
        _ => None,
    };

    let config = WatcherConfig {
        ws_url: env_required("WS_URL")?,
        chain_id: env_required("CHAIN_ID")?.parse().context("Invalid CHAIN_ID")?,
        private_key: env_required("PRIVATE_KEY")?,

        stealth_vault: parse_address("STEALTH_VAULT", &env_required("STEALTH_VAULT")?)?,
        stealth_relayer: parse_address("STEALTH_RELAYER", &env_required("STEALTH_RELAYER")?)?,

        authorization: env_or("AUTHORIZATION_TARGET", AuthorizationTarget::Relayer)?,
        reporter_reward_divisor: env_or("REPORTER_REWARD_DIVISOR", DEFAULT_REPORTER_REWARD_DIVISOR)?,

        pending_source: env_or("PENDING_SOURCE", PendingSourceMode::Filtered)?,
        tx_fetch_timeout_ms: env_or("TX_FETCH_TIMEOUT_MS", DEFAULT_TX_FETCH_TIMEOUT_MS)?,
        aliveness_timeout_ms: env_or("ALIVENESS_TIMEOUT_MS", DEFAULT_ALIVENESS_TIMEOUT_MS)?,
        hash_source: env_or("HASH_SOURCE", HashSource::Calldata)?,
        simulation,

        gas_feed_url: env_optional("GAS_FEED_URL"),
        gas_markup_numerator: env_or("GAS_MARKUP_NUMERATOR", DEFAULT_MARKUP_NUMERATOR)?,
        gas_markup_denominator: env_or("GAS_MARKUP_DENOMINATOR", DEFAULT_MARKUP_DENOMINATOR)?,
        max_gas_price_gwei: env_or("MAX_GAS_PRICE_GWEI", DEFAULT_MAX_GAS_PRICE_GWEI)?,
        report_gas_limit: env_or("REPORT_GAS_LIMIT", DEFAULT_REPORT_GAS_LIMIT)?,

        journal_dir: env_optional("JOURNAL_DIR"),
        dry_run: env_or("DRY_RUN", false)?,
    };

    validate(&config)?;
    Ok(config)
}

// ── TOML ────────────────────────────────────────────────────────────

/// TOML layout. Addresses stay strings until validation so that a bad
/// address produces a readable error instead of a serde one.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub network: NetworkSection,
    pub contracts: ContractsSection,
    #[serde(default)]
    pub watcher: WatcherSection,
    #[serde(default)]
    pub report: ReportSection,
    pub simulation: Option<SimulationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    pub ws_url: String,
    pub chain_id: u64,
    /// Falls back to the PRIVATE_KEY environment variable when omitted
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsSection {
    pub stealth_vault: String,
    pub stealth_relayer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherSection {
    #[serde(default = "default_authorization")]
    pub authorization: AuthorizationTarget,
    #[serde(default = "default_pending_source")]
    pub pending_source: PendingSourceMode,
    #[serde(default = "default_tx_fetch_timeout")]
    pub tx_fetch_timeout_ms: u64,
    #[serde(default = "default_aliveness_timeout")]
    pub aliveness_timeout_ms: u64,
    #[serde(default = "default_hash_source")]
    pub hash_source: HashSource,
    #[serde(default = "default_reward_divisor")]
    pub reporter_reward_divisor: u64,
    pub journal_dir: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            authorization: default_authorization(),
            pending_source: default_pending_source(),
            tx_fetch_timeout_ms: default_tx_fetch_timeout(),
            aliveness_timeout_ms: default_aliveness_timeout(),
            hash_source: default_hash_source(),
            reporter_reward_divisor: default_reward_divisor(),
            journal_dir: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSection {
    pub gas_feed_url: Option<String>,
    #[serde(default = "default_markup_numerator")]
    pub gas_markup_numerator: u64,
    #[serde(default = "default_markup_denominator")]
    pub gas_markup_denominator: u64,
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: u64,
    #[serde(default = "default_report_gas_limit")]
    pub report_gas_limit: u64,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            gas_feed_url: None,
            gas_markup_numerator: default_markup_numerator(),
            gas_markup_denominator: default_markup_denominator(),
            max_gas_price_gwei: default_max_gas_price(),
            report_gas_limit: default_report_gas_limit(),
        }
    }
}

fn default_authorization() -> AuthorizationTarget { AuthorizationTarget::Relayer }
fn default_pending_source() -> PendingSourceMode { PendingSourceMode::Filtered }
fn default_tx_fetch_timeout() -> u64 { DEFAULT_TX_FETCH_TIMEOUT_MS }
fn default_aliveness_timeout() -> u64 { DEFAULT_ALIVENESS_TIMEOUT_MS }
fn default_hash_source() -> HashSource { HashSource::Calldata }
fn default_reward_divisor() -> u64 { DEFAULT_REPORTER_REWARD_DIVISOR }
fn default_markup_numerator() -> u64 { DEFAULT_MARKUP_NUMERATOR }
fn default_markup_denominator() -> u64 { DEFAULT_MARKUP_DENOMINATOR }
fn default_max_gas_price() -> u64 { DEFAULT_MAX_GAS_PRICE_GWEI }
fn default_report_gas_limit() -> u64 { DEFAULT_REPORT_GAS_LIMIT }

impl TomlConfig {
    pub fn into_watcher_config(self) -> Result<WatcherConfig> {
        let private_key = match self.network.private_key {
            Some(key) => key,
            None => env_required("PRIVATE_KEY")?,
        };

        let config = WatcherConfig {
            ws_url: self.network.ws_url,
            chain_id: self.network.chain_id,
            private_key,
            stealth_vault: parse_address("contracts.stealth_vault", &self.contracts.stealth_vault)?,
            stealth_relayer: parse_address(
                "contracts.stealth_relayer",
                &self.contracts.stealth_relayer,
            )?,
            authorization: self.watcher.authorization,
            reporter_reward_divisor: self.watcher.reporter_reward_divisor,
            pending_source: self.watcher.pending_source,
            tx_fetch_timeout_ms: self.watcher.tx_fetch_timeout_ms,
            aliveness_timeout_ms: self.watcher.aliveness_timeout_ms,
            hash_source: self.watcher.hash_source,
            simulation: self.simulation,
            gas_feed_url: self.report.gas_feed_url,
            gas_markup_numerator: self.report.gas_markup_numerator,
            gas_markup_denominator: self.report.gas_markup_denominator,
            max_gas_price_gwei: self.report.max_gas_price_gwei,
            report_gas_limit: self.report.report_gas_limit,
            journal_dir: self.watcher.journal_dir,
            dry_run: self.watcher.dry_run,
        };

        validate(&config)?;
        Ok(config)
    }
}

/// Load configuration from a TOML file
pub fn load_config_toml<P: AsRef<Path>>(path: P) -> Result<WatcherConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let parsed: TomlConfig =
        toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

    parsed.into_watcher_config()
}

fn validate(config: &WatcherConfig) -> Result<()> {
    if config.gas_markup_denominator == 0 {
        bail!("GAS_MARKUP_DENOMINATOR must be non-zero");
    }
    if config.gas_markup_numerator < config.gas_markup_denominator {
        bail!(
            "Gas markup {}/{} would underprice the leaked transaction",
            config.gas_markup_numerator,
            config.gas_markup_denominator
        );
    }
    if config.reporter_reward_divisor == 0 {
        bail!("REPORTER_REWARD_DIVISOR must be non-zero");
    }
    if config.report_gas_limit == 0 {
        bail!("REPORT_GAS_LIMIT must be non-zero");
    }
    if config.hash_source == HashSource::Trace && config.simulation.is_none() {
        bail!("HASH_SOURCE=trace requires a simulation endpoint");
    }
    if config.stealth_vault == config.stealth_relayer {
        bail!("STEALTH_VAULT and STEALTH_RELAYER must differ");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[network]
ws_url = "wss://example.invalid/ws"
chain_id = 1
private_key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"

[contracts]
stealth_vault = "0xC454F4E1DDB39c8De9663287D52b0E4Feb4cA45E"
stealth_relayer = "0x0a61c2146A7800bdC278833F21EBf56Cd660EE2a"
"#;

    #[test]
    fn test_parse_toml_defaults() {
        let parsed: TomlConfig = toml::from_str(MINIMAL).unwrap();
        let config = parsed.into_watcher_config().unwrap();

        assert_eq!(config.authorization, AuthorizationTarget::Relayer);
        assert_eq!(config.pending_source, PendingSourceMode::Filtered);
        assert_eq!(config.gas_markup_numerator, 4);
        assert_eq!(config.gas_markup_denominator, 3);
        assert_eq!(config.report_gas_limit, 1_000_000);
        assert_eq!(config.aliveness_timeout_ms, 5_000);
        assert_eq!(config.reporter_reward_divisor, 10);
        assert!(!config.dry_run);
        assert!(config.simulation.is_none());
    }

    #[test]
    fn test_addresses_are_case_insensitive() {
        let lower = MINIMAL.replace(
            "0xC454F4E1DDB39c8De9663287D52b0E4Feb4cA45E",
            "0xc454f4e1ddb39c8de9663287d52b0e4feb4ca45e",
        );
        let a = toml::from_str::<TomlConfig>(MINIMAL).unwrap().into_watcher_config().unwrap();
        let b = toml::from_str::<TomlConfig>(&lower).unwrap().into_watcher_config().unwrap();
        assert_eq!(a.stealth_vault, b.stealth_vault);
    }

    #[test]
    fn test_trace_hash_source_requires_simulation() {
        let toml_str = format!("{}\n[watcher]\nhash_source = \"trace\"\n", MINIMAL);
        let parsed: TomlConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.into_watcher_config().is_err());
    }

    #[test]
    fn test_markup_below_one_rejected() {
        let toml_str = format!(
            "{}\n[report]\ngas_markup_numerator = 1\ngas_markup_denominator = 2\n",
            MINIMAL
        );
        let parsed: TomlConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.into_watcher_config().is_err());
    }

    #[test]
    fn test_job_authorization_and_simulation() {
        let toml_str = format!(
            r#"{}
[watcher]
authorization = "job"
hash_source = "trace"

[simulation]
api_url = "https://api.example.invalid/simulate"
access_key = "key"
network_id = "1"
"#,
            MINIMAL
        );
        let parsed: TomlConfig = toml::from_str(&toml_str).unwrap();
        let config = parsed.into_watcher_config().unwrap();
        assert_eq!(config.authorization, AuthorizationTarget::Job);
        assert_eq!(config.simulation.unwrap().timeout_ms, 2_000);
    }
}
