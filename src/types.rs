// Core data structures shared by the watcher pipeline

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which address a caller must have enabled for a candidate to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationTarget {
    /// Caller must have enabled the relayer itself as a stealth contract
    Relayer,
    /// Caller must have enabled the `_job` decoded from the relayer calldata
    Job,
}

impl FromStr for AuthorizationTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relayer" => Ok(Self::Relayer),
            "job" => Ok(Self::Job),
            other => Err(format!("unknown authorization target '{}'", other)),
        }
    }
}

/// How pending transactions are obtained from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingSourceMode {
    /// Provider-side `toAddress` filter, full transaction bodies pushed
    Filtered,
    /// Plain pending hashes; each body fetched with a bounded timeout
    Hashes,
}

impl FromStr for PendingSourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filtered" => Ok(Self::Filtered),
            "hashes" => Ok(Self::Hashes),
            other => Err(format!("unknown pending source '{}'", other)),
        }
    }
}

/// Where the stealth hash is recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashSource {
    Calldata,
    /// `ValidatedHash` log in the simulated call trace (needs simulation)
    Trace,
}

impl FromStr for HashSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calldata" => Ok(Self::Calldata),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown hash source '{}'", other)),
        }
    }
}

/// Tenderly-style simulation endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub api_url: String,
    pub access_key: String,
    pub network_id: String,
    #[serde(default = "default_simulation_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_simulation_timeout_ms() -> u64 {
    2_000
}

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    // Network
    pub ws_url: String,
    pub chain_id: u64,

    // Reporter credential
    pub private_key: String,

    // Protocol contracts
    pub stealth_vault: Address,
    pub stealth_relayer: Address,

    // Eligibility
    pub authorization: AuthorizationTarget,
    pub reporter_reward_divisor: u64,

    // Mempool
    pub pending_source: PendingSourceMode,
    pub tx_fetch_timeout_ms: u64,
    pub aliveness_timeout_ms: u64,
    pub hash_source: HashSource,
    pub simulation: Option<SimulationConfig>,

    // Report pricing
    pub gas_feed_url: Option<String>,
    pub gas_markup_numerator: u64,
    pub gas_markup_denominator: u64,
    pub max_gas_price_gwei: u64,
    pub report_gas_limit: u64,

    // Output
    pub journal_dir: Option<String>,
    pub dry_run: bool,
}

/// A transaction seen in the mempool. Lives for one processing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub from: Address,
    /// None for contract creation
    pub to: Option<Address>,
    pub gas_limit: u64,
    /// Legacy gas price, or max fee per gas for EIP-1559 transactions
    pub gas_price: u128,
    pub input: Bytes,
    pub nonce: u64,
    pub value: U256,
}

impl PendingTransaction {
    /// Convert an RPC transaction into the watcher's observation type.
    pub fn from_rpc(tx: &alloy::rpc::types::Transaction) -> Self {
        use alloy::consensus::Transaction as _;

        let envelope: &alloy::consensus::TxEnvelope = &tx.inner;
        Self {
            hash: *envelope.tx_hash(),
            from: tx.inner.signer(),
            to: envelope.to(),
            gas_limit: envelope.gas_limit(),
            gas_price: envelope
                .gas_price()
                .unwrap_or_else(|| envelope.max_fee_per_gas()),
            input: envelope.input().clone(),
            nonce: envelope.nonce(),
            value: envelope.value(),
        }
    }
}

/// One tick of the external gas price feed, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    pub rapid: u64,
    pub fast: u64,
    pub standard: u64,
    pub slow: u64,
}

/// The four relayer entry points that carry a stealth hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StealthMethod {
    Execute,
    ExecuteAndPay,
    ExecuteWithoutBlockProtection,
    ExecuteWithoutBlockProtectionAndPay,
}

impl StealthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            StealthMethod::Execute => "execute",
            StealthMethod::ExecuteAndPay => "executeAndPay",
            StealthMethod::ExecuteWithoutBlockProtection => "executeWithoutBlockProtection",
            StealthMethod::ExecuteWithoutBlockProtectionAndPay => {
                "executeWithoutBlockProtectionAndPay"
            }
        }
    }
}

impl fmt::Display for StealthMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded hash-bearing relayer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthCall {
    pub method: StealthMethod,
    pub job: Address,
    pub stealth_hash: B256,
    /// Target block for block-protected variants
    pub block_number: Option<U256>,
}

/// Transient unit of work created by the reporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportAttempt {
    pub stealth_hash: B256,
    /// Mempool transaction that leaked the hash
    pub source_tx: TxHash,
    pub caller: Address,
    pub observed_gas_price: u128,
    pub report_gas_price: u128,
    pub gas_limit: u64,
    pub nonce: u64,
}

/// Result of handing one report to the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// Broadcast accepted by the node; inclusion still pending
    Broadcast { tx_hash: TxHash },
    /// Dry-run: built and priced but never sent
    DryRun,
    /// Node rejected the raw transaction
    Rejected { reason: String },
    /// Receipt observed, call succeeded
    Included {
        tx_hash: TxHash,
        block_number: Option<u64>,
    },
    /// Receipt observed, call reverted (another report landed first, or the
    /// hash was already spent)
    Reverted {
        tx_hash: TxHash,
        block_number: Option<u64>,
    },
}
