//! Simulation Preflight
//!
//! Purpose:
//!     Run a candidate through a Tenderly-style simulate endpoint before
//!     reporting it. A simulation that reverts, or that has no call trace
//!     (contract creation), makes the candidate ineligible.
//!
//! Trace hash source:
//!     When the stealth hash is taken from the trace instead of calldata,
//!     the simulated execution must call into the vault and the vault must
//!     emit `ValidatedHash`; its `_hash` topic is the hash to report.
//!
//! Notes:
//!     - A simulation HTTP failure is a transient per-candidate error
//!     - Request body mirrors the `quick` simulation type, saved on failure

use alloy::primitives::{Address, Bytes, LogData, B256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::contracts::IStealthVault;
use crate::error::{Result, WatcherError};
use crate::types::{PendingTransaction, SimulationConfig};

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct SimulationRequest {
    network_id: String,
    from: Address,
    to: Option<Address>,
    input: Bytes,
    gas: u64,
    gas_price: String,
    value: String,
    save: bool,
    save_if_fails: bool,
    simulation_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulationResponse {
    transaction: SimulatedTransaction,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulatedTransaction {
    #[serde(default)]
    status: bool,
    transaction_info: Option<TransactionInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionInfo {
    call_trace: Option<CallTrace>,
    #[serde(default)]
    logs: Option<Vec<SimulatedLog>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CallTrace {
    calls: Option<Vec<TraceCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulatedLog {
    raw: RawLog,
}

/// One sub-call in the simulated call trace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceCall {
    pub from: Address,
    pub to: Address,
}

/// One log emitted during simulation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

/// What the watcher needs from a simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    /// false when the simulated execution reverted
    pub status: bool,
    /// None when the trace has no sub-calls (contract creation)
    pub calls: Option<Vec<TraceCall>>,
    pub logs: Vec<RawLog>,
}

impl From<SimulationResponse> for SimulationOutcome {
    fn from(resp: SimulationResponse) -> Self {
        let info = resp.transaction.transaction_info;
        let (calls, logs) = match info {
            Some(info) => (
                info.call_trace.and_then(|t| t.calls),
                info.logs
                    .unwrap_or_default()
                    .into_iter()
                    .map(|l| l.raw)
                    .collect(),
            ),
            None => (None, Vec::new()),
        };
        Self {
            status: resp.transaction.status,
            calls,
            logs,
        }
    }
}

// ── Preflight ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightFailure {
    Reverted,
    ContractCreation,
}

impl fmt::Display for PreflightFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PreflightFailure::Reverted => write!(f, "simulation reverted"),
            PreflightFailure::ContractCreation => write!(f, "no call trace (contract creation)"),
        }
    }
}

pub fn preflight(outcome: &SimulationOutcome) -> std::result::Result<(), PreflightFailure> {
    if !outcome.status {
        return Err(PreflightFailure::Reverted);
    }
    if outcome.calls.is_none() {
        return Err(PreflightFailure::ContractCreation);
    }
    Ok(())
}

/// Recover the stealth hash from a simulated trace.
///
/// Requires a sub-call into the vault and a `ValidatedHash` log emitted by
/// the vault; anything else yields None.
pub fn extract_from_trace(outcome: &SimulationOutcome, vault: Address) -> Option<B256> {
    let calls = outcome.calls.as_ref()?;
    if !calls.iter().any(|c| c.to == vault) {
        debug!("Simulated trace never reaches the vault");
        return None;
    }

    outcome
        .logs
        .iter()
        .filter(|log| log.address == vault)
        .filter(|log| log.topics.first() == Some(&IStealthVault::ValidatedHash::SIGNATURE_HASH))
        .find_map(|log| {
            let data = LogData::new_unchecked(log.topics.clone(), log.data.clone());
            IStealthVault::ValidatedHash::decode_log_data(&data)
                .ok()
                .map(|ev| ev._hash)
        })
}

// ── Simulators ──────────────────────────────────────────────────────

#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, tx: &PendingTransaction) -> Result<SimulationOutcome>;
}

/// HTTP client for a Tenderly simulate endpoint
pub struct TenderlySimulator {
    config: SimulationConfig,
    client: reqwest::Client,
}

impl TenderlySimulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| WatcherError::Simulation(format!("http client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn request(&self, tx: &PendingTransaction) -> SimulationRequest {
        SimulationRequest {
            network_id: self.config.network_id.clone(),
            from: tx.from,
            to: tx.to,
            input: tx.input.clone(),
            gas: tx.gas_limit,
            gas_price: tx.gas_price.to_string(),
            value: tx.value.to_string(),
            save: true,
            save_if_fails: true,
            simulation_type: "quick",
        }
    }
}

#[async_trait]
impl Simulator for TenderlySimulator {
    async fn simulate(&self, tx: &PendingTransaction) -> Result<SimulationOutcome> {
        let resp = self
            .client
            .post(&self.config.api_url)
            .header("X-Access-Key", &self.config.access_key)
            .json(&self.request(tx))
            .send()
            .await
            .map_err(|e| WatcherError::Simulation(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WatcherError::Simulation(format!("HTTP {}", status)));
        }

        let body: SimulationResponse = resp
            .json()
            .await
            .map_err(|e| WatcherError::Simulation(format!("bad response: {}", e)))?;
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use serde_json::json;

    const VAULT: Address = Address::repeat_byte(0xaa);
    const RELAYER: Address = Address::repeat_byte(0xbb);

    fn validated_log(emitter: Address) -> serde_json::Value {
        let ev = IStealthVault::ValidatedHash {
            _hash: B256::repeat_byte(0x42),
            _caller: Address::repeat_byte(1),
            _penalty: U256::from(1_000u64),
        };
        let data = ev.encode_log_data();
        json!({
            "raw": {
                "address": emitter,
                "topics": data.topics(),
                "data": data.data,
            }
        })
    }

    fn parse(value: serde_json::Value) -> SimulationOutcome {
        serde_json::from_value::<SimulationResponse>(value).unwrap().into()
    }

    #[test]
    fn test_successful_trace_yields_validated_hash() {
        let outcome = parse(json!({
            "transaction": {
                "status": true,
                "transaction_info": {
                    "call_trace": { "calls": [ { "from": RELAYER, "to": VAULT } ] },
                    "logs": [ validated_log(VAULT) ]
                }
            }
        }));
        assert_eq!(preflight(&outcome), Ok(()));
        assert_eq!(extract_from_trace(&outcome, VAULT), Some(B256::repeat_byte(0x42)));
    }

    #[test]
    fn test_reverted_simulation_fails_preflight() {
        let outcome = parse(json!({
            "transaction": {
                "status": false,
                "transaction_info": { "call_trace": { "calls": [] }, "logs": null }
            }
        }));
        assert_eq!(preflight(&outcome), Err(PreflightFailure::Reverted));
    }

    #[test]
    fn test_missing_calls_is_contract_creation() {
        let outcome = parse(json!({
            "transaction": {
                "status": true,
                "transaction_info": { "call_trace": { "calls": null } }
            }
        }));
        assert_eq!(preflight(&outcome), Err(PreflightFailure::ContractCreation));
        assert_eq!(extract_from_trace(&outcome, VAULT), None);
    }

    #[test]
    fn test_log_from_other_emitter_is_ignored() {
        let outcome = parse(json!({
            "transaction": {
                "status": true,
                "transaction_info": {
                    "call_trace": { "calls": [ { "from": RELAYER, "to": VAULT } ] },
                    "logs": [ validated_log(RELAYER) ]
                }
            }
        }));
        assert_eq!(extract_from_trace(&outcome, VAULT), None);
    }

    #[test]
    fn test_trace_without_vault_call_yields_nothing() {
        let outcome = parse(json!({
            "transaction": {
                "status": true,
                "transaction_info": {
                    "call_trace": { "calls": [ { "from": RELAYER, "to": Address::repeat_byte(3) } ] },
                    "logs": [ validated_log(VAULT) ]
                }
            }
        }));
        assert_eq!(extract_from_trace(&outcome, VAULT), None);
    }
}
