//! Watcher Pipeline
//!
//! Purpose:
//!     Drive every pending transaction through
//!     filter → (simulation preflight) → hash extraction → report.
//!
//! Notes:
//!     - One transaction at a time, in arrival order. The registry is read
//!       through a short read lock per classification; registry events land
//!       between transactions, never during one.
//!     - Per-candidate failures (simulation HTTP, undecodable calldata,
//!       signing) are logged and the candidate is dropped.
//!     - The stream ending is fatal: `run` returns `StreamEnded`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::aliveness::AlivenessMonitor;
use crate::error::{Result, WatcherError};
use crate::mempool::{
    decoder, extract_from_trace, preflight, Classification, EligibilityFilter, IneligibleReason,
    PendingStream, PreflightFailure, SimulationOutcome, Simulator,
};
use crate::registry::RegistryMirror;
use crate::reporter::Reporter;
use crate::types::{HashSource, PendingTransaction, ReportOutcome};

/// What happened to one pending transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ineligible(IneligibleReason),
    /// Simulation request itself failed; candidate dropped
    SimulationFailed(String),
    Preflight(PreflightFailure),
    /// Eligible sender, but no stealth hash could be recovered
    NotHashBearing,
    Reported(ReportOutcome),
    /// Report could not be built or signed
    ReportFailed(String),
}

#[derive(Debug, Default)]
pub struct WatcherStats {
    pub seen: AtomicU64,
    pub candidates: AtomicU64,
    pub reported: AtomicU64,
}

impl WatcherStats {
    pub fn summary(&self) -> (u64, u64, u64) {
        (
            self.seen.load(Ordering::Relaxed),
            self.candidates.load(Ordering::Relaxed),
            self.reported.load(Ordering::Relaxed),
        )
    }
}

pub struct Watcher {
    mirror: RegistryMirror,
    filter: EligibilityFilter,
    vault: Address,
    hash_source: HashSource,
    simulator: Option<Arc<dyn Simulator>>,
    reporter: Arc<Reporter>,
    aliveness: AlivenessMonitor,
    stats: WatcherStats,
}

impl Watcher {
    pub fn new(
        mirror: RegistryMirror,
        filter: EligibilityFilter,
        vault: Address,
        reporter: Arc<Reporter>,
        aliveness: AlivenessMonitor,
    ) -> Self {
        Self {
            mirror,
            filter,
            vault,
            hash_source: HashSource::Calldata,
            simulator: None,
            reporter,
            aliveness,
            stats: WatcherStats::default(),
        }
    }

    /// Enable the simulation preflight, optionally taking the hash from the trace
    pub fn with_simulator(mut self, simulator: Arc<dyn Simulator>, hash_source: HashSource) -> Self {
        self.simulator = Some(simulator);
        self.hash_source = hash_source;
        self
    }

    pub fn stats(&self) -> &WatcherStats {
        &self.stats
    }

    /// Consume the pending stream until it ends
    pub async fn run(&self, mut stream: PendingStream) -> Result<()> {
        info!(
            "Watching relayer {:?} | hash_source={:?} | simulation={}",
            self.filter.relayer(),
            self.hash_source,
            self.simulator.is_some()
        );

        while let Some(tx) = stream.next().await {
            self.aliveness.touch();
            self.handle(tx).await;
        }

        let (seen, candidates, reported) = self.stats.summary();
        error!(
            "Pending stream ended | seen={} | candidates={} | reported={}",
            seen, candidates, reported
        );
        Err(WatcherError::StreamEnded)
    }

    /// Process one pending transaction end to end
    pub async fn handle(&self, tx: PendingTransaction) -> Verdict {
        self.stats.seen.fetch_add(1, Ordering::Relaxed);

        // 1. Eligibility against the current registry view
        let classification = self.mirror.read(|state| self.filter.classify(&tx, state));
        if let Classification::Ineligible(reason) = classification {
            debug!("Skip {:?} | from={:?} | {}", tx.hash, tx.from, reason);
            return Verdict::Ineligible(reason);
        }
        self.stats.candidates.fetch_add(1, Ordering::Relaxed);
        info!(
            "CANDIDATE | tx={:?} | from={:?} | selector={} | gas_price={}",
            tx.hash,
            tx.from,
            decoder::selector_hex(&tx.input),
            tx.gas_price
        );

        // 2. Optional simulation preflight
        let simulation = match &self.simulator {
            Some(simulator) => match simulator.simulate(&tx).await {
                Ok(outcome) => {
                    if let Err(failure) = preflight(&outcome) {
                        info!("Drop {:?} | {}", tx.hash, failure);
                        return Verdict::Preflight(failure);
                    }
                    Some(outcome)
                }
                Err(e) => {
                    warn!("Simulation failed for {:?}: {}", tx.hash, e);
                    return Verdict::SimulationFailed(e.to_string());
                }
            },
            None => None,
        };

        // 3. Stealth hash
        let hash = match self.stealth_hash(&tx, simulation.as_ref()) {
            Some(hash) => hash,
            None => {
                info!(
                    "Drop {:?} | not a hash-bearing call ({})",
                    tx.hash,
                    decoder::selector_hex(&tx.input)
                );
                return Verdict::NotHashBearing;
            }
        };

        // 4. Race the original to inclusion
        match self.reporter.report(hash, &tx).await {
            Ok(outcome) => {
                if !matches!(outcome, ReportOutcome::Rejected { .. }) {
                    self.stats.reported.fetch_add(1, Ordering::Relaxed);
                }
                Verdict::Reported(outcome)
            }
            Err(e) => {
                error!("Report for {:?} failed before broadcast: {}", hash, e);
                Verdict::ReportFailed(e.to_string())
            }
        }
    }

    fn stealth_hash(&self, tx: &PendingTransaction, simulation: Option<&SimulationOutcome>) -> Option<B256> {
        match (self.hash_source, simulation) {
            (HashSource::Trace, Some(outcome)) => extract_from_trace(outcome, self.vault),
            (HashSource::Trace, None) => None,
            (HashSource::Calldata, _) => decoder::extract(&tx.input).map(|call| {
                debug!("Decoded {} | job={:?} | hash={:?}", call.method, call.job, call.stealth_hash);
                call.stealth_hash
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IStealthRelayer::{executeCall, executeWithoutBlockProtectionCall};
    use crate::contracts::IStealthVault::reportHashCall;
    use crate::gas_oracle::GasPriceOracle;
    use crate::mempool::simulator::{RawLog, TraceCall};
    use crate::mempool::ChannelPendingSource;
    use crate::mempool::PendingTransactionSource;
    use crate::registry::{RegistryEvent, RegistryState};
    use crate::reporter::tests::{source_tx, test_config, RecordingSubmitter};
    use crate::reporter::{NonceManager, GWEI};
    use crate::types::{AuthorizationTarget, PendingSourceMode};
    use alloy::consensus::Transaction as _;
    use alloy::primitives::{Bytes, TxHash, U256};
    use alloy::signers::local::PrivateKeySigner;
    use alloy::sol_types::{SolCall, SolEvent};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    fn relayer() -> Address {
        test_config().stealth_relayer
    }

    fn vault() -> Address {
        test_config().stealth_vault
    }

    fn caller() -> Address {
        Address::repeat_byte(0x01)
    }

    fn eth_frac(num: u128, den: u128) -> U256 {
        U256::from(ETHER * num / den)
    }

    /// Mirror with `caller` authorized for the relayer and a job
    fn mirror(bonded: U256, penalty: U256) -> RegistryMirror {
        let mut state = RegistryState::new(10);
        state
            .apply(&RegistryEvent::ContractsEnabled {
                caller: caller(),
                contracts: vec![relayer(), Address::repeat_byte(0x10)],
            })
            .unwrap();
        state.apply(&RegistryEvent::Bonded { caller: caller(), amount: bonded }).unwrap();
        state.apply(&RegistryEvent::PenaltySet { penalty }).unwrap();
        RegistryMirror::new(state)
    }

    fn stealth_tx(from: Address, hash: B256, gas_price: u128) -> PendingTransaction {
        let mut tx = source_tx(gas_price);
        tx.from = from;
        tx.to = Some(relayer());
        tx.input = executeCall {
            _job: Address::repeat_byte(0x10),
            _callData: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            _stealthHash: hash,
            _blockNumber: U256::from(12_345_678u64),
        }
        .abi_encode()
        .into();
        tx
    }

    fn watcher(mirror: RegistryMirror, submitter: Arc<RecordingSubmitter>) -> Watcher {
        let config = test_config();
        let reporter = Reporter::new(
            &config,
            PrivateKeySigner::random(),
            NonceManager::new(0),
            GasPriceOracle::disabled(),
            submitter,
            None,
        );
        Watcher::new(
            mirror,
            EligibilityFilter::new(relayer(), AuthorizationTarget::Relayer),
            vault(),
            Arc::new(reporter),
            AlivenessMonitor::new(0),
        )
    }

    fn reported_hashes(submitter: &RecordingSubmitter) -> Vec<B256> {
        submitter
            .decoded()
            .iter()
            .map(|tx| reportHashCall::abi_decode(tx.input()).unwrap()._hash)
            .collect()
    }

    #[tokio::test]
    async fn test_bonded_authorized_caller_is_reported() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone());
        let hash = B256::repeat_byte(0x48);

        let verdict = w.handle(stealth_tx(caller(), hash, 30 * GWEI)).await;
        assert!(matches!(verdict, Verdict::Reported(ReportOutcome::Broadcast { .. })));

        let sent = submitter.decoded();
        assert_eq!(sent.len(), 1);
        assert_eq!(reported_hashes(&submitter), vec![hash]);
        assert_eq!(sent[0].to(), Some(vault()));
        assert!(sent[0].gas_price().unwrap() >= 30 * GWEI * 4 / 3);
    }

    #[tokio::test]
    async fn test_underbonded_caller_is_not_reported() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 2), eth_frac(1, 1)), submitter.clone());

        let verdict = w.handle(stealth_tx(caller(), B256::repeat_byte(0x48), 30 * GWEI)).await;
        assert!(matches!(
            verdict,
            Verdict::Ineligible(IneligibleReason::InsufficientBond { .. })
        ));
        assert!(submitter.decoded().is_empty());
    }

    #[tokio::test]
    async fn test_bond_event_for_new_caller_applies_before_next_candidate() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let registry = mirror(eth_frac(1, 1), eth_frac(1, 1));
        let w = watcher(registry.clone(), submitter.clone());
        let newcomer = Address::repeat_byte(0x0d);

        // enabled the relayer earlier, never bonded
        registry
            .apply(&RegistryEvent::ContractsEnabled { caller: newcomer, contracts: vec![relayer()] })
            .unwrap();
        let before = w.handle(stealth_tx(newcomer, B256::repeat_byte(1), GWEI)).await;
        assert!(matches!(
            before,
            Verdict::Ineligible(IneligibleReason::InsufficientBond { .. })
        ));

        registry
            .apply(&RegistryEvent::Bonded { caller: newcomer, amount: eth_frac(2, 1) })
            .unwrap();
        let after = w.handle(stealth_tx(newcomer, B256::repeat_byte(2), GWEI)).await;
        assert!(matches!(after, Verdict::Reported(_)));
        assert_eq!(reported_hashes(&submitter), vec![B256::repeat_byte(2)]);
    }

    #[tokio::test]
    async fn test_unknown_caller_and_other_destinations_are_skipped() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone());

        let stranger = w.handle(stealth_tx(Address::repeat_byte(0x77), B256::ZERO, GWEI)).await;
        assert_eq!(stranger, Verdict::Ineligible(IneligibleReason::UnknownCaller));

        let mut elsewhere = stealth_tx(caller(), B256::ZERO, GWEI);
        elsewhere.to = Some(vault());
        assert!(matches!(
            w.handle(elsewhere).await,
            Verdict::Ineligible(IneligibleReason::WrongDestination(_))
        ));
        assert!(submitter.decoded().is_empty());
    }

    #[tokio::test]
    async fn test_non_hash_bearing_call_is_dropped() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone());

        let mut tx = stealth_tx(caller(), B256::ZERO, GWEI);
        tx.input = Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0, 0, 0]);
        assert_eq!(w.handle(tx).await, Verdict::NotHashBearing);
        assert!(submitter.decoded().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_leaks_are_each_reported() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone());
        let hash = B256::repeat_byte(0x33);

        w.handle(stealth_tx(caller(), hash, 20 * GWEI)).await;
        w.handle(stealth_tx(caller(), hash, 25 * GWEI)).await;

        let sent = submitter.decoded();
        assert_eq!(reported_hashes(&submitter), vec![hash, hash]);
        assert_eq!(sent[1].nonce(), sent[0].nonce() + 1);
    }

    #[tokio::test]
    async fn test_run_ends_with_stream_ended() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone());

        let (tx, source) = ChannelPendingSource::new(4);
        tx.send(stealth_tx(caller(), B256::repeat_byte(7), GWEI)).await.unwrap();
        drop(tx);

        let result = w.run(source.subscribe().await.unwrap()).await;
        assert!(matches!(result, Err(WatcherError::StreamEnded)));
        assert_eq!(w.stats().summary(), (1, 1, 1));
        assert_eq!(reported_hashes(&submitter), vec![B256::repeat_byte(7)]);
    }

    // ── Aliveness ───────────────────────────────────────────────────

    const DEFAULTS_TOML: &str = r#"
[network]
ws_url = "wss://node.invalid/ws"
chain_id = 1
private_key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"

[contracts]
stealth_vault = "0xC454F4E1DDB39c8De9663287D52b0E4Feb4cA45E"
stealth_relayer = "0x0a61c2146A7800bdC278833F21EBf56Cd660EE2a"
"#;

    #[tokio::test(start_paused = true)]
    async fn test_filtered_defaults_survive_a_quiet_relayer() {
        let dir = std::env::temp_dir().join(format!("stealth_watcher_defaults_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("watcher.toml");
        std::fs::write(&path, DEFAULTS_TOML).unwrap();
        let config = crate::config::load_config_toml(&path).unwrap();
        assert_eq!(config.pending_source, PendingSourceMode::Filtered);
        assert!(config.aliveness_timeout_ms > 0);

        let aliveness = AlivenessMonitor::new(config.aliveness_timeout_ms);
        let reporter = Reporter::new(
            &config,
            PrivateKeySigner::random(),
            NonceManager::new(0),
            GasPriceOracle::disabled(),
            Arc::new(RecordingSubmitter::default()),
            None,
        );
        let w = Arc::new(Watcher::new(
            mirror(eth_frac(1, 1), eth_frac(1, 1)),
            EligibilityFilter::new(config.stealth_relayer, config.authorization),
            config.stealth_vault,
            Arc::new(reporter),
            aliveness.clone(),
        ));

        // relayer-bound subscription: open, but nothing addressed to the relayer
        let (_relayer_feed, source) = ChannelPendingSource::new(1);
        let stream = source.subscribe().await.unwrap();
        let pipeline = {
            let w = w.clone();
            tokio::spawn(async move { w.run(stream).await })
        };

        // unfiltered mempool announcements keep flowing on a healthy session
        let (hash_tx, hash_rx) = mpsc::channel(8);
        let heartbeat = {
            let aliveness = aliveness.clone();
            tokio::spawn(async move { aliveness.watch(ReceiverStream::new(hash_rx)).await })
        };
        let announcer = tokio::spawn(async move {
            for byte in 0..120u8 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                if hash_tx.send(TxHash::repeat_byte(byte)).await.is_err() {
                    break;
                }
            }
        });

        tokio::select! {
            r = aliveness.run() => panic!("watchdog fired on a quiet relayer: {:?}", r),
            _ = tokio::time::sleep(Duration::from_secs(50)) => {}
        }
        assert_eq!(w.stats().summary(), (0, 0, 0));

        // once announcements stop the watchdog still catches it
        announcer.await.unwrap();
        let err = tokio_test::assert_err!(aliveness.run().await);
        assert!(matches!(err, WatcherError::AlivenessTimeout(5_000)));

        pipeline.abort();
        heartbeat.abort();
        let _ = std::fs::remove_dir_all(&dir);
    }

    // ── Simulation ──────────────────────────────────────────────────

    struct FixedSimulator(Result<SimulationOutcome>);

    #[async_trait]
    impl Simulator for FixedSimulator {
        async fn simulate(&self, _tx: &PendingTransaction) -> Result<SimulationOutcome> {
            match &self.0 {
                Ok(outcome) => Ok(outcome.clone()),
                Err(e) => Err(WatcherError::Simulation(e.to_string())),
            }
        }
    }

    fn validated(hash: B256) -> SimulationOutcome {
        let data = crate::contracts::IStealthVault::ValidatedHash {
            _hash: hash,
            _caller: caller(),
            _penalty: U256::from(1u64),
        }
        .encode_log_data();
        SimulationOutcome {
            status: true,
            calls: Some(vec![TraceCall { from: relayer(), to: vault() }]),
            logs: vec![RawLog {
                address: vault(),
                topics: data.topics().to_vec(),
                data: data.data.clone(),
            }],
        }
    }

    #[tokio::test]
    async fn test_reverted_simulation_blocks_report() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone()).with_simulator(
            Arc::new(FixedSimulator(Ok(SimulationOutcome::default()))),
            HashSource::Calldata,
        );

        let verdict = w.handle(stealth_tx(caller(), B256::repeat_byte(1), GWEI)).await;
        assert_eq!(verdict, Verdict::Preflight(PreflightFailure::Reverted));
        assert!(submitter.decoded().is_empty());
    }

    #[tokio::test]
    async fn test_simulation_error_drops_candidate() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone()).with_simulator(
            Arc::new(FixedSimulator(Err(WatcherError::Simulation("HTTP 502".into())))),
            HashSource::Calldata,
        );

        let verdict = w.handle(stealth_tx(caller(), B256::repeat_byte(1), GWEI)).await;
        assert!(matches!(verdict, Verdict::SimulationFailed(_)));
        assert!(submitter.decoded().is_empty());
    }

    #[tokio::test]
    async fn test_trace_hash_source_reports_validated_hash() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let traced = B256::repeat_byte(0x99);
        let w = watcher(mirror(eth_frac(1, 1), eth_frac(1, 1)), submitter.clone())
            .with_simulator(Arc::new(FixedSimulator(Ok(validated(traced)))), HashSource::Trace);

        // calldata carries a different hash; the trace wins
        let mut tx = stealth_tx(caller(), B256::repeat_byte(0x11), GWEI);
        tx.input = executeWithoutBlockProtectionCall {
            _job: Address::repeat_byte(0x10),
            _callData: Bytes::new(),
            _stealthHash: B256::repeat_byte(0x11),
        }
        .abi_encode()
        .into();

        assert!(matches!(w.handle(tx).await, Verdict::Reported(_)));
        assert_eq!(reported_hashes(&submitter), vec![traced]);
    }
}
