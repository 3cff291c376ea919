//! Reporter Module
//!
//! Purpose:
//!     Race the leaked stealth transaction to inclusion by sending
//!     `StealthVault.reportHash(hash)` with a higher gas price.
//!
//! Architecture:
//!     gas.rs      : GasPolicy, markup / oracle floor / ceiling
//!     nonce.rs    : NonceManager, local atomic nonce counter
//!     journal.rs  : ReportJournal, JSONL record of attempts and outcomes
//!     mod.rs      : Reporter (build, sign, submit) + ReportSubmitter seam
//!
//! Notes:
//!     - Legacy (type 0) transaction: a single gas price is what the markup
//!       policy is expressed in
//!     - Signed locally and sent raw; the node never fills nonce or price
//!     - One submission per accepted candidate, never retried. Duplicate
//!       reports of one hash are settled on-chain.
//!     - Receipt watching runs detached and only logs/journals the result

pub mod gas;
pub mod journal;
pub mod nonce;

use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::contracts::IStealthVault::reportHashCall;
use crate::error::{Result, WatcherError};
use crate::gas_oracle::GasPriceOracle;
use crate::types::{PendingTransaction, ReportAttempt, ReportOutcome, WatcherConfig};

pub use gas::{compute_report_gas_price, GasPolicy, GWEI};
pub use journal::ReportJournal;
pub use nonce::NonceManager;

/// How long the detached watcher waits for a report receipt
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Minimal receipt view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Network side of the reporter
#[async_trait]
pub trait ReportSubmitter: Send + Sync {
    /// Broadcast a signed EIP-2718 envelope, returning its hash
    async fn submit(&self, raw: Bytes) -> Result<TxHash>;

    /// Receipt once mined, or None if not mined within `timeout`
    async fn await_receipt(&self, tx_hash: TxHash, timeout: Duration) -> Result<Option<ReceiptSummary>>;
}

/// Submitter backed by an alloy provider
pub struct ProviderSubmitter<P> {
    provider: P,
}

impl<P: Provider + Clone + 'static> ProviderSubmitter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> ReportSubmitter for ProviderSubmitter<P> {
    async fn submit(&self, raw: Bytes) -> Result<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| WatcherError::Submission(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn await_receipt(&self, tx_hash: TxHash, timeout: Duration) -> Result<Option<ReceiptSummary>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                return Ok(Some(ReceiptSummary {
                    success: receipt.status(),
                    block_number: receipt.block_number,
                    gas_used: receipt.gas_used,
                }));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// Builds, signs and submits `reportHash` transactions
pub struct Reporter {
    vault: Address,
    chain_id: u64,
    account: Address,
    wallet: EthereumWallet,
    nonces: NonceManager,
    policy: GasPolicy,
    gas_limit: u64,
    oracle: GasPriceOracle,
    submitter: Arc<dyn ReportSubmitter>,
    journal: Option<Arc<ReportJournal>>,
    dry_run: bool,
    receipt_timeout: Duration,
}

impl Reporter {
    pub fn new(
        config: &WatcherConfig,
        signer: PrivateKeySigner,
        nonces: NonceManager,
        oracle: GasPriceOracle,
        submitter: Arc<dyn ReportSubmitter>,
        journal: Option<Arc<ReportJournal>>,
    ) -> Self {
        let account = signer.address();
        Self {
            vault: config.stealth_vault,
            chain_id: config.chain_id,
            account,
            wallet: EthereumWallet::from(signer),
            nonces,
            policy: GasPolicy::from_config(config),
            gas_limit: config.report_gas_limit,
            oracle,
            submitter,
            journal,
            dry_run: config.dry_run,
            receipt_timeout: RECEIPT_TIMEOUT,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Price and sequence one report for `hash`, leaked by `source`
    fn prepare(&self, hash: B256, source: &PendingTransaction) -> ReportAttempt {
        let report_gas_price = self.policy.price(source.gas_price, self.oracle.rapid());
        // claimed last, immediately before signing
        let nonce = self.nonces.next();
        ReportAttempt {
            stealth_hash: hash,
            source_tx: source.hash,
            caller: source.from,
            observed_gas_price: source.gas_price,
            report_gas_price,
            gas_limit: self.gas_limit,
            nonce,
        }
    }

    async fn sign(&self, attempt: &ReportAttempt) -> Result<Bytes> {
        let mut tx = TransactionRequest::default()
            .with_to(self.vault)
            .with_input(reportHashCall { _hash: attempt.stealth_hash }.abi_encode())
            .with_chain_id(self.chain_id)
            .with_nonce(attempt.nonce)
            .with_gas_limit(attempt.gas_limit)
            .with_gas_price(attempt.report_gas_price);
        tx.from = Some(self.account);

        let signed = tx
            .build(&self.wallet)
            .await
            .map_err(|e| WatcherError::Signing(e.to_string()))?;
        Ok(Bytes::from(signed.encoded_2718()))
    }

    /// Report `hash`. Exactly one broadcast per call (none in dry-run).
    ///
    /// A node rejection is an outcome, not an error; only local signing
    /// failures return `Err`.
    pub async fn report(&self, hash: B256, source: &PendingTransaction) -> Result<ReportOutcome> {
        let attempt = self.prepare(hash, source);
        let raw = self.sign(&attempt).await?;

        let outcome = if self.dry_run {
            ReportOutcome::DryRun
        } else {
            match self.submitter.submit(raw).await {
                Ok(tx_hash) => ReportOutcome::Broadcast { tx_hash },
                Err(e) => ReportOutcome::Rejected {
                    reason: e.to_string(),
                },
            }
        };

        match &outcome {
            ReportOutcome::Broadcast { tx_hash } => info!(
                "REPORT SENT | hash={:?} | tx={:?} | source={:?} | caller={:?} | nonce={} | gas={} gwei (observed {} gwei)",
                attempt.stealth_hash,
                tx_hash,
                attempt.source_tx,
                attempt.caller,
                attempt.nonce,
                attempt.report_gas_price / GWEI,
                attempt.observed_gas_price / GWEI
            ),
            ReportOutcome::DryRun => info!(
                "REPORT (dry-run) | hash={:?} | source={:?} | caller={:?} | nonce={} | gas={} gwei",
                attempt.stealth_hash,
                attempt.source_tx,
                attempt.caller,
                attempt.nonce,
                attempt.report_gas_price / GWEI
            ),
            ReportOutcome::Rejected { reason } => warn!(
                "REPORT REJECTED | hash={:?} | nonce={} | {}",
                attempt.stealth_hash, attempt.nonce, reason
            ),
            _ => {}
        }
        self.journal_record(&attempt, &outcome);

        if let ReportOutcome::Broadcast { tx_hash } = &outcome {
            self.watch_receipt(attempt, *tx_hash);
        }

        Ok(outcome)
    }

    fn journal_record(&self, attempt: &ReportAttempt, outcome: &ReportOutcome) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(attempt, outcome) {
                warn!("Journal write failed: {:#}", e);
            }
        }
    }

    /// Detached: log and journal the mined result. Never retries.
    fn watch_receipt(&self, attempt: ReportAttempt, tx_hash: TxHash) {
        let submitter = self.submitter.clone();
        let journal = self.journal.clone();
        let timeout = self.receipt_timeout;

        tokio::spawn(async move {
            let outcome = match submitter.await_receipt(tx_hash, timeout).await {
                Ok(Some(receipt)) if receipt.success => {
                    info!(
                        "REPORT INCLUDED | hash={:?} | tx={:?} | block={:?} | gas_used={}",
                        attempt.stealth_hash, tx_hash, receipt.block_number, receipt.gas_used
                    );
                    ReportOutcome::Included {
                        tx_hash,
                        block_number: receipt.block_number,
                    }
                }
                Ok(Some(receipt)) => {
                    warn!(
                        "REPORT REVERTED | hash={:?} | tx={:?} | block={:?}",
                        attempt.stealth_hash, tx_hash, receipt.block_number
                    );
                    ReportOutcome::Reverted {
                        tx_hash,
                        block_number: receipt.block_number,
                    }
                }
                Ok(None) => {
                    warn!(
                        "Report {:?} not mined within {:?} | nonce={}",
                        tx_hash, timeout, attempt.nonce
                    );
                    return;
                }
                Err(e) => {
                    error!("Receipt lookup failed for {:?}: {}", tx_hash, e);
                    return;
                }
            };
            if let Some(journal) = journal {
                if let Err(e) = journal.record(&attempt, &outcome) {
                    warn!("Journal write failed: {:#}", e);
                }
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gas_oracle;
    use crate::types::{AuthorizationTarget, GasPriceTiers, HashSource, PendingSourceMode};
    use alloy::consensus::{Transaction as _, TxEnvelope};
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::U256;
    use std::sync::Mutex;

    /// Records every raw transaction instead of broadcasting it
    #[derive(Default)]
    pub(crate) struct RecordingSubmitter {
        pub sent: Mutex<Vec<Bytes>>,
        pub reject: bool,
    }

    impl RecordingSubmitter {
        pub fn decoded(&self) -> Vec<TxEnvelope> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|raw| TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl ReportSubmitter for RecordingSubmitter {
        async fn submit(&self, raw: Bytes) -> Result<TxHash> {
            if self.reject {
                return Err(WatcherError::Submission("nonce too low".to_string()));
            }
            let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
                .map_err(|e| WatcherError::Decode(e.to_string()))?;
            self.sent.lock().unwrap().push(raw);
            Ok(*envelope.tx_hash())
        }

        async fn await_receipt(&self, _tx_hash: TxHash, _timeout: Duration) -> Result<Option<ReceiptSummary>> {
            Ok(None)
        }
    }

    pub(crate) fn test_config() -> WatcherConfig {
        WatcherConfig {
            ws_url: "ws://localhost:8546".to_string(),
            chain_id: 1,
            private_key: String::new(),
            stealth_vault: Address::repeat_byte(0xaa),
            stealth_relayer: Address::repeat_byte(0xbb),
            authorization: AuthorizationTarget::Relayer,
            reporter_reward_divisor: 10,
            pending_source: PendingSourceMode::Filtered,
            tx_fetch_timeout_ms: 1_500,
            aliveness_timeout_ms: 0,
            hash_source: HashSource::Calldata,
            simulation: None,
            gas_feed_url: None,
            gas_markup_numerator: 4,
            gas_markup_denominator: 3,
            max_gas_price_gwei: 500,
            report_gas_limit: 1_000_000,
            journal_dir: None,
            dry_run: false,
        }
    }

    pub(crate) fn source_tx(gas_price: u128) -> PendingTransaction {
        PendingTransaction {
            hash: TxHash::repeat_byte(0x55),
            from: Address::repeat_byte(0x01),
            to: Some(Address::repeat_byte(0xbb)),
            gas_limit: 300_000,
            gas_price,
            input: Bytes::new(),
            nonce: 3,
            value: U256::ZERO,
        }
    }

    fn reporter(config: &WatcherConfig, submitter: Arc<RecordingSubmitter>, oracle: GasPriceOracle) -> Reporter {
        Reporter::new(
            config,
            PrivateKeySigner::random(),
            NonceManager::new(10),
            oracle,
            submitter,
            None,
        )
    }

    #[tokio::test]
    async fn test_report_builds_signed_report_hash() {
        let config = test_config();
        let submitter = Arc::new(RecordingSubmitter::default());
        let reporter = reporter(&config, submitter.clone(), GasPriceOracle::disabled());

        let hash = B256::repeat_byte(0xab);
        let outcome = reporter.report(hash, &source_tx(30 * GWEI)).await.unwrap();
        assert!(matches!(outcome, ReportOutcome::Broadcast { .. }));

        let sent = submitter.decoded();
        assert_eq!(sent.len(), 1);
        let tx = &sent[0];
        assert_eq!(tx.to(), Some(config.stealth_vault));
        assert_eq!(tx.nonce(), 10);
        assert_eq!(tx.gas_limit(), 1_000_000);
        assert_eq!(tx.gas_price(), Some(40 * GWEI));
        assert_eq!(tx.chain_id(), Some(1));
        assert_eq!(reportHashCall::abi_decode(tx.input()).unwrap()._hash, hash);
    }

    #[tokio::test]
    async fn test_oracle_floor_and_sequential_nonces() {
        let config = test_config();
        let submitter = Arc::new(RecordingSubmitter::default());
        let (feed, oracle) = gas_oracle::channel();
        feed.publish(GasPriceTiers { rapid: 100 * GWEI as u64, fast: 0, standard: 0, slow: 0 });
        let reporter = reporter(&config, submitter.clone(), oracle);

        reporter.report(B256::repeat_byte(1), &source_tx(GWEI)).await.unwrap();
        reporter.report(B256::repeat_byte(2), &source_tx(GWEI)).await.unwrap();

        let sent = submitter.decoded();
        assert_eq!(sent.iter().map(|t| t.nonce()).collect::<Vec<_>>(), vec![10, 11]);
        assert!(sent.iter().all(|t| t.gas_price() == Some(100 * GWEI)));
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let mut config = test_config();
        config.dry_run = true;
        let submitter = Arc::new(RecordingSubmitter::default());
        let reporter = reporter(&config, submitter.clone(), GasPriceOracle::disabled());

        let outcome = reporter.report(B256::repeat_byte(1), &source_tx(GWEI)).await.unwrap();
        assert_eq!(outcome, ReportOutcome::DryRun);
        assert!(submitter.decoded().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_an_outcome_and_nonce_is_not_reused() {
        let config = test_config();
        let submitter = Arc::new(RecordingSubmitter {
            reject: true,
            ..Default::default()
        });
        let nonces = NonceManager::new(5);
        let reporter = Reporter::new(
            &config,
            PrivateKeySigner::random(),
            nonces,
            GasPriceOracle::disabled(),
            submitter,
            None,
        );

        let outcome = reporter.report(B256::repeat_byte(1), &source_tx(GWEI)).await.unwrap();
        assert!(matches!(outcome, ReportOutcome::Rejected { .. }));
        assert_eq!(reporter.nonces.peek(), 6);
    }
}
