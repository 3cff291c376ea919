//! Pending Transaction Sources
//!
//! Purpose:
//!     Turn a provider's mempool push subscription into a stream of
//!     `PendingTransaction`s. The stream is infinite while the session
//!     lives; when it ends the watcher treats it as a fatal disconnect.
//!     Sources never reconnect on their own.
//!
//! Modes:
//!     filtered : `alchemy_pendingTransactions` with a `toAddress` filter on
//!                the relayer; full bodies are pushed, nothing to fetch.
//!     hashes   : standard `newPendingTransactions`; each body is fetched with
//!                `eth_getTransactionByHash` under a timeout. A hash whose
//!                body cannot be fetched in time is logged and skipped.
//!
//! Aliveness:
//!     The watchdog must see raw mempool activity, not post-filter traffic.
//!     `hashes` touches it per announcement before the fetch; `filtered`
//!     pairs with `spawn_mempool_heartbeat`, an unfiltered hash subscription
//!     whose only job is touching it.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use alloy::providers::Provider;
use alloy::rpc::types::Transaction;
use alloy::transports::TransportError;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::aliveness::AlivenessMonitor;
use crate::error::{Result, WatcherError};
use crate::types::PendingTransaction;

pub type PendingStream = BoxStream<'static, PendingTransaction>;

/// Bodies fetched concurrently in `hashes` mode
const FETCH_CONCURRENCY: usize = 16;

#[async_trait]
pub trait PendingTransactionSource: Send + Sync {
    /// Open the subscription. Called once per process.
    async fn subscribe(&self) -> Result<PendingStream>;
}

// ── Filtered (full bodies, provider-side toAddress filter) ──────────

pub struct FilteredPendingSource<P> {
    provider: P,
    relayer: Address,
}

impl<P: Provider + Clone + 'static> FilteredPendingSource<P> {
    pub fn new(provider: P, relayer: Address) -> Self {
        Self { provider, relayer }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> PendingTransactionSource for FilteredPendingSource<P> {
    async fn subscribe(&self) -> Result<PendingStream> {
        let params = (
            "alchemy_pendingTransactions",
            json!({ "toAddress": [self.relayer], "hashesOnly": false }),
        );
        let sub = self.provider.subscribe::<_, Transaction>(params).await?;
        info!("Pending subscription active | mode=filtered | toAddress={:?}", self.relayer);

        let provider = self.provider.clone();
        let stream = sub.into_stream().map(move |tx| {
            // Keeps the pubsub connection alive for as long as the stream
            let _ = &provider;
            PendingTransaction::from_rpc(&tx)
        });
        Ok(stream.boxed())
    }
}

// ── Hashes + per-hash fetch ─────────────────────────────────────────

pub struct HashPendingSource<P> {
    provider: P,
    fetch_timeout: Duration,
    aliveness: Option<AlivenessMonitor>,
}

impl<P: Provider + Clone + 'static> HashPendingSource<P> {
    pub fn new(provider: P, fetch_timeout: Duration) -> Self {
        Self {
            provider,
            fetch_timeout,
            aliveness: None,
        }
    }

    /// Touch `aliveness` for every announced hash, fetched or not
    pub fn with_aliveness(mut self, aliveness: AlivenessMonitor) -> Self {
        self.aliveness = Some(aliveness);
        self
    }

    /// Resolve announced hashes to bodies through `eth_getTransactionByHash`
    fn bodies<S>(&self, hashes: S) -> PendingStream
    where
        S: Stream<Item = TxHash> + Send + 'static,
    {
        let provider = self.provider.clone();
        fetch_bodies(hashes, self.fetch_timeout, self.aliveness.clone(), move |hash| {
            let provider = provider.clone();
            async move {
                let tx = provider.get_transaction_by_hash(hash).await?;
                Ok::<_, TransportError>(tx.map(|tx| PendingTransaction::from_rpc(&tx)))
            }
        })
    }
}

async fn fetch_within<F, E>(hash: TxHash, fetch_timeout: Duration, fetch: F) -> Option<PendingTransaction>
where
    F: Future<Output = std::result::Result<Option<PendingTransaction>, E>>,
    E: Display,
{
    match tokio::time::timeout(fetch_timeout, fetch).await {
        Ok(Ok(Some(tx))) => Some(tx),
        Ok(Ok(None)) => {
            debug!("Pending tx {:?} not retrievable (dropped or not yet propagated)", hash);
            None
        }
        Ok(Err(e)) => {
            warn!("Fetch failed for pending tx {:?}: {}", hash, e);
            None
        }
        Err(_) => {
            warn!("Fetch timed out for pending tx {:?} after {:?}", hash, fetch_timeout);
            None
        }
    }
}

/// Turn a stream of announced hashes into bodies.
///
/// Each announcement touches `aliveness` before its fetch starts. A body
/// that is missing, errors, or does not arrive within `fetch_timeout` is
/// skipped; the stream itself only ends when `hashes` does.
pub fn fetch_bodies<S, F, Fut, E>(
    hashes: S,
    fetch_timeout: Duration,
    aliveness: Option<AlivenessMonitor>,
    fetch: F,
) -> PendingStream
where
    S: Stream<Item = TxHash> + Send + 'static,
    F: Fn(TxHash) -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<Option<PendingTransaction>, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    hashes
        .inspect(move |_| {
            if let Some(aliveness) = &aliveness {
                aliveness.touch();
            }
        })
        .map(move |hash| fetch_within(hash, fetch_timeout, fetch(hash)))
        .buffer_unordered(FETCH_CONCURRENCY)
        .filter_map(futures::future::ready)
        .boxed()
}

#[async_trait]
impl<P: Provider + Clone + 'static> PendingTransactionSource for HashPendingSource<P> {
    async fn subscribe(&self) -> Result<PendingStream> {
        let sub = self.provider.subscribe_pending_transactions().await?;
        info!(
            "Pending subscription active | mode=hashes | fetch_timeout={:?}",
            self.fetch_timeout
        );

        // The fetch closure holds a provider clone, which keeps the pubsub
        // connection alive for as long as the stream
        Ok(self.bodies(sub.into_stream()))
    }
}

// ── Mempool heartbeat ───────────────────────────────────────────────

/// Feed `aliveness` from the node's unfiltered pending-hash announcements.
///
/// The filtered subscription only carries relayer traffic, which can be
/// quiet for long stretches on a healthy session. This side subscription
/// is what proves the mempool feed is alive in that mode. The task ends
/// with `StreamEnded` when the node stops announcing.
pub async fn spawn_mempool_heartbeat<P: Provider + Clone + 'static>(
    provider: P,
    aliveness: AlivenessMonitor,
) -> Result<JoinHandle<Result<()>>> {
    let sub = provider.subscribe_pending_transactions().await?;
    info!("Mempool heartbeat active | unfiltered pending hashes feed the aliveness check");

    Ok(tokio::spawn(async move {
        let _provider = provider;
        aliveness.watch(sub.into_stream()).await
    }))
}

// ── In-process channel ──────────────────────────────────────────────

/// Source fed from an mpsc channel. Used to replay captured transactions
/// and to drive the pipeline without a node.
pub struct ChannelPendingSource {
    rx: Mutex<Option<mpsc::Receiver<PendingTransaction>>>,
}

impl ChannelPendingSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<PendingTransaction>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx: Mutex::new(Some(rx)),
            },
        )
    }
}

#[async_trait]
impl PendingTransactionSource for ChannelPendingSource {
    async fn subscribe(&self) -> Result<PendingStream> {
        let rx = self
            .rx
            .lock()
            .map_err(|_| WatcherError::Rpc("channel source lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| WatcherError::Rpc("channel source already subscribed".to_string()))?;
        Ok(ReceiverStream::new(rx).boxed())
    }
}
