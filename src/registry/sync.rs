//! Registry Synchronization
//!
//! Bootstrap:
//!     Bulk read of `callers()`, then `callerContracts(c)` + `bonded(c)` for
//!     every caller, and the relayer `penalty()`. All reads are pinned to one
//!     block so the snapshot is internally consistent; that block becomes the
//!     applier's watermark.
//!
//! Live updates:
//!     `spawn_event_stream` subscribes to vault + relayer logs and forwards
//!     decoded events over an mpsc channel. `run_event_applier` is the only
//!     consumer and the only writer of the mirror.
//!
//! Ordering:
//!     The log subscription is opened before bootstrap, so nothing emitted
//!     in between is lost; events at or below the watermark are already in
//!     the snapshot and are skipped.

use alloy::eips::BlockId;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::decode_registry_log;
use super::state::{CallerSnapshot, RegistryEvent, RegistrySnapshot, RegistryState};
use super::RegistryMirror;
use crate::contracts::{IStealthRelayer, IStealthVault};
use crate::error::{Result, WatcherError};

/// Message from the log stream to the applier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryUpdate {
    Event {
        block: Option<u64>,
        event: RegistryEvent,
    },
    /// A previously delivered log was removed by a reorg
    Reorg { block: Option<u64> },
}

/// Anything that can produce a full registry snapshot
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Snapshot plus the block it was read at
    async fn bootstrap(&self) -> Result<(RegistrySnapshot, u64)>;

    fn reporter_reward_divisor(&self) -> u64;

    /// Rebuild the mirror from scratch. Returns the new watermark.
    async fn resync(&self, mirror: &RegistryMirror) -> Result<u64> {
        let (snapshot, block) = self.bootstrap().await?;
        mirror.replace(RegistryState::from_snapshot(&snapshot, self.reporter_reward_divisor()));
        Ok(block)
    }
}

/// On-chain registry reader
#[derive(Debug, Clone)]
pub struct RegistrySync<P> {
    provider: P,
    vault: Address,
    relayer: Address,
    reporter_reward_divisor: u64,
}

impl<P: Provider + Clone + 'static> RegistrySync<P> {
    pub fn new(provider: P, vault: Address, relayer: Address, reporter_reward_divisor: u64) -> Self {
        Self {
            provider,
            vault,
            relayer,
            reporter_reward_divisor,
        }
    }

    /// Read the registry at a fixed block
    pub async fn bootstrap_at(&self, block: u64) -> Result<RegistrySnapshot> {
        let at = BlockId::number(block);
        let vault = IStealthVault::new(self.vault, self.provider.clone());
        let relayer = IStealthRelayer::new(self.relayer, self.provider.clone());

        info!("Getting penalty ...");
        let penalty = relayer.penalty().block(at).call().await?;

        info!("Getting callers ...");
        let callers = vault.callers().block(at).call().await?;

        info!("Getting contracts and bonds of {} callers ...", callers.len());
        let reads = callers.iter().map(|caller| {
            let vault = &vault;
            let caller = *caller;
            async move {
                let contracts = vault.callerContracts(caller).block(at).call().await?;
                let bonded = vault.bonded(caller).block(at).call().await?;
                debug!(
                    "Caller {:?} | contracts={} | bonded={}",
                    caller,
                    contracts.len(),
                    bonded
                );
                Ok::<_, WatcherError>(CallerSnapshot {
                    caller,
                    contracts,
                    bonded,
                })
            }
        });
        let callers = futures::future::try_join_all(reads).await?;

        Ok(RegistrySnapshot { callers, penalty })
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> RegistrySource for RegistrySync<P> {
    async fn bootstrap(&self) -> Result<(RegistrySnapshot, u64)> {
        let block = self.provider.get_block_number().await?;
        let snapshot = self.bootstrap_at(block).await?;
        info!(
            "Registry bootstrap complete | block={} | callers={} | penalty={}",
            block,
            snapshot.callers.len(),
            snapshot.penalty
        );
        Ok((snapshot, block))
    }

    fn reporter_reward_divisor(&self) -> u64 {
        self.reporter_reward_divisor
    }
}

/// Subscribe to vault + relayer logs and forward decoded events.
///
/// The subscription is established before this returns; the spawned task
/// ends with `EventStreamEnded` when the provider drops it.
pub async fn spawn_event_stream<P: Provider + Clone + 'static>(
    provider: P,
    vault: Address,
    relayer: Address,
    tx: mpsc::Sender<RegistryUpdate>,
) -> Result<JoinHandle<Result<()>>> {
    let filter = Filter::new().address(vec![vault, relayer]);
    let sub = provider.subscribe_logs(&filter).await?;
    info!("Registry log subscription active | vault={:?} | relayer={:?}", vault, relayer);

    Ok(tokio::spawn(async move {
        // Keeps the pubsub connection alive for the life of the stream
        let _provider = provider;
        let mut stream = sub.into_stream();
        while let Some(log) = stream.next().await {
            let update = if log.removed {
                RegistryUpdate::Reorg {
                    block: log.block_number,
                }
            } else {
                match decode_registry_log(log.address(), log.data(), vault, relayer) {
                    Some(event) => RegistryUpdate::Event {
                        block: log.block_number,
                        event,
                    },
                    None => continue,
                }
            };
            if tx.send(update).await.is_err() {
                // Applier gone; the process is shutting down
                return Ok(());
            }
        }
        warn!("Registry log stream ended");
        Err(WatcherError::EventStreamEnded)
    }))
}

/// Single writer of the mirror. Runs until the channel closes.
///
/// An invariant violation or a reorg triggers a full resync; failure to
/// resync is fatal.
pub async fn run_event_applier<S: RegistrySource + ?Sized>(
    mirror: RegistryMirror,
    source: &S,
    mut rx: mpsc::Receiver<RegistryUpdate>,
    mut watermark: u64,
) -> Result<()> {
    let mut resyncs = 0u64;

    while let Some(update) = rx.recv().await {
        match update {
            RegistryUpdate::Event { block, event } => {
                if block.is_some_and(|b| b <= watermark) {
                    debug!(
                        "Skipping {} at block {:?} (already in snapshot @ {})",
                        event.kind(),
                        block,
                        watermark
                    );
                    continue;
                }
                match mirror.apply(&event) {
                    Ok(()) => info!("REGISTRY | {} | block={:?} | {:?}", event.kind(), block, event),
                    Err(e) => {
                        resyncs += 1;
                        error!(
                            "Registry invariant violated by {} at block {:?}: {} | resync #{}",
                            event.kind(),
                            block,
                            e,
                            resyncs
                        );
                        watermark = source.resync(&mirror).await?;
                    }
                }
            }
            RegistryUpdate::Reorg { block } => {
                resyncs += 1;
                warn!("Registry log removed at block {:?} | resync #{}", block, resyncs);
                watermark = source.resync(&mirror).await?;
            }
        }
    }

    Err(WatcherError::EventStreamEnded)
}
