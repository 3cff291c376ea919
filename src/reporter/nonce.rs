//! Local nonce sequencing
//!
//! The reporter never asks the node for "next nonce" per submission:
//! overlapping reports would race on the same value. The counter is read
//! from chain once at startup (pending tag) and advanced locally with an
//! atomic fetch-add, so every caller gets a distinct value.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::Address;
use alloy::providers::Provider;
use tracing::info;

use crate::error::Result;

#[derive(Debug)]
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Seed from the account's pending transaction count
    pub async fn from_chain<P: Provider>(provider: &P, account: Address) -> Result<Self> {
        let start = provider.get_transaction_count(account).pending().await?;
        info!("Nonce manager seeded | account={:?} | nonce={}", account, start);
        Ok(Self::new(start))
    }

    /// Claim the next nonce. Never hands out the same value twice.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Value the next claim will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
