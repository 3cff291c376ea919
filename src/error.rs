//! Watcher error types
//!
//! Library code returns `WatcherError`; the binaries wrap it in `anyhow`.

use alloy::primitives::{Address, U256};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatcherError>;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Rpc error: {0}")]
    Rpc(String),
    #[error("Pending transaction stream ended")]
    StreamEnded,
    #[error("Registry event stream ended")]
    EventStreamEnded,
    #[error("No mempool activity for {0}ms")]
    AlivenessTimeout(u64),
    #[error("Registry invariant violated: {0}")]
    Mirror(#[from] MirrorError),
    #[error("Decoding error: {0}")]
    Decode(String),
    #[error("Signing error: {0}")]
    Signing(String),
    #[error("Submission error: {0}")]
    Submission(String),
    #[error("Simulation error: {0}")]
    Simulation(String),
    #[error("Gas feed error: {0}")]
    GasFeed(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<alloy::transports::TransportError> for WatcherError {
    fn from(err: alloy::transports::TransportError) -> Self {
        WatcherError::Rpc(err.to_string())
    }
}

impl From<alloy::contract::Error> for WatcherError {
    fn from(err: alloy::contract::Error) -> Self {
        WatcherError::Rpc(err.to_string())
    }
}

/// Mirror state corruption. Any of these means the local mirror can no
/// longer be trusted and must be rebuilt from chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("debit of {amount} exceeds bond {bonded} of {caller}")]
    NegativeBond {
        caller: Address,
        bonded: U256,
        amount: U256,
    },
    #[error("credit overflow for {0}")]
    Overflow(Address),
}
