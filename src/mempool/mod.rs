//! Mempool Module
//!
//! Purpose:
//!     Observe pending transactions addressed to the stealth relayer, decide
//!     which are reportable, and recover the stealth hash they leak.
//!
//! Architecture:
//!     source.rs     : PendingTransactionSource (filtered / hashes / channel)
//!                     and the mempool heartbeat feeding the aliveness check
//!     filter.rs     : EligibilityFilter, pure classify over a registry view
//!     decoder.rs    : calldata → StealthCall for the four hash-bearing entry points
//!     simulator.rs  : optional simulation preflight and trace hash recovery

pub mod decoder;
pub mod filter;
pub mod simulator;
pub mod source;

pub use decoder::{extract, selector_hex};
pub use filter::{Classification, EligibilityFilter, IneligibleReason};
pub use simulator::{
    extract_from_trace, preflight, PreflightFailure, SimulationOutcome, Simulator,
    TenderlySimulator,
};
pub use source::{
    fetch_bodies, spawn_mempool_heartbeat, ChannelPendingSource, FilteredPendingSource,
    HashPendingSource, PendingStream, PendingTransactionSource,
};
