//! Stealth Watcher Library
//!
//! Watches the mempool for stealth-protected relayer calls whose calldata
//! leaked before execution, and reports the leaked stealth hash to the
//! StealthVault so the caller's bond is penalized.
//!
//! Created: 2026-10-18

pub mod aliveness;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gas_oracle;
pub mod mempool;
pub mod registry;
pub mod reporter;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use aliveness::AlivenessMonitor;
pub use config::{load_config, load_config_from_file, load_config_toml};
pub use error::{MirrorError, Result, WatcherError};
pub use gas_oracle::GasPriceOracle;
pub use registry::{RegistryMirror, RegistryState};
pub use reporter::Reporter;
pub use types::{PendingTransaction, WatcherConfig};
pub use watcher::{Verdict, Watcher};
