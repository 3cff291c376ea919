//! Registry Mirror Module
//!
//! Purpose:
//!     Keep an eventually-consistent copy of the StealthVault caller/bond
//!     registry and the relayer penalty, so the mempool filter can decide
//!     eligibility without an RPC round-trip per pending transaction.
//!
//! Architecture:
//!     state.rs   : RegistryState (owned maps), RegistryEvent, snapshots
//!     events.rs  : Log → RegistryEvent decoding
//!     sync.rs    : bootstrap bulk read, log subscription, single applier task
//!
//! Access discipline:
//!     One writer (the applier task) and many readers (the filter). Every
//!     event is applied under the write lock in one step, so a reader never
//!     observes half of a PenaltyApplied debit/credit pair.

pub mod events;
pub mod state;
pub mod sync;

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::error::MirrorError;

pub use events::decode_registry_log;
pub use state::{CallerRecord, CallerSnapshot, RegistryEvent, RegistrySnapshot, RegistryState};
pub use sync::{run_event_applier, spawn_event_stream, RegistrySource, RegistrySync, RegistryUpdate};

/// Shared handle to the registry state
#[derive(Debug, Clone)]
pub struct RegistryMirror {
    state: Arc<RwLock<RegistryState>>,
}

impl RegistryMirror {
    pub fn new(state: RegistryState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Run `f` against a consistent read view.
    ///
    /// The lock is std (not tokio): nothing awaits while holding it.
    pub fn read<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Apply one event atomically
    pub fn apply(&self, event: &RegistryEvent) -> Result<(), MirrorError> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        guard.apply(event)
    }

    /// Swap in a freshly bootstrapped state
    pub fn replace(&self, state: RegistryState) {
        let (callers, jobs, penalty) = state.stats();
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = state;
        info!(
            "Registry replaced | callers={} | jobs={} | penalty={}",
            callers, jobs, penalty
        );
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.read(|state| state.to_snapshot())
    }
}
