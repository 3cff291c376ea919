//! Eligibility Filter
//!
//! Purpose:
//!     Decide whether a pending transaction is a reportable stealth-protected
//!     call, using only the transaction and a read view of the registry.
//!
//! Check order (cheapest first, short-circuit on first failure):
//!     1. has a `to` address and it is the relayer
//!     2. sender is a known caller and has enabled the authorization target
//!     3. bonded(sender) >= penalty
//!
//! Notes:
//!     - Pure: no I/O, no locking. Callers pass a `&RegistryState` obtained
//!       through `RegistryMirror::read`.
//!     - In `job` authorization mode the target is the `_job` argument
//!       decoded from calldata; a call that does not decode is ineligible.

use alloy::primitives::{Address, U256};
use std::fmt;

use super::decoder;
use crate::registry::RegistryState;
use crate::types::{AuthorizationTarget, PendingTransaction};

/// Why a transaction was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    ContractCreation,
    WrongDestination(Address),
    UnknownCaller,
    /// Caller exists but has not enabled `target`
    Unauthorized { target: Address },
    /// Job mode only: calldata carries no decodable `_job`
    NoJob,
    InsufficientBond { bonded: U256, penalty: U256 },
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IneligibleReason::ContractCreation => write!(f, "contract creation"),
            IneligibleReason::WrongDestination(to) => write!(f, "destination {:?}", to),
            IneligibleReason::UnknownCaller => write!(f, "unknown caller"),
            IneligibleReason::Unauthorized { target } => {
                write!(f, "caller has not enabled {:?}", target)
            }
            IneligibleReason::NoJob => write!(f, "no decodable job"),
            IneligibleReason::InsufficientBond { bonded, penalty } => {
                write!(f, "bonded {} < penalty {}", bonded, penalty)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Candidate,
    Ineligible(IneligibleReason),
}

impl Classification {
    pub fn is_candidate(&self) -> bool {
        matches!(self, Classification::Candidate)
    }
}

/// Stateless classifier bound to one relayer deployment
#[derive(Debug, Clone, Copy)]
pub struct EligibilityFilter {
    relayer: Address,
    authorization: AuthorizationTarget,
}

impl EligibilityFilter {
    pub fn new(relayer: Address, authorization: AuthorizationTarget) -> Self {
        Self {
            relayer,
            authorization,
        }
    }

    pub fn relayer(&self) -> Address {
        self.relayer
    }

    /// Whether `caller` could produce a candidate at all.
    ///
    /// Same checks as `classify` minus the transaction: in `job` mode any
    /// enabled contract may be the job of a future call.
    pub fn is_eligible_caller(&self, caller: &Address, state: &RegistryState) -> bool {
        if !state.is_known_caller(caller) || state.bonded(caller) < state.penalty() {
            return false;
        }
        match self.authorization {
            AuthorizationTarget::Relayer => state.is_authorized(caller, &self.relayer),
            AuthorizationTarget::Job => state
                .lookup(caller)
                .is_some_and(|record| !record.contracts.is_empty()),
        }
    }

    pub fn classify(&self, tx: &PendingTransaction, state: &RegistryState) -> Classification {
        use Classification::Ineligible;

        // 1. Destination
        let to = match tx.to {
            Some(to) => to,
            None => return Ineligible(IneligibleReason::ContractCreation),
        };
        if to != self.relayer {
            return Ineligible(IneligibleReason::WrongDestination(to));
        }

        // 2. Caller authorization
        if !state.is_known_caller(&tx.from) {
            return Ineligible(IneligibleReason::UnknownCaller);
        }
        let target = match self.authorization {
            AuthorizationTarget::Relayer => self.relayer,
            AuthorizationTarget::Job => match decoder::extract(&tx.input) {
                Some(call) => call.job,
                None => return Ineligible(IneligibleReason::NoJob),
            },
        };
        if !state.is_authorized(&tx.from, &target) {
            return Ineligible(IneligibleReason::Unauthorized { target });
        }

        // 3. Bond sufficiency
        let bonded = state.bonded(&tx.from);
        let penalty = state.penalty();
        if bonded < penalty {
            return Ineligible(IneligibleReason::InsufficientBond { bonded, penalty });
        }

        Classification::Candidate
    }
}
