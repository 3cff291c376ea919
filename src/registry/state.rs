//! Registry State
//!
//! In-memory replica of the StealthVault/StealthRelayer bookkeeping:
//! caller → enabled stealth contracts, caller → bonded amount, and the
//! relayer penalty.
//!
//! Keys are `alloy::primitives::Address`, a 20-byte value, so the
//! checksum/lowercase distinction of hex strings never reaches the maps.
//!
//! Writes go through `RegistryState::apply`, which validates the whole
//! event before touching any map: an event is either applied completely
//! or rejected with the state left as it was.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MirrorError;

/// Typed registry event, decoded from vault/relayer logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    ContractsEnabled {
        caller: Address,
        contracts: Vec<Address>,
    },
    ContractsDisabled {
        caller: Address,
        contracts: Vec<Address>,
    },
    Bonded {
        caller: Address,
        amount: U256,
    },
    Unbonded {
        caller: Address,
        amount: U256,
    },
    /// Penalized caller is debited, accepted reporter is credited an incentive
    PenaltyApplied {
        hash: B256,
        caller: Address,
        penalty: U256,
        reporter: Address,
    },
    PenaltySet {
        penalty: U256,
    },
}

impl RegistryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::ContractsEnabled { .. } => "ContractsEnabled",
            RegistryEvent::ContractsDisabled { .. } => "ContractsDisabled",
            RegistryEvent::Bonded { .. } => "Bonded",
            RegistryEvent::Unbonded { .. } => "Unbonded",
            RegistryEvent::PenaltyApplied { .. } => "PenaltyApplied",
            RegistryEvent::PenaltySet { .. } => "PenaltySet",
        }
    }
}

/// One caller as read from chain during bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerSnapshot {
    pub caller: Address,
    pub contracts: Vec<Address>,
    pub bonded: U256,
}

/// Full on-chain registry view, as produced by a bulk read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub callers: Vec<CallerSnapshot>,
    pub penalty: U256,
}

/// Read view of a single caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerRecord {
    pub bonded: U256,
    pub contracts: HashSet<Address>,
}

#[derive(Debug, Clone)]
pub struct RegistryState {
    caller_contracts: HashMap<Address, HashSet<Address>>,
    bonded: HashMap<Address, U256>,
    /// Union of enabled contracts across callers, with a per-contract count
    /// of how many callers enabled it
    jobs: HashMap<Address, usize>,
    penalty: U256,
    reporter_reward_divisor: u64,
}

impl RegistryState {
    /// Empty mirror. Nobody is authorized until data arrives.
    pub fn new(reporter_reward_divisor: u64) -> Self {
        Self {
            caller_contracts: HashMap::new(),
            bonded: HashMap::new(),
            jobs: HashMap::new(),
            penalty: U256::ZERO,
            reporter_reward_divisor: reporter_reward_divisor.max(1),
        }
    }

    pub fn from_snapshot(snapshot: &RegistrySnapshot, reporter_reward_divisor: u64) -> Self {
        let mut state = Self::new(reporter_reward_divisor);
        state.penalty = snapshot.penalty;
        for entry in &snapshot.callers {
            state.enable(entry.caller, &entry.contracts);
            state.bonded.insert(entry.caller, entry.bonded);
        }
        state
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn penalty(&self) -> U256 {
        self.penalty
    }

    /// Bonded amount; unknown callers read as zero
    pub fn bonded(&self, caller: &Address) -> U256 {
        self.bonded.get(caller).copied().unwrap_or(U256::ZERO)
    }

    /// Callers are "known" once they have a contracts entry, even if empty
    pub fn is_known_caller(&self, caller: &Address) -> bool {
        self.caller_contracts.contains_key(caller)
    }

    pub fn is_authorized(&self, caller: &Address, contract: &Address) -> bool {
        self.caller_contracts
            .get(caller)
            .is_some_and(|contracts| contracts.contains(contract))
    }

    pub fn is_known_job(&self, contract: &Address) -> bool {
        self.jobs.contains_key(contract)
    }

    pub fn lookup(&self, caller: &Address) -> Option<CallerRecord> {
        if !self.is_known_caller(caller) && !self.bonded.contains_key(caller) {
            return None;
        }
        Some(CallerRecord {
            bonded: self.bonded(caller),
            contracts: self.caller_contracts.get(caller).cloned().unwrap_or_default(),
        })
    }

    /// Every address the mirror has a record for
    pub fn callers(&self) -> Vec<Address> {
        let mut all: HashSet<Address> = self.caller_contracts.keys().copied().collect();
        all.extend(self.bonded.keys().copied());
        let mut out: Vec<Address> = all.into_iter().collect();
        out.sort();
        out
    }

    /// Stats: (callers, distinct jobs, penalty)
    pub fn stats(&self) -> (usize, usize, U256) {
        (self.caller_contracts.len(), self.jobs.len(), self.penalty)
    }

    pub fn to_snapshot(&self) -> RegistrySnapshot {
        let callers = self
            .callers()
            .into_iter()
            .map(|caller| {
                let mut contracts: Vec<Address> = self
                    .caller_contracts
                    .get(&caller)
                    .map(|c| c.iter().copied().collect())
                    .unwrap_or_default();
                contracts.sort();
                CallerSnapshot {
                    caller,
                    contracts,
                    bonded: self.bonded(&caller),
                }
            })
            .collect();
        RegistrySnapshot {
            callers,
            penalty: self.penalty,
        }
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Apply one event. On error the state is unchanged.
    pub fn apply(&mut self, event: &RegistryEvent) -> Result<(), MirrorError> {
        match event {
            RegistryEvent::ContractsEnabled { caller, contracts } => {
                self.enable(*caller, contracts);
            }
            RegistryEvent::ContractsDisabled { caller, contracts } => {
                self.disable(*caller, contracts);
            }
            RegistryEvent::Bonded { caller, amount } => {
                let next = self.credited(caller, *amount)?;
                self.bonded.insert(*caller, next);
            }
            RegistryEvent::Unbonded { caller, amount } => {
                let next = self.debited(caller, *amount)?;
                self.bonded.insert(*caller, next);
            }
            RegistryEvent::PenaltyApplied {
                caller,
                penalty,
                reporter,
                ..
            } => {
                let reward = *penalty / U256::from(self.reporter_reward_divisor);
                let caller_next = self.debited(caller, *penalty)?;
                if caller == reporter {
                    // Self-report: debit and credit land on the same key
                    let next = caller_next
                        .checked_add(reward)
                        .ok_or(MirrorError::Overflow(*reporter))?;
                    self.bonded.insert(*caller, next);
                } else {
                    let reporter_next = self.credited(reporter, reward)?;
                    self.bonded.insert(*caller, caller_next);
                    self.bonded.insert(*reporter, reporter_next);
                }
            }
            RegistryEvent::PenaltySet { penalty } => {
                self.penalty = *penalty;
            }
        }
        Ok(())
    }

    fn credited(&self, caller: &Address, amount: U256) -> Result<U256, MirrorError> {
        self.bonded(caller)
            .checked_add(amount)
            .ok_or(MirrorError::Overflow(*caller))
    }

    fn debited(&self, caller: &Address, amount: U256) -> Result<U256, MirrorError> {
        let bonded = self.bonded(caller);
        bonded.checked_sub(amount).ok_or(MirrorError::NegativeBond {
            caller: *caller,
            bonded,
            amount,
        })
    }

    fn enable(&mut self, caller: Address, contracts: &[Address]) {
        let entry = self.caller_contracts.entry(caller).or_default();
        for contract in contracts {
            if entry.insert(*contract) {
                *self.jobs.entry(*contract).or_insert(0) += 1;
            }
        }
        debug!("Enabled {} contracts for {:?}", contracts.len(), caller);
    }

    fn disable(&mut self, caller: Address, contracts: &[Address]) {
        let entry = self.caller_contracts.entry(caller).or_default();
        for contract in contracts {
            if entry.remove(contract) {
                if let Some(count) = self.jobs.get_mut(contract) {
                    *count -= 1;
                    if *count == 0 {
                        self.jobs.remove(contract);
                    }
                }
            }
        }
        debug!("Disabled {} contracts for {:?}", contracts.len(), caller);
    }
}
