//! Log decoding for registry events
//!
//! Maps raw vault/relayer logs onto `RegistryEvent`. Logs from any other
//! emitter, or with an unrecognized topic0, decode to `None`.

use alloy::primitives::{Address, LogData};
use alloy::sol_types::SolEvent;
use tracing::{trace, warn};

use super::state::RegistryEvent;
use crate::contracts::{IStealthRelayer, IStealthVault};

/// Decode a log emitted by `vault` or `relayer`.
pub fn decode_registry_log(
    emitter: Address,
    data: &LogData,
    vault: Address,
    relayer: Address,
) -> Option<RegistryEvent> {
    let topic0 = *data.topics().first()?;

    if emitter == relayer {
        if topic0 == IStealthRelayer::PenaltySet::SIGNATURE_HASH {
            return decode::<IStealthRelayer::PenaltySet>(data)
                .map(|ev| RegistryEvent::PenaltySet { penalty: ev._penalty });
        }
        trace!("Ignoring relayer log topic {:?}", topic0);
        return None;
    }

    if emitter != vault {
        return None;
    }

    match topic0 {
        t if t == IStealthVault::Bonded::SIGNATURE_HASH => decode::<IStealthVault::Bonded>(data)
            .map(|ev| RegistryEvent::Bonded {
                caller: ev._caller,
                amount: ev._amount,
            }),
        t if t == IStealthVault::Unbonded::SIGNATURE_HASH => {
            decode::<IStealthVault::Unbonded>(data).map(|ev| RegistryEvent::Unbonded {
                caller: ev._caller,
                amount: ev._amount,
            })
        }
        t if t == IStealthVault::PenaltyApplied::SIGNATURE_HASH => {
            decode::<IStealthVault::PenaltyApplied>(data).map(|ev| RegistryEvent::PenaltyApplied {
                hash: ev._hash,
                caller: ev._caller,
                penalty: ev._penalty,
                reporter: ev._reportedBy,
            })
        }
        t if t == IStealthVault::StealthContractEnabled::SIGNATURE_HASH => {
            decode::<IStealthVault::StealthContractEnabled>(data).map(|ev| {
                RegistryEvent::ContractsEnabled {
                    caller: ev._caller,
                    contracts: vec![ev._contract],
                }
            })
        }
        t if t == IStealthVault::StealthContractsEnabled::SIGNATURE_HASH => {
            decode::<IStealthVault::StealthContractsEnabled>(data).map(|ev| {
                RegistryEvent::ContractsEnabled {
                    caller: ev._caller,
                    contracts: ev._contracts,
                }
            })
        }
        t if t == IStealthVault::StealthContractDisabled::SIGNATURE_HASH => {
            decode::<IStealthVault::StealthContractDisabled>(data).map(|ev| {
                RegistryEvent::ContractsDisabled {
                    caller: ev._caller,
                    contracts: vec![ev._contract],
                }
            })
        }
        t if t == IStealthVault::StealthContractsDisabled::SIGNATURE_HASH => {
            decode::<IStealthVault::StealthContractsDisabled>(data).map(|ev| {
                RegistryEvent::ContractsDisabled {
                    caller: ev._caller,
                    contracts: ev._contracts,
                }
            })
        }
        _ => {
            trace!("Ignoring vault log topic {:?}", topic0);
            None
        }
    }
}

fn decode<E: SolEvent>(data: &LogData) -> Option<E> {
    match E::decode_log_data(data) {
        Ok(ev) => Some(ev),
        Err(e) => {
            warn!("Malformed {} log: {}", E::SIGNATURE, e);
            None
        }
    }
}
