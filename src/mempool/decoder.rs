//! Stealth Hash Extractor: Calldata Decoder
//!
//! Purpose:
//!     Recover the stealth hash from relayer calldata. Only the four
//!     hash-bearing relayer entry points are recognized; any other selector
//!     is "not a hash-bearing call", never an error.
//!
//! Supported Function Selectors (IStealthRelayer):
//!     execute(address,bytes,bytes32,uint256)
//!     executeAndPay(address,bytes,bytes32,uint256,uint256)
//!     executeWithoutBlockProtection(address,bytes,bytes32)
//!     executeWithoutBlockProtectionAndPay(address,bytes,bytes32,uint256)
//!
//! Notes:
//!     - Selectors come from the `sol!` bindings, not hand-written constants
//!     - Malformed arguments after a known selector are logged and dropped

use alloy::sol_types::SolCall;
use tracing::{debug, trace};

use crate::contracts::IStealthRelayer::{
    executeAndPayCall, executeCall, executeWithoutBlockProtectionAndPayCall,
    executeWithoutBlockProtectionCall,
};
use crate::types::{StealthCall, StealthMethod};

/// Decode a hash-bearing relayer call from transaction input bytes.
/// Returns None for unknown selectors and for malformed arguments.
pub fn extract(input: &[u8]) -> Option<StealthCall> {
    if input.len() < 4 {
        return None;
    }
    let selector: [u8; 4] = input[..4].try_into().ok()?;

    let decoded = match selector {
        executeCall::SELECTOR => executeCall::abi_decode(input).map(|c| StealthCall {
            method: StealthMethod::Execute,
            job: c._job,
            stealth_hash: c._stealthHash,
            block_number: Some(c._blockNumber),
        }),
        executeAndPayCall::SELECTOR => executeAndPayCall::abi_decode(input).map(|c| StealthCall {
            method: StealthMethod::ExecuteAndPay,
            job: c._job,
            stealth_hash: c._stealthHash,
            block_number: Some(c._blockNumber),
        }),
        executeWithoutBlockProtectionCall::SELECTOR => {
            executeWithoutBlockProtectionCall::abi_decode(input).map(|c| StealthCall {
                method: StealthMethod::ExecuteWithoutBlockProtection,
                job: c._job,
                stealth_hash: c._stealthHash,
                block_number: None,
            })
        }
        executeWithoutBlockProtectionAndPayCall::SELECTOR => {
            executeWithoutBlockProtectionAndPayCall::abi_decode(input).map(|c| StealthCall {
                method: StealthMethod::ExecuteWithoutBlockProtectionAndPay,
                job: c._job,
                stealth_hash: c._stealthHash,
                block_number: None,
            })
        }
        _ => {
            trace!("Not a hash-bearing call: {}", selector_hex(input));
            return None;
        }
    };

    match decoded {
        Ok(call) => Some(call),
        Err(e) => {
            debug!("Malformed relayer calldata {}: {}", selector_hex(input), e);
            None
        }
    }
}

/// Return the 4-byte selector as a hex string for logging
pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x????".to_string();
    }
    format!("0x{:02x}{:02x}{:02x}{:02x}", input[0], input[1], input[2], input[3])
}
