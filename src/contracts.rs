//! Centralized Contract Definitions
//!
//! Solidity interfaces for the StealthVault and StealthRelayer, defined
//! using alloy's `sol!` macro.
//!
//! Each interface is annotated with `#[sol(rpc)]` to generate contract
//! instance types that can make RPC calls via any alloy Provider. The
//! generated `*Call` structs are also used offline by the calldata decoder
//! and by the reporter to encode `reportHash`.
//!
//! Created: 2026-10-18

use alloy::sol;

// ── StealthVault ─────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IStealthVault {
        event Bonded(address indexed _caller, uint256 _amount);
        event Unbonded(address indexed _caller, uint256 _amount);
        event PenaltyApplied(bytes32 indexed _hash, address indexed _caller, uint256 _penalty, address indexed _reportedBy);
        event StealthContractEnabled(address indexed _caller, address _contract);
        event StealthContractsEnabled(address indexed _caller, address[] _contracts);
        event StealthContractDisabled(address indexed _caller, address _contract);
        event StealthContractsDisabled(address indexed _caller, address[] _contracts);
        event ValidatedHash(bytes32 indexed _hash, address indexed _caller, uint256 _penalty);

        function callers() external view returns (address[] memory);
        function callerContracts(address _caller) external view returns (address[] memory);
        function bonded(address _caller) external view returns (uint256);
        function reportHash(bytes32 _hash) external;
    }
}

// ── StealthRelayer ───────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IStealthRelayer {
        event PenaltySet(uint256 _penalty);

        function penalty() external view returns (uint256);

        function execute(address _job, bytes calldata _callData, bytes32 _stealthHash, uint256 _blockNumber) external payable returns (bytes memory);
        function executeAndPay(address _job, bytes calldata _callData, bytes32 _stealthHash, uint256 _blockNumber, uint256 _payment) external payable returns (bytes memory);
        function executeWithoutBlockProtection(address _job, bytes calldata _callData, bytes32 _stealthHash) external payable returns (bytes memory);
        function executeWithoutBlockProtectionAndPay(address _job, bytes calldata _callData, bytes32 _stealthHash, uint256 _payment) external payable returns (bytes memory);
    }
}
