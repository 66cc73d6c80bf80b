//! Chains the counter is commonly deployed to.

pub const MAINNET_CHAIN_ID: u64 = 1;
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const HARDHAT_CHAIN_ID: u64 = 31337;

/// Default local endpoint for the development chain.
pub const HARDHAT_RPC_URL: &str = "http://localhost:8545";

#[must_use]
pub const fn chain_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        SEPOLIA_CHAIN_ID => Some("Sepolia"),
        HARDHAT_CHAIN_ID => Some("Hardhat Local"),
        _ => None,
    }
}

/// Human readable network label, e.g. for a status line.
#[must_use]
pub fn network_label(chain_id: Option<u64>) -> String {
    match chain_id {
        Some(id) => chain_name(id).map_or_else(|| format!("Chain {id}"), str::to_string),
        None => "Unknown".to_string(),
    }
}
