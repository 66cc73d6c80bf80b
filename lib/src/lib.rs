use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod authorization;
pub mod chains;
pub mod handle;

pub use authorization::{AuthorizationKey, DecryptionAuthorization, KeyPair};
pub use handle::{ClearValue, EncryptedHandle, EncryptedInput, ExposureLabel};

sol! {
    /// EIP-712 payload the owner signs to allow local decryption of the
    /// handles held by `contractAddresses` for the given window.
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptRequest {
        bytes publicKey;
        address owner;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationSeconds;
        bytes extraData;
    }
}

impl UserDecryptRequest {
    #[must_use]
    pub fn new(
        public_key: Bytes,
        owner: Address,
        contract: Address,
        issued_at: u64,
        valid_duration_seconds: u64,
    ) -> Self {
        Self {
            publicKey: public_key,
            owner,
            contractAddresses: vec![contract],
            startTimestamp: U256::from(issued_at),
            durationSeconds: U256::from(valid_duration_seconds),
            extraData: Bytes::new(),
        }
    }

    /// Hash handed to the wallet for signing.
    #[must_use]
    pub fn signing_hash(&self, domain: &Eip712Domain) -> alloy_primitives::B256 {
        self.eip712_signing_hash(domain)
    }
}

/// State-changing entry points of the counter contract.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Increment,
    Decrement,
}

impl OperationKind {
    /// Operation that applies `delta`; `None` for a zero delta.
    #[must_use]
    pub const fn for_delta(delta: i64) -> Option<Self> {
        if delta > 0 {
            Some(Self::Increment)
        } else if delta < 0 {
            Some(Self::Decrement)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "increment" | "inc" => Ok(Self::Increment),
            "decrement" | "dec" => Ok(Self::Decrement),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}
