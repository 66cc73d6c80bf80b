use crate::{context::SignerId, error::ClientError, instance::InstanceStatus};
use alloy_primitives::{Address, TxHash};
use fhe_counter_lib::{ClearValue, EncryptedHandle, ExposureLabel, OperationKind};
use serde::Serialize;
use std::fmt;

/// Everything the presentation layer observes about the counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterView {
    pub chain_id: Option<u64>,
    pub contract_address: Option<Address>,
    /// `None` until the chain is known.
    pub is_deployed: Option<bool>,
    pub instance_status: InstanceStatus,
    pub handle: Option<EncryptedHandle>,
    pub clear: Option<ClearValue>,
    pub is_decrypted: bool,
    pub is_decrypting: bool,
    pub is_refreshing: bool,
    pub is_inc_or_dec: bool,
    pub can_refresh: bool,
    pub can_decrypt: bool,
    pub can_inc_or_dec: bool,
    pub message: String,
}

impl CounterView {
    #[must_use]
    pub const fn exposure(&self) -> ExposureLabel {
        ExposureLabel::from_clear(self.clear)
    }
}

/// Transaction in flight, with the identity it was submitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub captured_chain_id: Option<u64>,
    pub captured_signer: Option<SignerId>,
}

/// Result of waiting for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutcome {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub success: bool,
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { 1 } else { 0 };
        write!(f, "tx {} status={} gas={}", self.tx_hash, status, self.gas_used)?;
        if let Some(block) = self.block_number {
            write!(f, " block={block}")?;
        }
        Ok(())
    }
}

/// Why an operation was refused before it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    NotDeployed,
    NoProvider,
    NoSigner,
    InstanceNotReady,
    NoHandle,
    Busy,
    ZeroDelta,
    OperandOutOfRange,
    /// The context moved and the controller has not resolved it yet.
    ContextChanging,
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotDeployed => "contract not deployed on this chain",
            Self::NoProvider => "no provider connected",
            Self::NoSigner => "no signer connected",
            Self::InstanceNotReady => "FHEVM instance not ready",
            Self::NoHandle => "no count handle fetched yet",
            Self::Busy => "operation already in progress",
            Self::ZeroDelta => "delta must be non-zero",
            Self::OperandOutOfRange => "delta does not fit in euint32",
            Self::ContextChanging => "chain or account is changing",
        };
        f.write_str(reason)
    }
}

/// How a controller operation ended.
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Applied(T),
    Rejected(GateReason),
    /// The world changed while the operation was suspended.
    Discarded,
    Failed(ClientError),
}

impl<T> OperationOutcome<T> {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub const fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded)
    }

    #[must_use]
    pub const fn rejection(&self) -> Option<GateReason> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    #[must_use]
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            _ => None,
        }
    }
}
