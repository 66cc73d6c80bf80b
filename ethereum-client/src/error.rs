use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Provider error: {0}")]
    Provider(#[from] alloy_transport::TransportError),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("FHEVM instance build failed: {0}")]
    InstanceBuild(String),

    #[error("FHECounter is not deployed on chain {0}")]
    ContractNotDeployed(u64),

    #[error("Decryption signature request was rejected")]
    AuthorizationDenied,

    #[error("Unable to build FHEVM decryption signature: {0}")]
    Authorization(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Relayer error: {status_code} - {message}")]
    Relayer { status_code: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Signature storage error: {0}")]
    Storage(String),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Array conversion error: {0}")]
    ArrayConversion(#[from] std::array::TryFromSliceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the user can retry the operation that produced this error
    /// without changing configuration.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::InvalidAddress(_)
            | Self::HexDecode(_)
            | Self::ArrayConversion(_)
            | Self::ContractNotDeployed(_) => false,
            Self::Relayer { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => true,
        }
    }

    /// Whether the user actively declined a wallet prompt.
    #[must_use]
    pub const fn is_user_rejection(&self) -> bool {
        matches!(self, Self::AuthorizationDenied | Self::TransactionRejected(_))
    }
}

/// Failure reported by a wallet for a signing request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("request rejected by user")]
    Rejected,

    #[error("{0}")]
    Failed(String),
}
