//! Chain/account context.
//!
//! Holds the current chain id, provider and signer and broadcasts a change
//! notification whenever any of them moves. Async operations capture the
//! identities they started under and compare them with [`ChainContext::same_chain`]
//! and [`ChainContext::same_signer`] when they resume.

use crate::{
    error::{Result, SignerError},
    types::TxOutcome,
};
use alloy_primitives::{Address, Signature, TxHash, B256};
use async_trait::async_trait;
use fhe_counter_lib::{EncryptedHandle, EncryptedInput, OperationKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use url::Url;

/// Read-only access to the counter contract.
#[async_trait]
pub trait CounterReader: Send + Sync {
    async fn get_count(&self, contract: Address) -> Result<EncryptedHandle>;
}

/// Transaction-capable account.
#[async_trait]
pub trait CounterSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign an EIP-712 digest. Wallets that prompt report a refusal as
    /// [`SignerError::Rejected`].
    async fn sign_hash(&self, hash: B256) -> std::result::Result<Signature, SignerError>;

    async fn submit(
        &self,
        contract: Address,
        kind: OperationKind,
        input: &EncryptedInput,
    ) -> Result<TxHash>;

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxOutcome>;
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a connected provider. A fresh id is issued on every connect.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

/// Identity of a connected signer. A fresh id is issued on every account change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignerId(u64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signer#{}", self.0)
    }
}

#[derive(Clone)]
pub struct ProviderHandle {
    id: ProviderId,
    reader: Arc<dyn CounterReader>,
}

impl ProviderHandle {
    #[must_use]
    pub const fn id(&self) -> ProviderId {
        self.id
    }

    #[must_use]
    pub const fn reader(&self) -> &Arc<dyn CounterReader> {
        &self.reader
    }
}

#[derive(Clone)]
pub struct SignerHandle {
    id: SignerId,
    address: Address,
    signer: Arc<dyn CounterSigner>,
}

impl SignerHandle {
    fn new(signer: Arc<dyn CounterSigner>) -> Self {
        Self {
            id: SignerId(next_identity()),
            address: signer.address(),
            signer,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SignerId {
        self.id
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub const fn signer(&self) -> &Arc<dyn CounterSigner> {
        &self.signer
    }
}

/// Point-in-time view of the context.
#[derive(Clone, Default)]
pub struct ContextSnapshot {
    pub chain_id: Option<u64>,
    pub accounts: Vec<Address>,
    pub provider: Option<ProviderHandle>,
    pub signer: Option<SignerHandle>,
}

impl ContextSnapshot {
    #[must_use]
    pub fn provider_id(&self) -> Option<ProviderId> {
        self.provider.as_ref().map(ProviderHandle::id)
    }

    #[must_use]
    pub fn signer_id(&self) -> Option<SignerId> {
        self.signer.as_ref().map(SignerHandle::id)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.provider.is_some() && self.chain_id.is_some()
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("chain_id", &self.chain_id)
            .field("accounts", &self.accounts)
            .field("provider", &self.provider_id())
            .field("signer", &self.signer_id())
            .finish()
    }
}

pub struct ChainContext {
    tx: watch::Sender<ContextSnapshot>,
    mock_chains: HashMap<u64, Url>,
}

impl ChainContext {
    /// `mock_chains` maps development chain ids to their local RPC endpoint.
    #[must_use]
    pub fn new(mock_chains: HashMap<u64, Url>) -> Self {
        let (tx, _rx) = watch::channel(ContextSnapshot::default());
        Self { tx, mock_chains }
    }

    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ContextSnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub const fn mock_chains(&self) -> &HashMap<u64, Url> {
        &self.mock_chains
    }

    /// Connect a new provider (and optionally a signer) on `chain_id`.
    pub fn connect(
        &self,
        chain_id: u64,
        reader: Arc<dyn CounterReader>,
        signer: Option<Arc<dyn CounterSigner>>,
    ) {
        let provider = ProviderHandle {
            id: ProviderId(next_identity()),
            reader,
        };
        let signer = signer.map(SignerHandle::new);
        info!(
            "Connected {} on chain {} (signer: {:?})",
            provider.id,
            chain_id,
            signer.as_ref().map(SignerHandle::address)
        );
        self.tx.send_replace(ContextSnapshot {
            chain_id: Some(chain_id),
            accounts: signer.iter().map(SignerHandle::address).collect(),
            provider: Some(provider),
            signer,
        });
    }

    /// Switch the connected provider to another chain. The provider keeps its
    /// identity; the reader is replaced by one bound to the new chain.
    pub fn switch_chain(&self, chain_id: u64, reader: Arc<dyn CounterReader>) {
        self.tx.send_modify(|snapshot| {
            info!("Switching chain {:?} -> {}", snapshot.chain_id, chain_id);
            snapshot.chain_id = Some(chain_id);
            snapshot.provider = Some(ProviderHandle {
                id: snapshot
                    .provider
                    .as_ref()
                    .map_or_else(|| ProviderId(next_identity()), ProviderHandle::id),
                reader,
            });
        });
    }

    /// Replace the active account. Every call issues a new signer identity,
    /// even when the address is unchanged.
    pub fn switch_account(&self, signer: Option<Arc<dyn CounterSigner>>) {
        let signer = signer.map(SignerHandle::new);
        self.tx.send_modify(|snapshot| {
            info!(
                "Switching account {:?} -> {:?}",
                snapshot.signer.as_ref().map(SignerHandle::address),
                signer.as_ref().map(SignerHandle::address)
            );
            snapshot.accounts = signer.iter().map(SignerHandle::address).collect();
            snapshot.signer = signer;
        });
    }

    pub fn disconnect(&self) {
        info!("Disconnected");
        self.tx.send_replace(ContextSnapshot::default());
    }

    /// Whether the chain is still the one captured at the start of an operation.
    #[must_use]
    pub fn same_chain(&self, captured: Option<u64>) -> bool {
        self.tx.borrow().chain_id == captured
    }

    /// Whether the signer is still the one captured at the start of an operation.
    #[must_use]
    pub fn same_signer(&self, captured: Option<SignerId>) -> bool {
        self.tx.borrow().signer_id() == captured
    }
}
