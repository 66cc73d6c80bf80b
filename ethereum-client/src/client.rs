use crate::{
    context::{CounterReader, CounterSigner},
    contracts::IFHECounter,
    error::{ClientError, Result, SignerError},
    types::TxOutcome,
};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, FixedBytes, Signature, TxHash, B256};
use alloy_provider::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionReceipt;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use fhe_counter_lib::{EncryptedHandle, EncryptedInput, OperationKind};
use tracing::{debug, info};
use url::Url;

/// Read-only counter access over HTTP.
#[derive(Clone)]
pub struct AlloyCounterReader {
    provider: DynProvider,
}

impl AlloyCounterReader {
    #[must_use]
    pub fn connect(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self { provider }
    }

    #[must_use]
    pub const fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl CounterReader for AlloyCounterReader {
    async fn get_count(&self, contract: Address) -> Result<EncryptedHandle> {
        let counter = IFHECounter::new(contract, self.provider.clone());
        let handle = counter
            .getCount()
            .call()
            .await
            .map_err(|e| ClientError::Contract(e.to_string()))?;
        debug!("getCount() on {} returned {}", contract, handle);
        Ok(EncryptedHandle::new(handle))
    }
}

/// Signer backed by a local private key; transactions are filled and
/// signed by the wallet layer of the provider.
pub struct LocalWalletSigner {
    signer: PrivateKeySigner,
    provider: DynProvider,
}

impl LocalWalletSigner {
    #[must_use]
    pub fn new(signer: PrivateKeySigner, rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(rpc_url)
            .erased();
        Self { signer, provider }
    }

    /// `private_key` is hex, with or without a `0x` prefix.
    pub fn from_private_key(private_key: &str, rpc_url: Url) -> Result<Self> {
        let signer = parse_private_key(private_key)?;
        Ok(Self::new(signer, rpc_url))
    }
}

pub fn parse_private_key(private_key: &str) -> Result<PrivateKeySigner> {
    let raw = hex::decode(private_key.trim().trim_start_matches("0x"))?;
    PrivateKeySigner::from_bytes(&FixedBytes::<32>::try_from(raw.as_slice())?)
        .map_err(|e| ClientError::Signer(e.to_string()))
}

fn outcome_from_receipt(receipt: &TransactionReceipt) -> TxOutcome {
    TxOutcome {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
        success: receipt.status(),
    }
}

#[async_trait]
impl CounterSigner for LocalWalletSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_hash(&self, hash: B256) -> std::result::Result<Signature, SignerError> {
        self.signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SignerError::Failed(e.to_string()))
    }

    async fn submit(
        &self,
        contract: Address,
        kind: OperationKind,
        input: &EncryptedInput,
    ) -> Result<TxHash> {
        let handle = *input
            .handles
            .first()
            .ok_or_else(|| ClientError::Encryption("encrypted input carries no handle".to_string()))?;
        let proof = input.input_proof.clone();
        let counter = IFHECounter::new(contract, self.provider.clone());

        let pending = match kind {
            OperationKind::Increment => counter.increment(handle, proof).send().await,
            OperationKind::Decrement => counter.decrement(handle, proof).send().await,
        }
        .map_err(|e| ClientError::TransactionRejected(e.to_string()))?;

        let tx_hash = *pending.tx_hash();
        info!("Submitted {} to {}: {}", kind, contract, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxOutcome> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .get_receipt()
            .await
            .map_err(|e| ClientError::TransactionFailed(e.to_string()))?;
        let outcome = outcome_from_receipt(&receipt);
        debug!("Receipt for {}: {:?}", tx_hash, outcome);
        Ok(outcome)
    }
}
