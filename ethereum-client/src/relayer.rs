//! Relayer-backed [`FhevmInstance`].
//!
//! Public networks are reached through the HTTP relayer, whose published
//! network parameters are fetched when the instance is built. Development
//! chains are served by the local node itself over JSON-RPC, so no parameter
//! download is involved.

use crate::{
    error::{ClientError, Result},
    instance::{FhevmInstance, InstanceFactory, InstanceTarget},
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::Eip712Domain;
use async_trait::async_trait;
use fhe_counter_lib::{ClearValue, DecryptionAuthorization, EncryptedHandle, EncryptedInput, KeyPair};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const DECRYPTION_DOMAIN_NAME: &str = "Decryption";
const DECRYPTION_DOMAIN_VERSION: &str = "1";

/// Parameters an instance needs for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParameters {
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub acl_contract_address: Address,
    pub verifying_contract_address_decryption: Address,
    pub verifying_contract_address_input_verification: Address,
    pub public_key_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputProofRequest {
    chain_id: u64,
    contract_address: Address,
    user_address: Address,
    values: Vec<TypedValue>,
}

#[derive(Debug, Serialize)]
struct TypedValue {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputProofResponse {
    handles: Vec<B256>,
    input_proof: Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDecryptBody {
    chain_id: u64,
    handle: EncryptedHandle,
    contract_address: Address,
    user_address: Address,
    public_key: Bytes,
    signature: Bytes,
    start_timestamp: u64,
    duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDecryptResponse {
    clear_value: String,
}

enum Endpoint {
    Relayer { client: reqwest::Client, base: Url },
    Node(DynProvider),
}

impl Endpoint {
    async fn call<Req, Resp>(&self, route: &str, method: &'static str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        match self {
            Self::Relayer { client, base } => {
                let url = base
                    .join(route)
                    .map_err(|e| ClientError::Config(format!("Invalid relayer route {route}: {e}")))?;
                let response = client.post(url).json(body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(ClientError::Relayer {
                        status_code: status.as_u16(),
                        message,
                    });
                }
                Ok(response.json().await?)
            }
            Self::Node(provider) => {
                let params = [serde_json::to_value(body)?];
                let value: serde_json::Value = provider.raw_request(method.into(), params).await?;
                Ok(serde_json::from_value(value)?)
            }
        }
    }
}

pub struct RelayerInstance {
    params: NetworkParameters,
    endpoint: Endpoint,
}

impl RelayerInstance {
    #[must_use]
    pub const fn parameters(&self) -> &NetworkParameters {
        &self.params
    }
}

#[async_trait]
impl FhevmInstance for RelayerInstance {
    fn chain_id(&self) -> u64 {
        self.params.chain_id
    }

    fn generate_keypair(&self) -> KeyPair {
        let signer = PrivateKeySigner::random();
        let public_key = signer.credential().verifying_key().to_sec1_bytes();
        KeyPair {
            public_key: Bytes::copy_from_slice(&public_key),
            private_key: Bytes::copy_from_slice(signer.to_bytes().as_slice()),
        }
    }

    fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(DECRYPTION_DOMAIN_NAME.into()),
            Some(DECRYPTION_DOMAIN_VERSION.into()),
            Some(U256::from(self.params.gateway_chain_id)),
            Some(self.params.verifying_contract_address_decryption),
            None,
        )
    }

    async fn encrypt(&self, contract: Address, user: Address, value: u32) -> Result<EncryptedInput> {
        let request = InputProofRequest {
            chain_id: self.params.chain_id,
            contract_address: contract,
            user_address: user,
            values: vec![TypedValue {
                kind: "euint32",
                value: value.to_string(),
            }],
        };
        let response: InputProofResponse = self
            .endpoint
            .call("v1/input-proof", "fhevm_input_proof", &request)
            .await
            .map_err(|e| ClientError::Encryption(e.to_string()))?;
        if response.handles.is_empty() {
            return Err(ClientError::Encryption("relayer returned no handles".to_string()));
        }
        Ok(EncryptedInput {
            handles: response.handles,
            input_proof: response.input_proof,
        })
    }

    async fn decrypt(
        &self,
        handle: EncryptedHandle,
        contract: Address,
        authorization: &DecryptionAuthorization,
    ) -> Result<ClearValue> {
        let body = UserDecryptBody {
            chain_id: self.params.chain_id,
            handle,
            contract_address: contract,
            user_address: authorization.owner_address,
            public_key: authorization.public_key.clone(),
            signature: authorization.signature.clone(),
            start_timestamp: authorization.issued_at,
            duration_seconds: authorization.valid_duration_seconds,
        };
        let response: UserDecryptResponse = self
            .endpoint
            .call("v1/user-decrypt", "fhevm_user_decrypt", &body)
            .await
            .map_err(|e| ClientError::Decryption(e.to_string()))?;
        let value = response
            .clear_value
            .parse::<i64>()
            .map_err(|e| ClientError::Decryption(format!("malformed clear value: {e}")))?;
        debug!("Decrypted handle {}", handle);
        Ok(ClearValue::new(value))
    }
}

pub struct RelayerInstanceFactory {
    client: reqwest::Client,
    relayer_url: Url,
}

impl RelayerInstanceFactory {
    pub fn new(relayer_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            relayer_url,
        })
    }

    async fn create_mock(&self, chain_id: u64, rpc_url: &Url) -> Result<RelayerInstance> {
        let provider = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();

        let remote_chain_id = provider.get_chain_id().await?;
        if remote_chain_id != chain_id {
            return Err(ClientError::InstanceBuild(format!(
                "node at {rpc_url} reports chain {remote_chain_id}, expected {chain_id}"
            )));
        }

        let params: NetworkParameters = provider
            .raw_request("fhevm_relayer_metadata".into(), Vec::<String>::new())
            .await
            .map_err(|e| {
                ClientError::InstanceBuild(format!("{rpc_url} is not an FHEVM development node: {e}"))
            })?;

        Ok(RelayerInstance {
            params,
            endpoint: Endpoint::Node(provider),
        })
    }

    async fn create_network(&self, chain_id: u64) -> Result<RelayerInstance> {
        let url = self
            .relayer_url
            .join(&format!("v1/networks/{chain_id}"))
            .map_err(|e| ClientError::Config(format!("Invalid relayer URL: {e}")))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::InstanceBuild(format!(
                "chain {chain_id} is not supported by the relayer"
            )));
        }
        if !status.is_success() {
            return Err(ClientError::Relayer {
                status_code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let params: NetworkParameters = response.json().await?;
        if params.chain_id != chain_id {
            return Err(ClientError::InstanceBuild(format!(
                "relayer returned parameters for chain {}, expected {chain_id}",
                params.chain_id
            )));
        }

        Ok(RelayerInstance {
            params,
            endpoint: Endpoint::Relayer {
                client: self.client.clone(),
                base: self.relayer_url.clone(),
            },
        })
    }
}

#[async_trait]
impl InstanceFactory for RelayerInstanceFactory {
    async fn create(&self, target: &InstanceTarget) -> Result<Arc<dyn FhevmInstance>> {
        let instance = match target {
            InstanceTarget::Mock { chain_id, rpc_url } => self.create_mock(*chain_id, rpc_url).await?,
            InstanceTarget::Network { chain_id } => self.create_network(*chain_id).await?,
        };
        info!(
            "FHEVM instance for chain {} uses public key {}",
            instance.params.chain_id, instance.params.public_key_id
        );
        Ok(Arc::new(instance))
    }
}
