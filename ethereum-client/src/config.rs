use crate::{
    client::parse_private_key,
    controller::{ControllerSettings, DEFAULT_VALIDITY_SECONDS},
    error::{ClientError, Result},
    instance::InstanceManagerConfig,
    registry::{Deployment, StaticRegistry},
};
use alloy_primitives::Address;
use fhe_counter_lib::chains;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_RELAYER_URL: &str = "https://relayer.testnet.zama.cloud";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub deployments: Vec<Deployment>,
    pub deployments_file: Option<PathBuf>,
    /// Development chains served by a local node, by chain id.
    pub mock_chains: HashMap<u64, Url>,
    pub relayer: RelayerConfig,
    pub instance: InstanceConfig,
    pub authorization: AuthorizationConfig,
    pub signer: Option<SignerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    pub url: Url,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub enabled: bool,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    pub valid_duration_seconds: u64,
    /// Unset keeps authorizations in memory only.
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    pub private_key: String,
    pub address: Address,
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("Invalid {name}: {e}"))),
        _ => Ok(default),
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name).ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from)
}

/// Parse `chainId=value,chainId=value`.
pub fn parse_chain_map<T: FromStr>(raw: &str) -> Result<HashMap<u64, T>>
where
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (chain, value) = entry
                .split_once('=')
                .ok_or_else(|| ClientError::Config(format!("Expected chainId=value, got {entry:?}")))?;
            let chain_id = chain
                .trim()
                .parse::<u64>()
                .map_err(|e| ClientError::Config(format!("Invalid chain id {chain:?}: {e}")))?;
            let value = value
                .trim()
                .parse::<T>()
                .map_err(|e| ClientError::Config(format!("Invalid value for chain {chain_id}: {e}")))?;
            Ok((chain_id, value))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let chain_id: u64 = env_or("CHAIN_ID", chains::HARDHAT_CHAIN_ID)?;
        let rpc_url = env::var("ETHEREUM_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let rpc_url = Url::parse(&rpc_url)
            .map_err(|e| ClientError::Config(format!("Invalid ETHEREUM_RPC_URL: {e}")))?;

        let deployments = parse_chain_map::<Address>(&env::var("FHE_COUNTER_DEPLOYMENTS").unwrap_or_default())
            .map_err(|e| ClientError::InvalidAddress(format!("FHE_COUNTER_DEPLOYMENTS: {e}")))?
            .into_iter()
            .map(|(chain_id, address)| Deployment {
                chain_id,
                address,
                chain_name: chains::chain_name(chain_id).map(str::to_string),
            })
            .collect();

        let mock_chains = match env::var("MOCK_CHAINS") {
            Ok(raw) => parse_chain_map::<Url>(&raw)?,
            Err(_) => Self::default_mock_chains(),
        };

        let relayer_url = env::var("RELAYER_URL").unwrap_or_else(|_| DEFAULT_RELAYER_URL.to_string());
        let relayer_url = Url::parse(&relayer_url)
            .map_err(|e| ClientError::Config(format!("Invalid RELAYER_URL: {e}")))?;

        let signer = if let Ok(private_key) = env::var("ETHEREUM_WALLET_PRIVATE_KEY") {
            let address = parse_private_key(&private_key)?.address();
            Some(SignerConfig {
                private_key,
                address,
            })
        } else {
            None
        };

        Ok(Self {
            network: NetworkConfig {
                name: chains::network_label(Some(chain_id)),
                chain_id,
                rpc_url,
            },
            deployments,
            deployments_file: env_path("FHE_COUNTER_DEPLOYMENTS_FILE"),
            mock_chains,
            relayer: RelayerConfig {
                url: relayer_url,
                timeout_seconds: env_or("RELAYER_TIMEOUT_SECONDS", 30)?,
            },
            instance: InstanceConfig {
                enabled: env_or("FHEVM_ENABLED", true)?,
                retry_attempts: env_or("INSTANCE_RETRY_ATTEMPTS", 0)?,
                retry_delay_ms: env_or("INSTANCE_RETRY_DELAY_MS", 1000)?,
            },
            authorization: AuthorizationConfig {
                valid_duration_seconds: env_or("DECRYPTION_VALIDITY_SECONDS", DEFAULT_VALIDITY_SECONDS)?,
                store_path: env_path("SIGNATURE_STORE_PATH"),
            },
            signer,
        })
    }

    fn default_mock_chains() -> HashMap<u64, Url> {
        Url::parse(chains::HARDHAT_RPC_URL)
            .map(|url| HashMap::from([(chains::HARDHAT_CHAIN_ID, url)]))
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.as_str().is_empty() {
            return Err(ClientError::Config("ETHEREUM_RPC_URL is required".to_string()));
        }

        if self.authorization.valid_duration_seconds == 0 {
            return Err(ClientError::Config(
                "Decryption validity must be greater than 0".to_string(),
            ));
        }

        if self.relayer.timeout_seconds == 0 {
            return Err(ClientError::Config(
                "Relayer timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(signer) = &self.signer {
            let derived = parse_private_key(&signer.private_key)?.address();
            if derived != signer.address {
                return Err(ClientError::Config(format!(
                    "Private key address ({derived}) does not match configured address ({})",
                    signer.address
                )));
            }
        }

        Ok(())
    }

    /// Deployments from the file first, then inline ones on top.
    pub fn registry(&self) -> Result<StaticRegistry> {
        let mut registry = match &self.deployments_file {
            Some(path) => StaticRegistry::from_file(path)?,
            None => StaticRegistry::default(),
        };
        registry.extend(StaticRegistry::new(self.deployments.iter().cloned()));
        Ok(registry)
    }

    #[must_use]
    pub fn instance_manager_config(&self) -> InstanceManagerConfig {
        InstanceManagerConfig {
            retry_attempts: self.instance.retry_attempts,
            retry_delay: Duration::from_millis(self.instance.retry_delay_ms),
        }
    }

    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            valid_duration_seconds: self.authorization.valid_duration_seconds,
            fhevm_enabled: self.instance.enabled,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: chains::network_label(Some(chains::HARDHAT_CHAIN_ID)),
                chain_id: chains::HARDHAT_CHAIN_ID,
                rpc_url: Url::parse(DEFAULT_RPC_URL).unwrap(),
            },
            deployments: Vec::new(),
            deployments_file: None,
            mock_chains: Self::default_mock_chains(),
            relayer: RelayerConfig {
                url: Url::parse(DEFAULT_RELAYER_URL).unwrap(),
                timeout_seconds: 30,
            },
            instance: InstanceConfig {
                enabled: true,
                retry_attempts: 0,
                retry_delay_ms: 1000,
            },
            authorization: AuthorizationConfig {
                valid_duration_seconds: DEFAULT_VALIDITY_SECONDS,
                store_path: None,
            },
            signer: None,
        }
    }
}
