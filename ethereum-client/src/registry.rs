use crate::error::{ClientError, Result};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Where the counter lives on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub chain_id: u64,
    pub address: Address,
    #[serde(default)]
    pub chain_name: Option<String>,
}

/// Chain id to deployment lookup.
pub trait ContractRegistry: Send + Sync {
    fn lookup(&self, chain_id: u64) -> Option<Deployment>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    deployments: HashMap<u64, Deployment>,
}

impl StaticRegistry {
    #[must_use]
    pub fn new(deployments: impl IntoIterator<Item = Deployment>) -> Self {
        let mut registry = Self::default();
        for deployment in deployments {
            registry.insert(deployment);
        }
        registry
    }

    #[must_use]
    pub fn with_deployment(mut self, chain_id: u64, address: Address) -> Self {
        self.insert(Deployment {
            chain_id,
            address,
            chain_name: fhe_counter_lib::chains::chain_name(chain_id).map(str::to_string),
        });
        self
    }

    /// Later entries for the same chain replace earlier ones.
    pub fn insert(&mut self, deployment: Deployment) {
        self.deployments.insert(deployment.chain_id, deployment);
    }

    pub fn extend(&mut self, other: Self) {
        self.deployments.extend(other.deployments);
    }

    /// Parse a deployments document keyed by chain id:
    ///
    /// ```json
    /// { "11155111": { "address": "0x...", "chainId": 11155111, "chainName": "sepolia" } }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: HashMap<String, Deployment> = serde_json::from_str(json)?;
        let mut registry = Self::default();
        for (chain_key, deployment) in entries {
            let chain_id: u64 = chain_key
                .parse()
                .map_err(|e| ClientError::Config(format!("Invalid chain id {chain_key:?}: {e}")))?;
            if chain_id != deployment.chain_id {
                return Err(ClientError::Config(format!(
                    "Deployment under chain {chain_id} declares chainId {}",
                    deployment.chain_id
                )));
            }
            registry.insert(deployment);
        }
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

impl ContractRegistry for StaticRegistry {
    fn lookup(&self, chain_id: u64) -> Option<Deployment> {
        self.deployments
            .get(&chain_id)
            .filter(|deployment| deployment.address != Address::ZERO)
            .cloned()
    }
}
