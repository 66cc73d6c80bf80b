//! FHEVM instance lifecycle.
//!
//! The [`InstanceManager`] owns the cryptographic instance for the current
//! `(provider, chain)` pair and rebuilds it from scratch whenever that pair
//! changes. Builds are tagged with a generation number; a build whose
//! generation is no longer current when it finishes is dropped.

use crate::{context::ProviderId, error::Result};
use alloy_primitives::Address;
use alloy_sol_types::Eip712Domain;
use async_trait::async_trait;
use fhe_counter_lib::{ClearValue, DecryptionAuthorization, EncryptedHandle, EncryptedInput, KeyPair};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Client-side cryptographic capability bound to one chain.
#[async_trait]
pub trait FhevmInstance: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Fresh key pair for a decryption channel.
    fn generate_keypair(&self) -> KeyPair;

    /// Domain decryption authorizations are signed under.
    fn eip712_domain(&self) -> Eip712Domain;

    /// Encrypt `value` as an `euint32` input for `contract`, bound to `user`.
    async fn encrypt(&self, contract: Address, user: Address, value: u32) -> Result<EncryptedInput>;

    async fn decrypt(
        &self,
        handle: EncryptedHandle,
        contract: Address,
        authorization: &DecryptionAuthorization,
    ) -> Result<ClearValue>;
}

/// What an instance is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceTarget {
    /// Development chain served by a local node; no network parameters needed.
    Mock { chain_id: u64, rpc_url: Url },
    /// Public network using published parameters.
    Network { chain_id: u64 },
}

impl InstanceTarget {
    #[must_use]
    pub fn resolve(chain_id: u64, mock_chains: &HashMap<u64, Url>) -> Self {
        match mock_chains.get(&chain_id) {
            Some(rpc_url) => Self::Mock {
                chain_id,
                rpc_url: rpc_url.clone(),
            },
            None => Self::Network { chain_id },
        }
    }

    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        match self {
            Self::Mock { chain_id, .. } | Self::Network { chain_id } => *chain_id,
        }
    }
}

#[async_trait]
pub trait InstanceFactory: Send + Sync {
    async fn create(&self, target: &InstanceTarget) -> Result<Arc<dyn FhevmInstance>>;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(status)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub provider_id: ProviderId,
    pub chain_id: u64,
}

#[derive(Clone, Default)]
pub struct InstanceState {
    pub status: InstanceStatus,
    pub key: Option<InstanceKey>,
    /// Build generation this state belongs to.
    pub generation: u64,
    pub instance: Option<Arc<dyn FhevmInstance>>,
    pub error: Option<String>,
}

impl InstanceState {
    /// The instance, if ready and bound to `chain_id`.
    #[must_use]
    pub fn ready_for(&self, chain_id: Option<u64>) -> Option<&Arc<dyn FhevmInstance>> {
        match (self.status, self.key, chain_id) {
            (InstanceStatus::Ready, Some(key), Some(chain_id)) if key.chain_id == chain_id => {
                self.instance.as_ref()
            }
            _ => None,
        }
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceState")
            .field("status", &self.status)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("has_instance", &self.instance.is_some())
            .field("error", &self.error)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InstanceManagerConfig {
    /// Extra build attempts after a failure.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for InstanceManagerConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 0,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Default)]
struct Tracking {
    key: Option<InstanceKey>,
    generation: u64,
}

pub struct InstanceManager {
    factory: Arc<dyn InstanceFactory>,
    config: InstanceManagerConfig,
    tracking: Mutex<Tracking>,
    state_tx: watch::Sender<InstanceState>,
}

impl InstanceManager {
    #[must_use]
    pub fn new(factory: Arc<dyn InstanceFactory>, config: InstanceManagerConfig) -> Self {
        let (state_tx, _rx) = watch::channel(InstanceState::default());
        Self {
            factory,
            config,
            tracking: Mutex::new(Tracking::default()),
            state_tx,
        }
    }

    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state_tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<InstanceState> {
        self.state_tx.subscribe()
    }

    /// Whether `generation` is still the one being served.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.tracking.lock().generation == generation
    }

    /// Return the instance for `(provider_id, chain_id)`, building it if the
    /// pair changed or the last build for it failed. Failures are reported
    /// through the returned state.
    #[instrument(skip(self, mock_chains), level = "debug")]
    pub async fn get_or_create(
        &self,
        provider_id: Option<ProviderId>,
        chain_id: Option<u64>,
        mock_chains: &HashMap<u64, Url>,
        enabled: bool,
    ) -> InstanceState {
        let (Some(provider_id), Some(chain_id), true) = (provider_id, chain_id, enabled) else {
            self.reset();
            return self.state();
        };
        let key = InstanceKey {
            provider_id,
            chain_id,
        };

        let generation = {
            let mut tracking = self.tracking.lock();
            let failed = self.state_tx.borrow().status == InstanceStatus::Error;
            if tracking.key == Some(key) && !failed {
                None
            } else {
                tracking.key = Some(key);
                tracking.generation += 1;
                self.state_tx.send_replace(InstanceState {
                    status: InstanceStatus::Loading,
                    key: Some(key),
                    generation: tracking.generation,
                    instance: None,
                    error: None,
                });
                Some(tracking.generation)
            }
        };

        match generation {
            Some(generation) => {
                let target = InstanceTarget::resolve(chain_id, mock_chains);
                self.build(key, generation, target).await
            }
            None => self.wait_settled(key).await,
        }
    }

    /// Drop the current instance and go back to idle.
    pub fn reset(&self) {
        let mut tracking = self.tracking.lock();
        if tracking.key.is_none() && self.state_tx.borrow().status == InstanceStatus::Idle {
            return;
        }
        tracking.key = None;
        tracking.generation += 1;
        self.state_tx.send_replace(InstanceState {
            generation: tracking.generation,
            ..InstanceState::default()
        });
        debug!("FHEVM instance reset to idle");
    }

    async fn wait_settled(&self, key: InstanceKey) -> InstanceState {
        let mut rx = self.state_tx.subscribe();
        let settled = rx
            .wait_for(|state| state.key != Some(key) || state.status != InstanceStatus::Loading)
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    async fn build(&self, key: InstanceKey, generation: u64, target: InstanceTarget) -> InstanceState {
        info!("Building FHEVM instance for {:?} (generation {})", target, generation);

        let mut attempt = 0;
        let outcome = loop {
            if !self.is_current(generation) {
                debug!("Instance build generation {} superseded before attempt", generation);
                return self.state();
            }
            match self.factory.create(&target).await {
                Ok(instance) => break Ok(instance),
                Err(e) if attempt < self.config.retry_attempts => {
                    attempt += 1;
                    warn!(
                        "FHEVM instance build failed (attempt {}/{}): {}",
                        attempt,
                        self.config.retry_attempts + 1,
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let tracking = self.tracking.lock();
        if tracking.generation != generation {
            debug!("Dropping FHEVM instance built for superseded generation {}", generation);
            drop(tracking);
            return self.state();
        }

        let state = match outcome {
            Ok(instance) => {
                info!("FHEVM instance ready for chain {}", key.chain_id);
                InstanceState {
                    status: InstanceStatus::Ready,
                    key: Some(key),
                    generation,
                    instance: Some(instance),
                    error: None,
                }
            }
            Err(e) => {
                warn!("FHEVM instance build failed for chain {}: {}", key.chain_id, e);
                InstanceState {
                    status: InstanceStatus::Error,
                    key: Some(key),
                    generation,
                    instance: None,
                    error: Some(e.to_string()),
                }
            }
        };
        self.state_tx.send_replace(state.clone());
        state
    }
}
