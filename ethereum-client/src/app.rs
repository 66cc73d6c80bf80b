use crate::{
    authorization::AuthorizationCache,
    client::{AlloyCounterReader, LocalWalletSigner},
    config::Config,
    context::{ChainContext, CounterSigner},
    controller::CounterController,
    error::Result,
    instance::InstanceManager,
    relayer::RelayerInstanceFactory,
    storage::{InMemoryStorage, JsonFileStorage, SignatureStorage},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Fully wired engine for one configured network.
pub struct CounterApp {
    pub context: Arc<ChainContext>,
    pub controller: Arc<CounterController>,
}

impl CounterApp {
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(config.registry()?);
        info!(
            "Loaded {} FHECounter deployment(s); connecting to {} ({})",
            registry.len(),
            config.network.name,
            config.network.rpc_url
        );

        let storage: Arc<dyn SignatureStorage> = match &config.authorization.store_path {
            Some(path) => Arc::new(JsonFileStorage::open(path).await?),
            None => Arc::new(InMemoryStorage::new()),
        };

        let factory = RelayerInstanceFactory::new(
            config.relayer.url.clone(),
            Duration::from_secs(config.relayer.timeout_seconds),
        )?;
        let instances = Arc::new(InstanceManager::new(
            Arc::new(factory),
            config.instance_manager_config(),
        ));
        let authorizations = Arc::new(AuthorizationCache::new(storage));
        let context = Arc::new(ChainContext::new(config.mock_chains.clone()));

        let controller = Arc::new(CounterController::new(
            context.clone(),
            instances,
            authorizations,
            registry,
            config.controller_settings(),
        ));

        let reader = Arc::new(AlloyCounterReader::connect(config.network.rpc_url.clone()));
        let signer = match &config.signer {
            Some(signer) => Some(Arc::new(LocalWalletSigner::from_private_key(
                &signer.private_key,
                config.network.rpc_url.clone(),
            )?) as Arc<dyn CounterSigner>),
            None => None,
        };
        context.connect(config.network.chain_id, reader, signer);

        Ok(Self {
            context,
            controller,
        })
    }

    /// Resolve, build the instance and fetch the handle once.
    pub async fn sync(&self) {
        self.controller.on_context_changed().await;
    }
}
