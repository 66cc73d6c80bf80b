#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports
)]

pub mod app;
pub mod authorization;
pub mod client;
pub mod config;
pub mod context;
pub mod contracts;
pub mod controller;
pub mod error;
pub mod instance;
pub mod registry;
pub mod relayer;
pub mod storage;
pub mod types;

pub use app::CounterApp;
pub use authorization::{AuthorizationCache, AuthorizationError, Clock, SystemClock};
pub use client::{AlloyCounterReader, LocalWalletSigner};
pub use config::Config;
pub use context::{ChainContext, ContextSnapshot, CounterReader, CounterSigner, ProviderId, SignerId};
pub use controller::{
    ControllerSettings, CounterController, DecryptOutcome, MutationOutcome, RefreshOutcome,
};
pub use error::{ClientError, Result, SignerError};
pub use instance::{
    FhevmInstance, InstanceFactory, InstanceManager, InstanceManagerConfig, InstanceState,
    InstanceStatus, InstanceTarget,
};
pub use registry::{ContractRegistry, Deployment, StaticRegistry};
pub use relayer::{NetworkParameters, RelayerInstanceFactory};
pub use storage::{InMemoryStorage, JsonFileStorage, SignatureStorage};
pub use types::*;

#[cfg(test)]
mod test_utils;
