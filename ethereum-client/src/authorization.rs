//! Decryption authorization cache.
//!
//! An authorization lets the instance decrypt handles of one contract on
//! behalf of one owner for a bounded time. Producing one costs a wallet
//! prompt, so authorizations are kept in a [`SignatureStorage`] and reused
//! until they expire. Concurrent requests for the same key share a single
//! signing future.

use crate::{
    context::CounterSigner,
    error::{ClientError, SignerError},
    instance::FhevmInstance,
    storage::SignatureStorage,
};
use alloy_primitives::{Address, Bytes};
use fhe_counter_lib::{AuthorizationKey, DecryptionAuthorization, UserDecryptRequest};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("user rejected the decryption signature request")]
    Denied,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("owner {owner} does not match connected signer {signer}")]
    OwnerMismatch { owner: Address, signer: Address },
}

impl From<AuthorizationError> for ClientError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::Denied => Self::AuthorizationDenied,
            other => Self::Authorization(other.to_string()),
        }
    }
}

type SignResult = Result<DecryptionAuthorization, AuthorizationError>;
type InFlight = Shared<BoxFuture<'static, SignResult>>;

pub struct AuthorizationCache {
    storage: Arc<dyn SignatureStorage>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashMap<AuthorizationKey, InFlight>>,
}

impl AuthorizationCache {
    #[must_use]
    pub fn new(storage: Arc<dyn SignatureStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(storage: Arc<dyn SignatureStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn SignatureStorage> {
        &self.storage
    }

    /// Return a valid authorization for `(owner, contract)`, prompting the
    /// signer only when none is stored.
    #[instrument(skip(self, instance, signer), level = "debug")]
    pub async fn get_or_sign(
        &self,
        instance: &Arc<dyn FhevmInstance>,
        signer: &Arc<dyn CounterSigner>,
        contract: Address,
        owner: Address,
        valid_duration_seconds: u64,
    ) -> SignResult {
        let signer_address = signer.address();
        if owner != signer_address {
            return Err(AuthorizationError::OwnerMismatch {
                owner,
                signer: signer_address,
            });
        }
        let key = AuthorizationKey::new(owner, contract);

        let shared = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(&key) {
                debug!("Joining in-flight authorization request for {}", key);
                existing.clone()
            } else {
                let future = sign_or_reuse(
                    key,
                    self.storage.clone(),
                    self.clock.clone(),
                    instance.clone(),
                    signer.clone(),
                    valid_duration_seconds,
                )
                .boxed()
                .shared();
                in_flight.insert(key, future.clone());
                future
            }
        };

        let result = shared.clone().await;

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&key).is_some_and(|current| current.ptr_eq(&shared)) {
            in_flight.remove(&key);
        }
        result
    }
}

async fn sign_or_reuse(
    key: AuthorizationKey,
    storage: Arc<dyn SignatureStorage>,
    clock: Arc<dyn Clock>,
    instance: Arc<dyn FhevmInstance>,
    signer: Arc<dyn CounterSigner>,
    valid_duration_seconds: u64,
) -> SignResult {
    let now = clock.now();
    match storage.get(&key).await {
        Ok(Some(stored)) if stored.is_usable_for(&key, now) => {
            debug!("Reusing decryption authorization for {}", key);
            return Ok(stored);
        }
        Ok(Some(_)) => debug!("Stored authorization for {} expired", key),
        Ok(None) => {}
        Err(e) => warn!("Signature storage read failed for {}: {}", key, e),
    }

    let keypair = instance.generate_keypair();
    let request = UserDecryptRequest::new(
        keypair.public_key.clone(),
        key.owner,
        key.contract,
        now,
        valid_duration_seconds,
    );
    let hash = request.signing_hash(&instance.eip712_domain());

    let signature = signer.sign_hash(hash).await.map_err(|e| match e {
        SignerError::Rejected => AuthorizationError::Denied,
        SignerError::Failed(message) => AuthorizationError::Signing(message),
    })?;

    let authorization = DecryptionAuthorization {
        owner_address: key.owner,
        contract_address: key.contract,
        public_key: keypair.public_key,
        private_key: keypair.private_key,
        signature: Bytes::copy_from_slice(&signature.as_bytes()),
        issued_at: now,
        valid_duration_seconds,
    };

    if let Err(e) = storage.set(&key, authorization.clone()).await {
        warn!("Failed to persist decryption authorization for {}: {}", key, e);
    }
    info!("Signed decryption authorization for {}", key);
    Ok(authorization)
}
