use crate::{
    authorization::{AuthorizationCache, Clock},
    context::{ChainContext, CounterReader, CounterSigner, ProviderId},
    controller::{ControllerSettings, CounterController},
    error::{ClientError, Result, SignerError},
    instance::{FhevmInstance, InstanceFactory, InstanceManager, InstanceManagerConfig, InstanceTarget},
    registry::StaticRegistry,
    storage::InMemoryStorage,
    types::TxOutcome,
};
use alloy_primitives::{Address, Bytes, Signature, TxHash, B256, U256};
use alloy_sol_types::Eip712Domain;
use async_trait::async_trait;
use fhe_counter_lib::{
    chains::{HARDHAT_CHAIN_ID, SEPOLIA_CHAIN_ID},
    ClearValue, DecryptionAuthorization, EncryptedHandle, EncryptedInput, KeyPair, OperationKind,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

pub const COUNTER: Address = Address::repeat_byte(0xcc);
pub const SEPOLIA_COUNTER: Address = Address::repeat_byte(0xdd);
pub const VALIDITY: u64 = 3600;

pub fn handle(n: u8) -> EncryptedHandle {
    EncryptedHandle::new(B256::with_last_byte(n))
}

pub fn mock_chains() -> HashMap<u64, Url> {
    HashMap::from([(HARDHAT_CHAIN_ID, Url::parse("http://localhost:8545").unwrap())])
}

/// A provider identity not tied to any test context.
pub fn provider_id() -> ProviderId {
    let context = ChainContext::new(HashMap::new());
    context.connect(HARDHAT_CHAIN_ID, Arc::new(FakeReader::default()), None);
    context.snapshot().provider_id().unwrap()
}

/// One-shot suspension point. Once armed, the next call that reaches it
/// blocks until released.
#[derive(Clone, Default)]
pub struct Gate {
    armed: Arc<AtomicBool>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub async fn hit(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[derive(Default)]
pub struct FakeReader {
    handle: Mutex<Option<EncryptedHandle>>,
    fail: AtomicBool,
    calls: AtomicUsize,
    pub gate: Gate,
}

impl FakeReader {
    pub fn set_handle(&self, value: EncryptedHandle) {
        *self.handle.lock() = Some(value);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterReader for FakeReader {
    async fn get_count(&self, _contract: Address) -> Result<EncryptedHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.hit().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Contract("execution reverted".to_string()));
        }
        Ok(self.handle.lock().unwrap_or(EncryptedHandle::ZERO))
    }
}

pub struct FakeSigner {
    address: Address,
    signs: AtomicUsize,
    reject: AtomicBool,
    revert: AtomicBool,
    submissions: Mutex<Vec<OperationKind>>,
    pub sign_gate: Gate,
    pub confirm_gate: Gate,
}

impl FakeSigner {
    pub fn new(address_byte: u8) -> Self {
        Self {
            address: Address::repeat_byte(address_byte),
            signs: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
            revert: AtomicBool::new(false),
            submissions: Mutex::new(Vec::new()),
            sign_gate: Gate::default(),
            confirm_gate: Gate::default(),
        }
    }

    /// Signing attempts, rejected ones included.
    pub fn signs(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn set_revert(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<OperationKind> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl CounterSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, _hash: B256) -> std::result::Result<Signature, SignerError> {
        let n = self.signs.fetch_add(1, Ordering::SeqCst) + 1;
        self.sign_gate.hit().await;
        if self.reject.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected);
        }
        Ok(Signature::new(U256::from(n), U256::from(7u64), false))
    }

    async fn submit(
        &self,
        _contract: Address,
        kind: OperationKind,
        _input: &EncryptedInput,
    ) -> Result<TxHash> {
        let mut submissions = self.submissions.lock();
        submissions.push(kind);
        Ok(TxHash::with_last_byte(u8::try_from(submissions.len()).unwrap()))
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxOutcome> {
        self.confirm_gate.hit().await;
        Ok(TxOutcome {
            tx_hash,
            block_number: Some(1),
            gas_used: 21_000,
            success: !self.revert.load(Ordering::SeqCst),
        })
    }
}

/// Decrypts a handle to its last byte.
pub struct FakeInstance {
    chain_id: u64,
    keys: AtomicUsize,
    decrypts: AtomicUsize,
    encrypted: Mutex<Vec<u32>>,
    pub decrypt_gate: Gate,
}

impl FakeInstance {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            keys: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
            encrypted: Mutex::new(Vec::new()),
            decrypt_gate: Gate::default(),
        }
    }

    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn encrypted(&self) -> Vec<u32> {
        self.encrypted.lock().clone()
    }
}

#[async_trait]
impl FhevmInstance for FakeInstance {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn generate_keypair(&self) -> KeyPair {
        let n = u8::try_from(self.keys.fetch_add(1, Ordering::SeqCst) % 256).unwrap();
        KeyPair {
            public_key: Bytes::from(vec![0x04, n]),
            private_key: Bytes::from(vec![0x01, n]),
        }
    }

    fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some("Decryption".into()),
            Some("1".into()),
            Some(U256::from(self.chain_id)),
            Some(Address::repeat_byte(0xee)),
            None,
        )
    }

    async fn encrypt(&self, _contract: Address, _user: Address, value: u32) -> Result<EncryptedInput> {
        self.encrypted.lock().push(value);
        Ok(EncryptedInput {
            handles: vec![B256::with_last_byte(0xab)],
            input_proof: Bytes::from(vec![0xde, 0xad]),
        })
    }

    async fn decrypt(
        &self,
        handle: EncryptedHandle,
        _contract: Address,
        _authorization: &DecryptionAuthorization,
    ) -> Result<ClearValue> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.decrypt_gate.hit().await;
        Ok(ClearValue::new(i64::from(handle.as_b256()[31])))
    }
}

#[derive(Default)]
pub struct FakeFactory {
    targets: Mutex<Vec<InstanceTarget>>,
    /// Remaining failures per chain; `usize::MAX` fails forever.
    failures: Mutex<HashMap<u64, usize>>,
    gates: Mutex<HashMap<u64, Gate>>,
    instances: Mutex<Vec<Arc<FakeInstance>>>,
}

impl FakeFactory {
    pub fn gate_chain(&self, chain_id: u64) -> Gate {
        let gate = Gate::default();
        gate.arm();
        self.gates.lock().insert(chain_id, gate.clone());
        gate
    }

    pub fn fail_chain(&self, chain_id: u64) {
        self.failures.lock().insert(chain_id, usize::MAX);
    }

    pub fn fail_times(&self, chain_id: u64, times: usize) {
        self.failures.lock().insert(chain_id, times);
    }

    pub fn heal_chain(&self, chain_id: u64) {
        self.failures.lock().remove(&chain_id);
    }

    pub fn targets(&self) -> Vec<InstanceTarget> {
        self.targets.lock().clone()
    }

    pub fn builds(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn last_instance(&self) -> Arc<FakeInstance> {
        self.instances.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl InstanceFactory for FakeFactory {
    async fn create(&self, target: &InstanceTarget) -> Result<Arc<dyn FhevmInstance>> {
        self.targets.lock().push(target.clone());
        let gate = self.gates.lock().get(&target.chain_id()).cloned();
        if let Some(gate) = gate {
            gate.hit().await;
        }

        let should_fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&target.chain_id()) {
                Some(0) | None => false,
                Some(remaining) if *remaining == usize::MAX => true,
                Some(remaining) => {
                    *remaining -= 1;
                    true
                }
            }
        };
        if should_fail {
            return Err(ClientError::InstanceBuild(format!(
                "chain {} is not supported",
                target.chain_id()
            )));
        }

        let instance = Arc::new(FakeInstance::new(target.chain_id()));
        self.instances.lock().push(instance.clone());
        Ok(instance)
    }
}

#[derive(Debug)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Controller wired to fakes, with a Hardhat and a Sepolia deployment.
pub struct Harness {
    pub context: Arc<ChainContext>,
    pub factory: Arc<FakeFactory>,
    pub instances: Arc<InstanceManager>,
    pub storage: Arc<InMemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub authorizations: Arc<AuthorizationCache>,
    pub controller: Arc<CounterController>,
    pub reader: Arc<FakeReader>,
    pub signer: Arc<FakeSigner>,
}

impl Harness {
    pub fn new() -> Self {
        let context = Arc::new(ChainContext::new(mock_chains()));
        let factory = Arc::new(FakeFactory::default());
        let instances = Arc::new(InstanceManager::new(
            factory.clone(),
            InstanceManagerConfig::default(),
        ));
        let storage = Arc::new(InMemoryStorage::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let authorizations = Arc::new(AuthorizationCache::with_clock(storage.clone(), clock.clone()));
        let registry = StaticRegistry::default()
            .with_deployment(HARDHAT_CHAIN_ID, COUNTER)
            .with_deployment(SEPOLIA_CHAIN_ID, SEPOLIA_COUNTER);
        let controller = Arc::new(CounterController::new(
            context.clone(),
            instances.clone(),
            authorizations.clone(),
            Arc::new(registry),
            ControllerSettings {
                valid_duration_seconds: VALIDITY,
                fhevm_enabled: true,
            },
        ));

        let reader = Arc::new(FakeReader::default());
        reader.set_handle(handle(5));

        Self {
            context,
            factory,
            instances,
            storage,
            clock,
            authorizations,
            controller,
            reader,
            signer: Arc::new(FakeSigner::new(0xaa)),
        }
    }

    /// Connect on `chain_id` with the default signer and run one sync.
    pub async fn connected_on(chain_id: u64) -> Self {
        let harness = Self::new();
        harness
            .context
            .connect(chain_id, harness.reader.clone(), Some(harness.signer.clone()));
        harness.controller.on_context_changed().await;
        harness
    }

    pub async fn connected() -> Self {
        Self::connected_on(HARDHAT_CHAIN_ID).await
    }
}
