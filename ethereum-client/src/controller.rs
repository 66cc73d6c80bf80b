//! Counter controller.
//!
//! Owns the observable counter state for the current session, a session
//! being the stable `(chain, contract, signer)` triple resolved from the
//! [`ChainContext`]. Every operation captures the identities it started
//! under and re-checks them after each suspension point; when anything
//! moved, the result is discarded instead of applied.

use crate::{
    authorization::AuthorizationCache,
    context::{ChainContext, ContextSnapshot, SignerHandle, SignerId},
    error::{ClientError, Result},
    instance::{FhevmInstance, InstanceManager},
    registry::ContractRegistry,
    types::{CounterView, GateReason, OperationOutcome, PendingOperation, TxOutcome},
};
use alloy_primitives::Address;
use fhe_counter_lib::{ClearValue, EncryptedHandle, OperationKind};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub type RefreshOutcome = OperationOutcome<EncryptedHandle>;
pub type DecryptOutcome = OperationOutcome<ClearValue>;
pub type MutationOutcome = OperationOutcome<TxOutcome>;

/// 365 days.
pub const DEFAULT_VALIDITY_SECONDS: u64 = 365 * 24 * 60 * 60;

const DECRYPT_STARTED: &str = "Start decrypt";
const DECRYPT_CALLING: &str = "Call FHEVM userDecrypt...";

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Lifetime of newly signed decryption authorizations.
    pub valid_duration_seconds: u64,
    pub fhevm_enabled: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            valid_duration_seconds: DEFAULT_VALIDITY_SECONDS,
            fhevm_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Session {
    chain_id: Option<u64>,
    contract_address: Option<Address>,
    signer_id: Option<SignerId>,
}

#[derive(Debug, Default)]
struct CounterState {
    session: Session,
    /// Bumped on every session change.
    epoch: u64,
    is_deployed: Option<bool>,
    handle: Option<EncryptedHandle>,
    /// Clear value tagged with the handle it was decrypted from.
    clear: Option<(EncryptedHandle, ClearValue)>,
    is_decrypting: bool,
    is_refreshing: bool,
    is_inc_or_dec: bool,
    refresh_seq: u64,
    message: String,
}

impl CounterState {
    fn clear_value(&self) -> Option<ClearValue> {
        match (self.clear, self.handle) {
            (Some((decrypted, value)), Some(held)) if decrypted == held => Some(value),
            _ => None,
        }
    }
}

/// Identities a decrypt started under.
struct DecryptTicket {
    epoch: u64,
    chain_id: Option<u64>,
    signer: SignerHandle,
    instance: Arc<dyn FhevmInstance>,
    generation: u64,
    contract: Address,
    handle: EncryptedHandle,
    /// Message shown before the decrypt started.
    prior_message: String,
}

pub struct CounterController {
    context: Arc<ChainContext>,
    instances: Arc<InstanceManager>,
    authorizations: Arc<AuthorizationCache>,
    registry: Arc<dyn ContractRegistry>,
    settings: ControllerSettings,
    state: Mutex<CounterState>,
    view_tx: watch::Sender<CounterView>,
}

impl CounterController {
    #[must_use]
    pub fn new(
        context: Arc<ChainContext>,
        instances: Arc<InstanceManager>,
        authorizations: Arc<AuthorizationCache>,
        registry: Arc<dyn ContractRegistry>,
        settings: ControllerSettings,
    ) -> Self {
        let (view_tx, _rx) = watch::channel(CounterView::default());
        Self {
            context,
            instances,
            authorizations,
            registry,
            settings,
            state: Mutex::new(CounterState::default()),
            view_tx,
        }
    }

    #[must_use]
    pub fn view(&self) -> CounterView {
        self.view_tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CounterView> {
        self.view_tx.subscribe()
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<ChainContext> {
        &self.context
    }

    #[must_use]
    pub const fn instances(&self) -> &Arc<InstanceManager> {
        &self.instances
    }

    /// Instance lent for `ctx`, with its build generation.
    fn ready_instance(&self, ctx: &ContextSnapshot) -> Option<(Arc<dyn FhevmInstance>, u64)> {
        let state = self.instances.state();
        if state.key.map(|key| key.provider_id) != ctx.provider_id() {
            return None;
        }
        state
            .ready_for(ctx.chain_id)
            .cloned()
            .map(|instance| (instance, state.generation))
    }

    fn publish(&self, state: &CounterState) {
        let ctx = self.context.snapshot();
        let instance_status = self.instances.state().status;
        let ready = self.ready_instance(&ctx).is_some() && state.session.chain_id == ctx.chain_id;
        let has_signer = ctx.signer.is_some();
        let clear = state.clear_value();

        let view = CounterView {
            chain_id: state.session.chain_id,
            contract_address: state.session.contract_address,
            is_deployed: state.is_deployed,
            instance_status,
            handle: state.handle,
            clear,
            is_decrypted: clear.is_some(),
            is_decrypting: state.is_decrypting,
            is_refreshing: state.is_refreshing,
            is_inc_or_dec: state.is_inc_or_dec,
            can_refresh: state.session.contract_address.is_some()
                && ctx.provider.is_some()
                && !state.is_refreshing,
            can_decrypt: state.handle.is_some()
                && ready
                && !state.is_decrypting
                && has_signer
                && state.is_deployed == Some(true),
            can_inc_or_dec: ready
                && state.session.contract_address.is_some()
                && has_signer
                && !state.is_inc_or_dec,
            message: state.message.clone(),
        };
        self.view_tx.send_replace(view);
    }

    /// Recompute the view without a state transition.
    pub fn republish(&self) {
        let state = self.state.lock();
        self.publish(&state);
    }

    fn set_message(state: &mut CounterState, message: impl Into<String>) {
        state.message = message.into();
    }

    /// Re-resolve the session from the current context.
    ///
    /// A new chain or contract drops the handle and any refresh in flight.
    /// A new signer keeps the handle but drops the clear value, which
    /// belonged to the previous account.
    pub fn resolve(&self) {
        let ctx = self.context.snapshot();
        let deployment = ctx.chain_id.and_then(|chain_id| self.registry.lookup(chain_id));
        let session = Session {
            chain_id: ctx.chain_id,
            contract_address: deployment.as_ref().map(|d| d.address),
            signer_id: ctx.signer_id(),
        };

        let mut state = self.state.lock();
        if state.session != session {
            let moved = state.session.chain_id != session.chain_id
                || state.session.contract_address != session.contract_address;
            debug!("Session {:?} -> {:?}", state.session, session);

            state.session = session;
            state.epoch += 1;
            state.clear = None;
            if moved {
                state.handle = None;
                state.refresh_seq += 1;
                state.is_refreshing = false;
                state.message.clear();
            }
            state.is_deployed = session.chain_id.map(|_| deployment.is_some());

            if let (Some(chain_id), None) = (session.chain_id, deployment.as_ref()) {
                info!("No FHECounter deployment for chain {}", chain_id);
                Self::set_message(
                    &mut state,
                    format!("FHECounter deployment not found for chainId={chain_id}."),
                );
            }
        }
        self.publish(&state);
    }

    /// Fetch the current handle. A newer refresh or a session change
    /// supersedes this one.
    #[instrument(skip(self), level = "debug")]
    pub async fn refresh(&self) -> RefreshOutcome {
        let ctx = self.context.snapshot();
        let (seq, contract, provider) = {
            let mut state = self.state.lock();
            if state.session.chain_id != ctx.chain_id {
                return OperationOutcome::Rejected(GateReason::ContextChanging);
            }
            let Some(contract) = state.session.contract_address else {
                return OperationOutcome::Rejected(GateReason::NotDeployed);
            };
            let Some(provider) = ctx.provider.clone() else {
                return OperationOutcome::Rejected(GateReason::NoProvider);
            };
            state.refresh_seq += 1;
            state.is_refreshing = true;
            self.publish(&state);
            (state.refresh_seq, contract, provider)
        };

        let result = provider.reader().get_count(contract).await;

        let mut state = self.state.lock();
        if state.refresh_seq != seq {
            debug!("Discarding superseded refresh #{}", seq);
            return OperationOutcome::Discarded;
        }
        // Still the latest refresh, so the flag is ours to clear.
        state.is_refreshing = false;
        if !self.context.same_chain(ctx.chain_id) {
            debug!("Discarding refresh #{} read on chain {:?}", seq, ctx.chain_id);
            self.publish(&state);
            return OperationOutcome::Discarded;
        }
        let outcome = match result {
            Ok(handle) => {
                if state.handle != Some(handle) {
                    debug!("Count handle changed to {}", handle);
                    state.clear = None;
                }
                state.handle = Some(handle);
                OperationOutcome::Applied(handle)
            }
            Err(e) => {
                warn!("getCount() failed: {}", e);
                Self::set_message(&mut state, format!("FHECounter.getCount() call failed! error={e}"));
                OperationOutcome::Failed(e)
            }
        };
        self.publish(&state);
        outcome
    }

    fn decrypt_still_current(&self, state: &CounterState, ticket: &DecryptTicket) -> bool {
        state.epoch == ticket.epoch
            && state.handle == Some(ticket.handle)
            && self.context.same_chain(ticket.chain_id)
            && self.context.same_signer(Some(ticket.signer.id()))
            && self.instances.is_current(ticket.generation)
    }

    /// Decrypt the held handle. The result is applied only if the session,
    /// instance and handle are unchanged when it arrives.
    #[instrument(skip(self), level = "debug")]
    pub async fn decrypt_count_handle(&self) -> DecryptOutcome {
        let ctx = self.context.snapshot();
        let ticket = {
            let mut state = self.state.lock();
            if state.session.chain_id != ctx.chain_id || state.session.signer_id != ctx.signer_id() {
                return OperationOutcome::Rejected(GateReason::ContextChanging);
            }
            let (Some(contract), Some(true)) = (state.session.contract_address, state.is_deployed) else {
                return OperationOutcome::Rejected(GateReason::NotDeployed);
            };
            let Some(handle) = state.handle else {
                return OperationOutcome::Rejected(GateReason::NoHandle);
            };
            let Some(signer) = ctx.signer.clone() else {
                return OperationOutcome::Rejected(GateReason::NoSigner);
            };
            let Some((instance, generation)) = self.ready_instance(&ctx) else {
                return OperationOutcome::Rejected(GateReason::InstanceNotReady);
            };
            if state.is_decrypting {
                return OperationOutcome::Rejected(GateReason::Busy);
            }
            if let Some(value) = state.clear_value() {
                debug!("Handle {} already decrypted", handle);
                return OperationOutcome::Applied(value);
            }

            let prior_message = std::mem::replace(&mut state.message, DECRYPT_STARTED.to_string());
            state.is_decrypting = true;
            self.publish(&state);
            DecryptTicket {
                epoch: state.epoch,
                chain_id: ctx.chain_id,
                signer,
                instance,
                generation,
                contract,
                handle,
                prior_message,
            }
        };

        let result = self.run_decrypt(&ticket).await;

        let mut state = self.state.lock();
        state.is_decrypting = false;
        let current = self.decrypt_still_current(&state, &ticket);
        let outcome = match result {
            Ok(Some(value)) if current => {
                info!("Decrypted handle {} to {}", ticket.handle, value);
                state.clear = Some((ticket.handle, value));
                Self::set_message(&mut state, format!("Count handle clear value is {value}"));
                OperationOutcome::Applied(value)
            }
            Err(e) if current => {
                warn!("Decrypt failed: {}", e);
                let message = match &e {
                    ClientError::AuthorizationDenied | ClientError::Authorization(_) => e.to_string(),
                    other => format!("FHEVM userDecrypt failed! error={other}"),
                };
                Self::set_message(&mut state, message);
                OperationOutcome::Failed(e)
            }
            _ => {
                debug!("Discarding decrypt result for stale handle {}", ticket.handle);
                let progress = state.message == DECRYPT_STARTED || state.message == DECRYPT_CALLING;
                if state.epoch == ticket.epoch && progress {
                    state.message = ticket.prior_message.clone();
                }
                OperationOutcome::Discarded
            }
        };
        self.publish(&state);
        outcome
    }

    /// `Ok(None)` when the world moved between signing and decrypting.
    async fn run_decrypt(&self, ticket: &DecryptTicket) -> Result<Option<ClearValue>> {
        if ticket.handle.is_zero() {
            return Ok(Some(ClearValue::ZERO));
        }

        let authorization = self
            .authorizations
            .get_or_sign(
                &ticket.instance,
                ticket.signer.signer(),
                ticket.contract,
                ticket.signer.address(),
                self.settings.valid_duration_seconds,
            )
            .await?;

        {
            let mut state = self.state.lock();
            if !self.decrypt_still_current(&state, ticket) {
                return Ok(None);
            }
            Self::set_message(&mut state, DECRYPT_CALLING);
            self.publish(&state);
        }

        let value = ticket
            .instance
            .decrypt(ticket.handle, ticket.contract, &authorization)
            .await?;
        Ok(Some(value))
    }

    fn pending_still_current(&self, pending: &PendingOperation) -> bool {
        self.context.same_chain(pending.captured_chain_id) && self.context.same_signer(pending.captured_signer)
    }

    /// Encrypt `|delta|` and submit `increment` or `decrement`. Concurrent
    /// calls are rejected while one is pending, never queued.
    #[instrument(skip(self), level = "debug")]
    pub async fn inc_or_dec(&self, delta: i64) -> MutationOutcome {
        let Some(kind) = OperationKind::for_delta(delta) else {
            return OperationOutcome::Rejected(GateReason::ZeroDelta);
        };
        let Ok(operand) = u32::try_from(delta.unsigned_abs()) else {
            return OperationOutcome::Rejected(GateReason::OperandOutOfRange);
        };

        let ctx = self.context.snapshot();
        let (contract, signer, instance, generation) = {
            let mut state = self.state.lock();
            if state.session.chain_id != ctx.chain_id || state.session.signer_id != ctx.signer_id() {
                return OperationOutcome::Rejected(GateReason::ContextChanging);
            }
            let Some(contract) = state.session.contract_address else {
                return OperationOutcome::Rejected(GateReason::NotDeployed);
            };
            let Some(signer) = ctx.signer.clone() else {
                return OperationOutcome::Rejected(GateReason::NoSigner);
            };
            let Some((instance, generation)) = self.ready_instance(&ctx) else {
                return OperationOutcome::Rejected(GateReason::InstanceNotReady);
            };
            if state.is_inc_or_dec {
                return OperationOutcome::Rejected(GateReason::Busy);
            }
            state.is_inc_or_dec = true;
            Self::set_message(&mut state, format!("Start {kind}({operand})..."));
            self.publish(&state);
            (contract, signer, instance, generation)
        };

        let pending = PendingOperation {
            kind,
            captured_chain_id: ctx.chain_id,
            captured_signer: Some(signer.id()),
        };
        let result = self
            .run_mutation(&pending, contract, &signer, &instance, generation, operand)
            .await;

        let confirmed = {
            let mut state = self.state.lock();
            state.is_inc_or_dec = false;
            if !self.pending_still_current(&pending) {
                debug!("Discarding {} result; chain or signer changed", kind);
                self.publish(&state);
                return OperationOutcome::Discarded;
            }
            let outcome = match result {
                Ok(Some(outcome)) if outcome.success => {
                    info!("{} confirmed in tx {}", kind, outcome.tx_hash);
                    Self::set_message(&mut state, format!("Call {kind} completed status=1"));
                    OperationOutcome::Applied(outcome)
                }
                Ok(Some(outcome)) => {
                    warn!("{} reverted in tx {}", kind, outcome.tx_hash);
                    Self::set_message(&mut state, format!("{kind} Failed! tx {} reverted", outcome.tx_hash));
                    OperationOutcome::Failed(ClientError::TransactionFailed(format!(
                        "transaction {} reverted",
                        outcome.tx_hash
                    )))
                }
                Ok(None) => OperationOutcome::Discarded,
                Err(e) => {
                    warn!("{} failed: {}", kind, e);
                    Self::set_message(&mut state, format!("{kind} Failed! error={e}"));
                    OperationOutcome::Failed(e)
                }
            };
            self.publish(&state);
            outcome
        };

        if confirmed.is_applied() {
            self.refresh().await;
        }
        confirmed
    }

    /// `Ok(None)` when the world moved before submission.
    async fn run_mutation(
        &self,
        pending: &PendingOperation,
        contract: Address,
        signer: &SignerHandle,
        instance: &Arc<dyn FhevmInstance>,
        generation: u64,
        operand: u32,
    ) -> Result<Option<TxOutcome>> {
        let input = instance.encrypt(contract, signer.address(), operand).await?;
        if !self.pending_still_current(pending) || !self.instances.is_current(generation) {
            return Ok(None);
        }

        let tx_hash = signer.signer().submit(contract, pending.kind, &input).await?;
        {
            let mut state = self.state.lock();
            if self.pending_still_current(pending) {
                Self::set_message(&mut state, format!("Wait for tx:{tx_hash}..."));
                self.publish(&state);
            }
        }

        let outcome = signer.signer().wait_for_confirmation(tx_hash).await?;
        Ok(Some(outcome))
    }

    /// Resolve the session, rebuild the instance if its key moved, and
    /// refresh the handle.
    pub async fn on_context_changed(&self) {
        self.resolve();
        let ctx = self.context.snapshot();
        let build = self.instances.get_or_create(
            ctx.provider_id(),
            ctx.chain_id,
            self.context.mock_chains(),
            self.settings.fhevm_enabled,
        );
        let (_instance, refreshed) = tokio::join!(build, self.refresh());
        if let OperationOutcome::Rejected(reason) = refreshed {
            debug!("Refresh skipped: {}", reason);
        }
        self.republish();
    }

    /// React to context and instance changes until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut context_rx = self.context.subscribe();
        let mut instance_rx = self.instances.subscribe();
        self.on_context_changed().await;

        loop {
            tokio::select! {
                changed = context_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    context_rx.borrow_and_update();
                    let controller = self.clone();
                    tokio::spawn(async move { controller.on_context_changed().await });
                }
                changed = instance_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    instance_rx.borrow_and_update();
                    self.republish();
                }
            }
        }
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }
}
