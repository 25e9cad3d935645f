//! Node
//!
//! The request surface of one party. Every request runs one protocol (two
//! for deposits) as initiator; every inbound initiating message runs the
//! role it starts on a spawned task. A run holds the locks of all channels
//! it touches from load until its outcome is stored, and stores nothing if
//! it fails.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use offchain_core::commitment::{CommitmentKey, SignedCommitment};
use offchain_core::errors::ValidationError;
use offchain_core::ledger::funding_transaction;
use offchain_core::model::{
    multisig_address_for, virtual_channel_key, AppInterface, FREE_BALANCE_SEQ_NO,
};
use offchain_core::protocol::{
    AppParams, ChannelRef, InstallVirtualAppParams, ProposeParams, SetupParams, TakeActionParams,
    UninstallVirtualAppParams, UpdateParams, WithdrawParams,
};
use offchain_core::{
    Address, AppInstance, AppInstanceProposal, AppRegistry, BalanceRefundApp, Bytes, Bytes32,
    Context, EngineConfig, FreeBalanceState, Ledger, Messenger, OffchainError, OutcomeType,
    ProposalTerms, ProtocolEnvironment, ProtocolMessage, ProtocolOutcome, ProtocolParams, Result,
    Role, SigningKeyPair, StateChannel, Store, Transaction, U256,
};

use crate::executor::{DeferredSend, ExecutedRun, InstructionExecutor};
use crate::managers::{ChannelLockManager, ReplyRouter, SeenMessages};
use crate::transport::Inbox;

// ----------------------------------------------------------------------------
// Node
// ----------------------------------------------------------------------------

/// Step timeouts an initiating message is remembered for
const SEEN_HORIZON_STEPS: u32 = 10;

/// One party of the off-chain protocol. Cheap to clone.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    key: SigningKeyPair,
    address: Address,
    config: EngineConfig,
    apps: AppRegistry,
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    ledger: Option<Arc<dyn Ledger>>,
    locks: ChannelLockManager,
    replies: ReplyRouter,
    seen: SeenMessages,
    /// Completed runs whose outcome could not be stored yet, with the
    /// final message held back until it is
    unpersisted: DashMap<Uuid, ExecutedRun>,
}

impl Node {
    pub(crate) fn new(
        key: SigningKeyPair,
        config: EngineConfig,
        apps: AppRegistry,
        store: Arc<dyn Store>,
        messenger: Arc<dyn Messenger>,
        ledger: Option<Arc<dyn Ledger>>,
    ) -> Self {
        let address = key.address();
        let seen = SeenMessages::new(config.protocol.step_timeout() * SEEN_HORIZON_STEPS);
        Self {
            inner: Arc::new(NodeInner {
                key,
                address,
                config,
                apps,
                store,
                messenger,
                ledger,
                locks: ChannelLockManager::new(),
                replies: ReplyRouter::new(),
                seen,
                unpersisted: DashMap::new(),
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Multisig address of the channel with `counterparty` for `nonce`
    pub fn multisig_address_with(&self, counterparty: Address, nonce: u64) -> Address {
        let network = &self.inner.config.network;
        multisig_address_for(
            &[self.address(), counterparty],
            nonce,
            &network.proxy_factory,
            &network.multisig_proxy_code_hash,
        )
    }

    /// Feed every message from `inbox` to [`Node::on_message`]
    pub fn listen(&self, mut inbox: Inbox) -> JoinHandle<()> {
        let node = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                if let Err(err) = node.on_message(message).await {
                    warn!(node = %node.address(), error = %err, "rejected inbound message");
                }
            }
        })
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Run Setup for a new channel with `counterparty` at `multisig`
    pub async fn create_channel(&self, counterparty: Address, multisig: Address) -> Result<StateChannel> {
        let outcome = self
            .initiate(ProtocolParams::Setup(SetupParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                multisig_address: multisig,
            }))
            .await?;
        outcome_channel(&outcome, &multisig).cloned()
    }

    /// Propose an app to the counterparty of `multisig`
    pub async fn propose_install(
        &self,
        multisig: Address,
        terms: ProposalTerms,
    ) -> Result<AppInstanceProposal> {
        let counterparty = self.counterparty_in(&multisig).await?;
        let outcome = self
            .initiate(ProtocolParams::Propose(ProposeParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                multisig_address: multisig,
                terms,
            }))
            .await?;
        let channel = outcome_channel(&outcome, &multisig)?;
        let app_seq_no = channel.next_app_seq_no().saturating_sub(1);
        let proposal = channel
            .proposals()
            .find(|p| p.app_seq_no == app_seq_no)
            .cloned()
            .ok_or_else(|| OffchainError::invalid_params("proposal missing from propose outcome"));
        proposal
    }

    /// Install a proposal, as either of its parties
    pub async fn install(&self, identity_hash: Bytes32) -> Result<AppInstance> {
        let params = self.proposal_params(&identity_hash).await?;
        let multisig = params.multisig_address;
        let outcome = self.initiate(ProtocolParams::Install(params)).await?;
        outcome_channel(&outcome, &multisig)?
            .app_instance(&identity_hash)
            .cloned()
    }

    /// Drop a proposal on both sides
    pub async fn reject_install(&self, identity_hash: Bytes32) -> Result<()> {
        let params = self.proposal_params(&identity_hash).await?;
        self.initiate(ProtocolParams::RejectInstall(params)).await?;
        Ok(())
    }

    /// Install an app with `responder` in the virtual channel through
    /// `intermediary`
    pub async fn install_virtual_app(
        &self,
        responder: Address,
        intermediary: Address,
        terms: ProposalTerms,
    ) -> Result<AppInstance> {
        let virtual_channel = virtual_channel_key(&[self.address(), responder], &intermediary);
        let app_seq_no = self
            .inner
            .store
            .get(&virtual_channel)
            .await?
            .map(|c| c.next_app_seq_no())
            .unwrap_or(FREE_BALANCE_SEQ_NO + 1);
        let outcome = self
            .initiate(ProtocolParams::InstallVirtualApp(InstallVirtualAppParams {
                initiator_identifier: self.address(),
                responder_identifier: responder,
                intermediary_identifier: intermediary,
                terms,
                app_seq_no,
            }))
            .await?;
        let app = outcome_channel(&outcome, &virtual_channel)?
            .app_instances()
            .find(|app| app.identity().channel_nonce == app_seq_no)
            .cloned()
            .ok_or_else(|| OffchainError::invalid_params("virtual app missing from install outcome"));
        app
    }

    pub async fn take_action(&self, identity_hash: Bytes32, action: Bytes) -> Result<AppInstance> {
        let (channel, counterparty) = self.app_channel(&identity_hash).await?;
        let multisig = channel.multisig_address();
        let outcome = self
            .initiate(ProtocolParams::TakeAction(TakeActionParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                multisig_address: multisig,
                app_identity_hash: identity_hash,
                action,
            }))
            .await?;
        outcome_channel(&outcome, &multisig)?
            .app_instance(&identity_hash)
            .cloned()
    }

    /// Replace an app's state outright, bumping its version
    pub async fn update_state(&self, identity_hash: Bytes32, new_state: Bytes) -> Result<AppInstance> {
        let (channel, counterparty) = self.app_channel(&identity_hash).await?;
        let multisig = channel.multisig_address();
        let outcome = self
            .initiate(ProtocolParams::Update(UpdateParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                multisig_address: multisig,
                app_identity_hash: identity_hash,
                new_state,
            }))
            .await?;
        outcome_channel(&outcome, &multisig)?
            .app_instance(&identity_hash)
            .cloned()
    }

    /// Uninstall a direct app and return the resulting free balance
    pub async fn uninstall(&self, identity_hash: Bytes32) -> Result<FreeBalanceState> {
        let (channel, counterparty) = self.app_channel(&identity_hash).await?;
        let multisig = channel.multisig_address();
        let outcome = self
            .initiate(ProtocolParams::Uninstall(AppParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                multisig_address: multisig,
                app_identity_hash: identity_hash,
            }))
            .await?;
        Ok(outcome_channel(&outcome, &multisig)?
            .free_balance()
            .state()
            .clone())
    }

    /// Uninstall a virtual app at its latest state and return the free
    /// balance of the channel with the intermediary
    pub async fn uninstall_virtual_app(&self, identity_hash: Bytes32) -> Result<FreeBalanceState> {
        let (channel, counterparty) = self.app_channel(&identity_hash).await?;
        let intermediary = channel.intermediary().ok_or_else(|| {
            OffchainError::invalid_params(format!("{identity_hash} is not a virtual app"))
        })?;
        let target_app_state = channel.app_instance(&identity_hash)?.latest_state().clone();
        let outcome = self
            .initiate(ProtocolParams::UninstallVirtualApp(UninstallVirtualAppParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                intermediary_identifier: intermediary,
                target_app_identity_hash: identity_hash,
                target_app_state,
            }))
            .await?;
        outcome
            .channels
            .iter()
            .find(|c| !c.is_virtual() && c.has_owner(&intermediary))
            .map(|c| c.free_balance().state().clone())
            .ok_or_else(|| OffchainError::invalid_params("intermediary channel missing from outcome"))
    }

    /// Fund the channel on the ledger and credit the deposit to this party.
    ///
    /// A zero-deposit refund app is installed first with the multisig's
    /// current ledger balance as its threshold, so the counterparty has
    /// signed the credit before any funds move. Uninstalling it credits
    /// what the multisig holds above the threshold, up to `amount`. If the
    /// ledger fails the refund app stays installed.
    pub async fn deposit(
        &self,
        multisig: Address,
        amount: U256,
        token: Address,
    ) -> Result<FreeBalanceState> {
        let ledger = self
            .inner
            .ledger
            .clone()
            .ok_or_else(|| OffchainError::config_error("deposits need a ledger"))?;
        if amount.is_zero() {
            return Err(OffchainError::invalid_params("deposit amount must be positive"));
        }

        let threshold = ledger
            .balance_of(multisig, token)
            .await
            .map_err(into_ledger_error)?;
        let config = &self.inner.config;
        let terms = ProposalTerms {
            app_interface: AppInterface {
                addr: config.network.balance_refund_app,
                state_encoding: BalanceRefundApp::STATE_ENCODING.into(),
                action_encoding: None,
            },
            initial_state: BalanceRefundApp::encode_state(self.address(), multisig, threshold),
            initiator_deposit: U256::zero(),
            responder_deposit: U256::zero(),
            token,
            default_timeout: config.channel.refund_app_timeout,
            outcome_type: OutcomeType::CoinTransfer,
            interpreter_limit: Some(amount),
        };
        let proposal = self.propose_install(multisig, terms).await?;
        self.install(proposal.identity_hash).await?;

        let transaction = funding_transaction(multisig, amount, token);
        let tx_hash = ledger
            .submit_transaction(&transaction)
            .await
            .map_err(into_ledger_error)?;
        info!(multisig = %multisig, amount = %amount, tx_hash = %tx_hash, "deposit funded");

        self.uninstall(proposal.identity_hash).await
    }

    /// Withdraw from this party's free balance to `recipient`, returning the
    /// signed multisig transaction. It is submitted when a ledger is set.
    pub async fn withdraw(
        &self,
        multisig: Address,
        recipient: Address,
        amount: U256,
        token: Address,
    ) -> Result<Transaction> {
        let counterparty = self.counterparty_in(&multisig).await?;
        let outcome = self
            .initiate(ProtocolParams::Withdraw(WithdrawParams {
                initiator_identifier: self.address(),
                responder_identifier: counterparty,
                multisig_address: multisig,
                recipient,
                amount,
                token_address: token,
            }))
            .await?;
        let transaction = outcome
            .commitment(&CommitmentKey::Withdraw)
            .map(|c| c.transaction.clone())
            .ok_or_else(|| OffchainError::invalid_params("withdraw commitment missing"))?;
        if let Some(ledger) = &self.inner.ledger {
            let tx_hash = ledger.submit_transaction(&transaction).await?;
            info!(multisig = %multisig, amount = %amount, tx_hash = %tx_hash, "withdrawal submitted");
        }
        Ok(transaction)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_channel(&self, multisig: &Address) -> Result<StateChannel> {
        self.inner
            .store
            .get(multisig)
            .await?
            .ok_or_else(|| OffchainError::channel_not_found(multisig))
    }

    pub async fn get_free_balance(&self, multisig: &Address) -> Result<FreeBalanceState> {
        Ok(self.get_channel(multisig).await?.free_balance().state().clone())
    }

    pub async fn get_app_instances(&self, multisig: &Address) -> Result<Vec<AppInstance>> {
        Ok(self.get_channel(multisig).await?.app_instances().cloned().collect())
    }

    pub async fn get_proposed_app_instances(
        &self,
        multisig: &Address,
    ) -> Result<Vec<AppInstanceProposal>> {
        Ok(self.get_channel(multisig).await?.proposals().cloned().collect())
    }

    pub async fn get_app_instance(&self, identity_hash: &Bytes32) -> Result<AppInstance> {
        let (channel, _) = self.app_channel(identity_hash).await?;
        channel.app_instance(identity_hash).cloned()
    }

    pub async fn get_commitment(
        &self,
        multisig: &Address,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>> {
        self.inner.store.get_commitment(multisig, key).await
    }

    // ------------------------------------------------------------------------
    // Inbound Messages
    // ------------------------------------------------------------------------

    /// Handle one message from the transport.
    ///
    /// Replies wake the run waiting on them. Initiating messages start the
    /// role their sequence number names on a new task; a repeat of one
    /// already seen is dropped.
    pub async fn on_message(&self, message: ProtocolMessage) -> Result<()> {
        if message.to_identifier != self.address() {
            return Err(OffchainError::malformed_message(format!(
                "message for {} delivered to {}",
                message.to_identifier,
                self.address()
            )));
        }
        if message.is_reply() {
            self.inner.replies.deliver(message);
            return Ok(());
        }
        if !self
            .inner
            .seen
            .first_sighting(message.process_id, message.seq, message.from_identifier)
        {
            debug!(
                protocol = %message.protocol,
                process_id = %message.process_id,
                seq = message.seq,
                "dropping duplicate message"
            );
            return Ok(());
        }

        let (params, role) = self.accept(&message)?;
        let node = self.clone();
        tokio::spawn(async move {
            let process_id = message.process_id;
            let protocol = message.protocol;
            if let Err(err) = node.execute(process_id, params, role, Some(message)).await {
                warn!(
                    protocol = %protocol,
                    process_id = %process_id,
                    role = %role,
                    error = %err,
                    "responder run failed"
                );
            }
        });
        Ok(())
    }

    /// Parameters and local role of an initiating message, checked against
    /// who sent it
    fn accept(&self, message: &ProtocolMessage) -> Result<(ProtocolParams, Role)> {
        let definition = message.protocol.definition();
        let flow = definition.flow_for_seq(message.seq).ok_or_else(|| {
            OffchainError::malformed_message(format!(
                "{} has no role started by seq {}",
                message.protocol, message.seq
            ))
        })?;
        let params = message.decode_params()?;
        if params.address_of(flow.role)? != self.address() {
            return Err(OffchainError::malformed_message(format!(
                "{} {} is not {}",
                message.protocol,
                flow.role,
                self.address()
            )));
        }
        let sender = definition.sender_of(flow.role).ok_or_else(|| {
            OffchainError::malformed_message(format!("{} {} has no sender", message.protocol, flow.role))
        })?;
        if params.address_of(sender)? != message.from_identifier {
            return Err(OffchainError::malformed_message(format!(
                "{} {} must come from the {sender}",
                message.protocol, flow.role
            )));
        }
        Ok((params, flow.role))
    }

    // ------------------------------------------------------------------------
    // Persistence Recovery
    // ------------------------------------------------------------------------

    /// Outcomes negotiated but not yet stored
    pub fn pending_persistence(&self) -> usize {
        self.inner.unpersisted.len()
    }

    /// Store every kept outcome whose channels are idle, then send the
    /// final message it held back. Returns how many were written.
    pub async fn retry_pending_persistence(&self) -> Result<usize> {
        let pending: Vec<ExecutedRun> = self
            .inner
            .unpersisted
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut written = 0;
        for run in pending {
            let outcome = &run.outcome;
            let Ok(guards) = self.inner.locks.try_lock_all(&outcome.multisig_addresses()) else {
                debug!(process_id = %outcome.process_id, "channels busy, leaving outcome pending");
                continue;
            };
            self.inner
                .store
                .set_with_commitments(outcome.channels.clone(), outcome.commitments.clone())
                .await?;
            self.inner.unpersisted.remove(&outcome.process_id);
            drop(guards);
            info!(
                protocol = %outcome.protocol,
                process_id = %outcome.process_id,
                "stored pending outcome"
            );
            if let Err(err) = self.send_deferred(run.deferred).await {
                warn!(
                    process_id = %outcome.process_id,
                    error = %err,
                    "held back message could not be sent"
                );
            }
            written += 1;
        }
        Ok(written)
    }

    // ------------------------------------------------------------------------
    // Protocol Runs
    // ------------------------------------------------------------------------

    async fn initiate(&self, params: ProtocolParams) -> Result<ProtocolOutcome> {
        self.execute(Uuid::new_v4(), params, Role::Initiator, None)
            .await
    }

    async fn execute(
        &self,
        process_id: Uuid,
        params: ProtocolParams,
        role: Role,
        inbound: Option<ProtocolMessage>,
    ) -> Result<ProtocolOutcome> {
        let protocol = params.protocol();
        let multisigs = self.resolve(&params.channel_refs(role)).await?;
        let guards = self.inner.locks.try_lock_all(&multisigs).inspect_err(|_| {
            warn!(
                protocol = %protocol,
                process_id = %process_id,
                role = %role,
                "channel busy, rejecting run"
            );
        })?;
        self.ensure_persisted(guards.multisigs())?;

        let mut channels = Vec::with_capacity(multisigs.len());
        for multisig in guards.multisigs() {
            if let Some(channel) = self.inner.store.get(multisig).await? {
                channels.push(channel);
            }
        }

        info!(protocol = %protocol, process_id = %process_id, role = %role, "protocol started");
        let mut ctx = Context::new(process_id, params, role, channels);
        self.observe_ledger(&mut ctx).await?;
        let env = self.environment();
        let executor = InstructionExecutor::new(
            &self.inner.key,
            self.inner.messenger.as_ref(),
            &self.inner.replies,
            self.inner.config.protocol.step_timeout(),
        );
        let run = match executor.run(ctx, &env, inbound.as_ref()).await {
            Ok(run) => run,
            Err(err) => {
                warn!(
                    protocol = %protocol,
                    process_id = %process_id,
                    role = %role,
                    error = %err,
                    "protocol aborted"
                );
                return Err(err);
            }
        };

        // the final message goes out only once this side has stored what it signed
        let persisted = self.persist(&run).await;
        drop(guards);
        persisted?;

        let ExecutedRun { outcome, deferred } = run;
        self.send_deferred(deferred).await?;
        info!(protocol = %protocol, process_id = %process_id, role = %role, "protocol completed");
        Ok(outcome)
    }

    async fn send_deferred(&self, deferred: Option<DeferredSend>) -> Result<()> {
        match deferred {
            Some(deferred) => self.inner.messenger.send(deferred.to, deferred.message).await,
            None => Ok(()),
        }
    }

    /// Read the ledger balance a refund app in this run is checked against.
    /// Without a ledger nothing is observed and the run refuses the app.
    async fn observe_ledger(&self, ctx: &mut Context) -> Result<()> {
        let refund_app = self.inner.config.network.balance_refund_app;
        let watched = match &ctx.params {
            ProtocolParams::Propose(p) if p.terms.app_interface.addr == refund_app => {
                Some((p.multisig_address, p.terms.token))
            }
            ProtocolParams::Install(p) => ctx
                .channel(&p.multisig_address)
                .ok()
                .and_then(|c| c.proposal(&p.app_identity_hash).ok())
                .filter(|proposal| proposal.terms.app_interface.addr == refund_app)
                .map(|proposal| (p.multisig_address, proposal.terms.token)),
            ProtocolParams::Uninstall(p) => ctx
                .channel(&p.multisig_address)
                .ok()
                .and_then(|c| c.app_instance(&p.app_identity_hash).ok())
                .filter(|app| app.app_definition() == refund_app)
                .map(|app| (p.multisig_address, app.interpreter_params().token())),
            _ => None,
        };
        let Some((multisig, token)) = watched else {
            return Ok(());
        };
        let Some(ledger) = &self.inner.ledger else {
            warn!(multisig = %multisig, "no ledger to check the refund app against");
            return Ok(());
        };
        let balance = ledger
            .balance_of(multisig, token)
            .await
            .map_err(into_ledger_error)?;
        debug!(multisig = %multisig, token = %token, balance = %balance, "observed ledger balance");
        ctx.observe_ledger_balance(multisig, token, balance);
        Ok(())
    }

    fn environment(&self) -> ProtocolEnvironment<'_> {
        ProtocolEnvironment {
            me: self.address(),
            network: &self.inner.config.network,
            channel: &self.inner.config.channel,
            apps: &self.inner.apps,
        }
    }

    async fn resolve(&self, refs: &[ChannelRef]) -> Result<Vec<Address>> {
        let mut multisigs = Vec::with_capacity(refs.len());
        for channel_ref in refs {
            let multisig = match channel_ref {
                ChannelRef::Multisig(multisig) => *multisig,
                ChannelRef::Between(a, b) => self
                    .inner
                    .store
                    .channel_between(a, b)
                    .await?
                    .map(|c| c.multisig_address())
                    .ok_or_else(|| {
                        OffchainError::from(ValidationError::NoChannelBetween {
                            first: a.to_string(),
                            second: b.to_string(),
                        })
                    })?,
            };
            multisigs.push(multisig);
        }
        Ok(multisigs)
    }

    fn ensure_persisted(&self, multisigs: &[Address]) -> Result<()> {
        let stale = self.inner.unpersisted.iter().find_map(|entry| {
            entry
                .value()
                .outcome
                .multisig_addresses()
                .into_iter()
                .find(|m| multisigs.contains(m))
        });
        match stale {
            Some(multisig) => Err(OffchainError::storage(format!(
                "channel {multisig} has an outcome awaiting persistence"
            ))),
            None => Ok(()),
        }
    }

    /// Store a run's outcome, retrying per the persistence policy. A run
    /// whose outcome cannot be stored is kept for
    /// [`Node::retry_pending_persistence`].
    async fn persist(&self, run: &ExecutedRun) -> Result<()> {
        let outcome = &run.outcome;
        let policy = &self.inner.config.persistence;
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .inner
                .store
                .set_with_commitments(outcome.channels.clone(), outcome.commitments.clone())
                .await;
            match result {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    warn!(
                        protocol = %outcome.protocol,
                        process_id = %outcome.process_id,
                        attempt,
                        error = %err,
                        "storing outcome failed, retrying"
                    );
                    tokio::time::sleep(policy.retry_backoff()).await;
                }
                Err(err) => {
                    error!(
                        protocol = %outcome.protocol,
                        process_id = %outcome.process_id,
                        attempts,
                        error = %err,
                        "storing outcome failed, keeping it for retry"
                    );
                    self.inner
                        .unpersisted
                        .insert(outcome.process_id, run.clone());
                    return Err(match err {
                        OffchainError::StorageFailure(_) => err,
                        other => OffchainError::storage(other.to_string()),
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    async fn counterparty_in(&self, multisig: &Address) -> Result<Address> {
        self.get_channel(multisig).await?.counterparty_of(&self.address())
    }

    async fn proposal_params(&self, identity_hash: &Bytes32) -> Result<AppParams> {
        let proposal = self
            .inner
            .store
            .get_proposal(identity_hash)
            .await?
            .ok_or_else(|| OffchainError::proposal_not_found(identity_hash))?;
        let counterparty = if proposal.proposed_by == self.address() {
            proposal.proposed_to
        } else {
            proposal.proposed_by
        };
        Ok(AppParams {
            initiator_identifier: self.address(),
            responder_identifier: counterparty,
            multisig_address: proposal.multisig_address,
            app_identity_hash: *identity_hash,
        })
    }

    /// Channel holding the app, and this party's counterparty in it
    async fn app_channel(&self, identity_hash: &Bytes32) -> Result<(StateChannel, Address)> {
        let channel = self
            .inner
            .store
            .channels()
            .await?
            .into_iter()
            .find(|c| c.has_app_instance(identity_hash))
            .ok_or_else(|| OffchainError::app_not_found(identity_hash))?;
        let counterparty = channel.counterparty_of(&self.address())?;
        Ok((channel, counterparty))
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.inner.address)
            .field("pending_persistence", &self.inner.unpersisted.len())
            .finish()
    }
}

fn outcome_channel<'a>(outcome: &'a ProtocolOutcome, multisig: &Address) -> Result<&'a StateChannel> {
    outcome
        .channel(multisig)
        .ok_or_else(|| OffchainError::channel_not_found(multisig))
}

fn into_ledger_error(err: OffchainError) -> OffchainError {
    match err {
        OffchainError::Ledger { .. } => err,
        other => OffchainError::ledger(other.to_string()),
    }
}
