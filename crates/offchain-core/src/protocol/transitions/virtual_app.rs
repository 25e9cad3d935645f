//! InstallVirtualApp and UninstallVirtualApp
//!
//! A virtual app lives in the virtual channel its two parties share through
//! an intermediary. Its funds stay in the two real channels, locked by an
//! agreement in each: the initiator-intermediary channel and the
//! intermediary-responder channel. The parties hold the virtual channel and
//! their own agreement channel; the intermediary holds both agreement
//! channels and never sees the virtual channel.

use tracing::debug;

use crate::commitment::{
    Commitment, CommitmentKey, VirtualAppAgreementCommitment, VirtualAppSetStateCommitment,
};
use crate::crypto::keccak256;
use crate::errors::{OffchainError, Result, ValidationError};
use crate::model::{
    virtual_channel_key, AppInstance, AppInstanceProposal, CoinTransfer, StateChannel,
    VirtualAppAgreement,
};
use crate::protocol::context::{Context, PendingCommitment, ProtocolEnvironment};
use crate::protocol::params::{InstallVirtualAppParams, UninstallVirtualAppParams};
use crate::protocol::{Role, SigRef};
use crate::types::{Address, Bytes32};

use super::{check_terms, free_balance_commitment, resolve_payouts};

const AGREEMENT_WITH_INITIATOR: usize = 0;
const VIRTUAL_APP_STATE: usize = 1;
const AGREEMENT_WITH_RESPONDER: usize = 2;

const FREE_BALANCE_WITH_INITIATOR: usize = 0;
const FREE_BALANCE_WITH_RESPONDER: usize = 1;

struct Parties {
    initiator: Address,
    responder: Address,
    intermediary: Address,
}

impl Parties {
    fn new(initiator: Address, responder: Address, intermediary: Address) -> Result<Self> {
        if initiator == responder || initiator == intermediary || responder == intermediary {
            return Err(ValidationError::InvalidOwners {
                reason: "a virtual app needs three distinct parties".into(),
            }
            .into());
        }
        Ok(Self {
            initiator,
            responder,
            intermediary,
        })
    }

    fn virtual_channel(&self) -> Address {
        virtual_channel_key(&[self.initiator, self.responder], &self.intermediary)
    }
}

// ----------------------------------------------------------------------------
// Install
// ----------------------------------------------------------------------------

/// The app every role derives from the same parameters
fn virtual_app(parties: &Parties, params: &InstallVirtualAppParams) -> AppInstance {
    let owners = [parties.initiator, parties.responder];
    let mut proposal = AppInstanceProposal::new(
        parties.virtual_channel(),
        &owners,
        params.app_seq_no,
        parties.initiator,
        parties.responder,
        params.terms.clone(),
    );
    proposal.intermediary = Some(parties.intermediary);
    proposal
        .to_app_instance(&owners)
        .into_virtual(parties.intermediary)
}

/// Agreement in the channel between `user` and the intermediary
fn agreement(
    app: &AppInstance,
    parties: &Parties,
    params: &InstallVirtualAppParams,
    user: Address,
    env: &ProtocolEnvironment<'_>,
) -> VirtualAppAgreement {
    let (user_deposit, capital_provided) = if user == parties.initiator {
        (params.terms.initiator_deposit, params.terms.responder_deposit)
    } else {
        (params.terms.responder_deposit, params.terms.initiator_deposit)
    };
    VirtualAppAgreement {
        target_identity_hash: app.identity_hash(),
        target_app_definition: app.app_definition(),
        target_interpreter_params: app.interpreter_params().clone(),
        capital_provided,
        capital_provider: parties.intermediary,
        virtual_app_user: user,
        user_deposit,
        token: params.terms.token,
        expiry: env.channel.virtual_app_nonce_expiry,
    }
}

fn install_agreement(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    user: Address,
    intermediary: Address,
    agreement: VirtualAppAgreement,
) -> Result<PendingCommitment> {
    let multisig = ctx.channel_between(&user, &intermediary)?;
    let channel = ctx.channel_mut(&multisig)?;
    let target = agreement.target_identity_hash;
    channel.install_agreement(agreement.clone())?;
    debug!(multisig = %multisig, target = %target, "installed virtual app agreement");
    Ok(PendingCommitment::new(
        CommitmentKey::Agreement(target),
        Commitment::VirtualAppAgreement(VirtualAppAgreementCommitment::for_agreement(
            channel,
            &agreement,
            env.network,
        )),
    ))
}

fn host_in_virtual_channel(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    parties: &Parties,
    app: AppInstance,
) -> Result<()> {
    let key = parties.virtual_channel();
    if !ctx.has_channel(&key) {
        ctx.insert_channel(StateChannel::new_virtual(
            [parties.initiator, parties.responder],
            parties.intermediary,
            env.network.free_balance_app,
            env.channel.free_balance_timeout,
        )?);
    }
    ctx.channel_mut(&key)?.install_virtual_app(app)
}

pub(super) fn prepare_install(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &InstallVirtualAppParams,
) -> Result<()> {
    let parties = Parties::new(
        params.initiator_identifier,
        params.responder_identifier,
        params.intermediary_identifier,
    )?;
    if params.terms.app_interface.addr == env.network.balance_refund_app {
        return Err(OffchainError::invalid_params(
            "deposits are made into direct channels only",
        ));
    }
    check_terms(env, &params.terms)?;

    let app = virtual_app(&parties, params);
    let set_state = PendingCommitment::new(
        CommitmentKey::AppState(app.identity_hash()),
        Commitment::VirtualAppSetState(VirtualAppSetStateCommitment::for_app(
            &app,
            parties.intermediary,
            env.channel.virtual_app_nonce_expiry,
            env.network,
        )),
    );
    let with_initiator = agreement(&app, &parties, params, parties.initiator, env);
    let with_responder = agreement(&app, &parties, params, parties.responder, env);

    match ctx.role {
        Role::Initiator => {
            let pending =
                install_agreement(ctx, env, parties.initiator, parties.intermediary, with_initiator)?;
            ctx.set_commitment(AGREEMENT_WITH_INITIATOR, pending);
            host_in_virtual_channel(ctx, env, &parties, app)?;
        }
        Role::Intermediary => {
            let pending =
                install_agreement(ctx, env, parties.initiator, parties.intermediary, with_initiator)?;
            ctx.set_commitment(AGREEMENT_WITH_INITIATOR, pending);
            let pending =
                install_agreement(ctx, env, parties.responder, parties.intermediary, with_responder)?;
            ctx.set_commitment(AGREEMENT_WITH_RESPONDER, pending);
        }
        Role::Responder => {
            let pending =
                install_agreement(ctx, env, parties.responder, parties.intermediary, with_responder)?;
            ctx.set_commitment(AGREEMENT_WITH_RESPONDER, pending);
            host_in_virtual_channel(ctx, env, &parties, app)?;
        }
    }
    ctx.set_commitment(VIRTUAL_APP_STATE, set_state);
    Ok(())
}

/// Keep the intermediary's signature with the app for later updates
pub(super) fn complete_install(
    ctx: &mut Context,
    _env: &ProtocolEnvironment<'_>,
    params: &InstallVirtualAppParams,
) -> Result<()> {
    if ctx.role == Role::Intermediary {
        return Ok(());
    }
    let parties = Parties::new(
        params.initiator_identifier,
        params.responder_identifier,
        params.intermediary_identifier,
    )?;
    let identity_hash = virtual_app(&parties, params).identity_hash();
    let signature = ctx.signature(SigRef {
        slot: VIRTUAL_APP_STATE,
        signer: Role::Intermediary,
    })?;
    ctx.channel_mut(&parties.virtual_channel())?
        .app_instance_mut(&identity_hash)?
        .set_intermediary_signature(signature);
    Ok(())
}

// ----------------------------------------------------------------------------
// Uninstall
// ----------------------------------------------------------------------------

/// Remove the app from the virtual channel, checking that `state` is the
/// app's latest state, and return its payouts
fn remove_from_virtual_channel(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    parties: &Parties,
    identity_hash: &Bytes32,
    state: &[u8],
) -> Result<Vec<CoinTransfer>> {
    let channel = ctx.channel_mut(&parties.virtual_channel())?;
    let app = channel.app_instance(identity_hash)?;
    if keccak256(state) != app.state_hash() {
        return Err(OffchainError::malformed_state(
            "target state is not the virtual app's latest state",
        ));
    }
    let payouts = resolve_payouts(
        env.apps,
        &app.app_definition(),
        app.interpreter_params(),
        state,
    )?;
    channel.remove_virtual_app(identity_hash)?;
    Ok(payouts)
}

fn release_agreement(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    user: Address,
    intermediary: Address,
    identity_hash: &Bytes32,
    payouts: &[CoinTransfer],
) -> Result<PendingCommitment> {
    let multisig = ctx.channel_between(&user, &intermediary)?;
    let channel = ctx.channel_mut(&multisig)?;
    channel.uninstall_agreement(identity_hash, payouts)?;
    debug!(multisig = %multisig, target = %identity_hash, "released virtual app agreement");
    Ok(free_balance_commitment(channel, env.network))
}

pub(super) fn prepare_uninstall(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &UninstallVirtualAppParams,
) -> Result<()> {
    let parties = Parties::new(
        params.initiator_identifier,
        params.responder_identifier,
        params.intermediary_identifier,
    )?;
    let hash = params.target_app_identity_hash;
    let state = &params.target_app_state;

    match ctx.role {
        Role::Initiator => {
            let payouts = remove_from_virtual_channel(ctx, env, &parties, &hash, state)?;
            let pending =
                release_agreement(ctx, env, parties.initiator, parties.intermediary, &hash, &payouts)?;
            ctx.set_commitment(FREE_BALANCE_WITH_INITIATOR, pending);
        }
        Role::Intermediary => {
            let multisig = ctx.channel_between(&parties.initiator, &parties.intermediary)?;
            let agreement = ctx.channel(&multisig)?.agreement(&hash)?.clone();
            let payouts = resolve_payouts(
                env.apps,
                &agreement.target_app_definition,
                &agreement.target_interpreter_params,
                state,
            )?;
            let pending =
                release_agreement(ctx, env, parties.initiator, parties.intermediary, &hash, &payouts)?;
            ctx.set_commitment(FREE_BALANCE_WITH_INITIATOR, pending);
            let pending =
                release_agreement(ctx, env, parties.responder, parties.intermediary, &hash, &payouts)?;
            ctx.set_commitment(FREE_BALANCE_WITH_RESPONDER, pending);
        }
        Role::Responder => {
            let payouts = remove_from_virtual_channel(ctx, env, &parties, &hash, state)?;
            let pending =
                release_agreement(ctx, env, parties.responder, parties.intermediary, &hash, &payouts)?;
            ctx.set_commitment(FREE_BALANCE_WITH_RESPONDER, pending);
        }
    }
    Ok(())
}
