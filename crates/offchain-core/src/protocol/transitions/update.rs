//! Update and TakeAction
//!
//! Both move an installed app to its next version and re-sign its
//! set-state commitment. Update carries the new state; TakeAction carries an
//! action the app's logic turns into it.

use crate::commitment::{
    Commitment, CommitmentKey, SetStateCommitment, VirtualAppSetStateCommitment,
};
use crate::errors::{OffchainError, Result, ValidationError};
use crate::model::AppInstance;
use crate::protocol::context::{Context, PendingCommitment, ProtocolEnvironment};
use crate::protocol::params::{TakeActionParams, UpdateParams};
use crate::types::{Address, Bytes, Bytes32};

pub(super) fn prepare_update(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &UpdateParams,
) -> Result<()> {
    apply(
        ctx,
        env,
        &params.multisig_address,
        [params.initiator_identifier, params.responder_identifier],
        &params.app_identity_hash,
        params.new_state.clone(),
    )
}

pub(super) fn prepare_take_action(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &TakeActionParams,
) -> Result<()> {
    let parties = [params.initiator_identifier, params.responder_identifier];
    let channel = ctx.direct_channel_mut(&params.multisig_address, parties)?;
    let app = channel.app_instance(&params.app_identity_hash)?;
    let logic = env.apps.get(&app.app_definition())?;

    if let Some(index) = logic.turn_taker(app.latest_state())? {
        let expected = app.participants().get(index).copied().ok_or_else(|| {
            OffchainError::malformed_state(format!("turn taker index {index} out of range"))
        })?;
        if expected != params.initiator_identifier {
            return Err(ValidationError::NotTurnTaker {
                expected: expected.to_string(),
                actual: params.initiator_identifier.to_string(),
            }
            .into());
        }
    }
    let new_state = logic.apply_action(app.latest_state(), &params.action)?;

    apply(
        ctx,
        env,
        &params.multisig_address,
        parties,
        &params.app_identity_hash,
        new_state,
    )
}

fn apply(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    multisig: &Address,
    parties: [Address; 2],
    identity_hash: &Bytes32,
    new_state: Bytes,
) -> Result<()> {
    let channel = ctx.direct_channel_mut(multisig, parties)?;
    let app = channel.update_state(identity_hash, new_state)?;
    let pending = set_state_commitment(app, env)?;
    ctx.set_commitment(0, pending);
    Ok(())
}

fn set_state_commitment(app: &AppInstance, env: &ProtocolEnvironment<'_>) -> Result<PendingCommitment> {
    let key = CommitmentKey::AppState(app.identity_hash());
    let Some(intermediary) = app.intermediary() else {
        return Ok(PendingCommitment::new(
            key,
            Commitment::SetState(SetStateCommitment::for_app(app, env.network)),
        ));
    };

    // the intermediary's standing signature only covers versions below the expiry
    let expiry = env.channel.virtual_app_nonce_expiry;
    if app.version_number() >= expiry {
        return Err(OffchainError::illegal_action(format!(
            "virtual app version {} reached nonce expiry {expiry}",
            app.version_number()
        )));
    }
    Ok(PendingCommitment {
        key,
        commitment: Commitment::VirtualAppSetState(VirtualAppSetStateCommitment::for_app(
            app,
            intermediary,
            expiry,
            env.network,
        )),
        intermediary_signature: app.intermediary_signature().copied(),
    })
}
