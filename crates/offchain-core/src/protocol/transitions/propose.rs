//! Propose and RejectInstall
//!
//! Neither signs anything. Both sides record, or drop, the same proposal.

use tracing::debug;

use crate::errors::Result;
use crate::model::CoinTransfer;
use crate::protocol::context::{Context, ProtocolEnvironment};
use crate::protocol::params::{AppParams, ProposeParams};

use super::{check_refund_terms, check_terms};

pub(super) fn prepare(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &ProposeParams,
) -> Result<()> {
    check_terms(env, &params.terms)?;
    check_refund_terms(ctx, env, &params.multisig_address, None, &params.terms)?;
    let channel = ctx.direct_channel_mut(
        &params.multisig_address,
        [params.initiator_identifier, params.responder_identifier],
    )?;

    // both deposits must be coverable before anyone commits to them
    let mut funded = channel.free_balance().state().clone();
    funded.decrement(
        &params.terms.token,
        &[
            CoinTransfer::new(params.initiator_identifier, params.terms.initiator_deposit),
            CoinTransfer::new(params.responder_identifier, params.terms.responder_deposit),
        ],
    )?;

    let proposal = channel.propose(
        params.initiator_identifier,
        params.responder_identifier,
        params.terms.clone(),
    )?;
    debug!(
        multisig = %params.multisig_address,
        identity_hash = %proposal.identity_hash,
        app_seq_no = proposal.app_seq_no,
        "recorded proposal"
    );
    Ok(())
}

pub(super) fn prepare_reject(ctx: &mut Context, params: &AppParams) -> Result<()> {
    let channel = ctx.direct_channel_mut(
        &params.multisig_address,
        [params.initiator_identifier, params.responder_identifier],
    )?;
    channel.remove_proposal(&params.app_identity_hash)?;
    debug!(
        multisig = %params.multisig_address,
        identity_hash = %params.app_identity_hash,
        "rejected proposal"
    );
    Ok(())
}
