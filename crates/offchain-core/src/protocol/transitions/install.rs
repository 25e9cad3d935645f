use tracing::debug;

use crate::commitment::{Commitment, CommitmentKey, InstallCommitment};
use crate::errors::Result;
use crate::protocol::context::{Context, PendingCommitment, ProtocolEnvironment};
use crate::protocol::params::AppParams;

use super::{check_refund_terms, check_terms};

pub(super) fn prepare(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &AppParams,
) -> Result<()> {
    let hash = params.app_identity_hash;
    let proposed = ctx
        .channel(&params.multisig_address)?
        .proposal(&hash)
        .ok()
        .map(|p| p.terms.clone());
    if let Some(terms) = proposed {
        check_terms(env, &terms)?;
        check_refund_terms(ctx, env, &params.multisig_address, Some(&hash), &terms)?;
    }
    let channel = ctx.direct_channel_mut(
        &params.multisig_address,
        [params.initiator_identifier, params.responder_identifier],
    )?;
    let app = channel.install(&hash)?;
    let commitment = InstallCommitment::for_app(channel, &app, env.network);
    debug!(
        multisig = %params.multisig_address,
        identity_hash = %hash,
        free_balance_version = channel.free_balance().version_number(),
        "installing app"
    );
    ctx.set_commitment(
        0,
        PendingCommitment::new(CommitmentKey::Install(hash), Commitment::Install(commitment)),
    );
    Ok(())
}
