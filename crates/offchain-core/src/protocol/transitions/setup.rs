use crate::commitment::{Commitment, CommitmentKey, SetupCommitment};
use crate::errors::{Result, ValidationError};
use crate::model::StateChannel;
use crate::protocol::context::{Context, PendingCommitment, ProtocolEnvironment};
use crate::protocol::params::SetupParams;

pub(super) fn prepare(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &SetupParams,
) -> Result<()> {
    if ctx.has_channel(&params.multisig_address) {
        return Err(ValidationError::ChannelAlreadyExists {
            multisig: params.multisig_address.to_string(),
        }
        .into());
    }
    let channel = StateChannel::setup(
        params.multisig_address,
        [params.initiator_identifier, params.responder_identifier],
        env.network.free_balance_app,
        env.channel.free_balance_timeout,
    )?;
    let commitment = SetupCommitment::for_channel(&channel, env.network);
    ctx.insert_channel(channel);
    ctx.set_commitment(
        0,
        PendingCommitment::new(CommitmentKey::Setup, Commitment::Setup(commitment)),
    );
    Ok(())
}
