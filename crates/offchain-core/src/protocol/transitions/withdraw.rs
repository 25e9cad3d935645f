use crate::commitment::{Commitment, CommitmentKey, WithdrawCommitment};
use crate::errors::{OffchainError, Result};
use crate::protocol::context::{Context, PendingCommitment, ProtocolEnvironment};
use crate::protocol::params::WithdrawParams;

use super::free_balance_commitment;

pub(super) fn prepare(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &WithdrawParams,
) -> Result<()> {
    if params.amount.is_zero() {
        return Err(OffchainError::invalid_params("withdraw amount must be positive"));
    }
    let channel = ctx.direct_channel_mut(
        &params.multisig_address,
        [params.initiator_identifier, params.responder_identifier],
    )?;
    channel.withdraw(
        &params.initiator_identifier,
        &params.token_address,
        params.amount,
    )?;

    let free_balance = free_balance_commitment(channel, env.network);
    let transfer = WithdrawCommitment::for_channel(
        channel,
        params.recipient,
        params.amount,
        params.token_address,
    );
    ctx.set_commitment(0, free_balance);
    ctx.set_commitment(
        1,
        PendingCommitment::new(CommitmentKey::Withdraw, Commitment::Withdraw(transfer)),
    );
    Ok(())
}
