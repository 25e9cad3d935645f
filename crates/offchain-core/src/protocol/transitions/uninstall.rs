use tracing::debug;

use crate::errors::{OffchainError, Result};
use crate::protocol::context::{Context, ProtocolEnvironment};
use crate::protocol::params::AppParams;

use super::{app_payouts, free_balance_commitment};

pub(super) fn prepare(
    ctx: &mut Context,
    env: &ProtocolEnvironment<'_>,
    params: &AppParams,
) -> Result<()> {
    let hash = params.app_identity_hash;
    let app = ctx
        .direct_channel_mut(
            &params.multisig_address,
            [params.initiator_identifier, params.responder_identifier],
        )?
        .app_instance(&hash)?
        .clone();
    if app.is_virtual() {
        return Err(OffchainError::invalid_params(
            "virtual apps are uninstalled with uninstallVirtualApp",
        ));
    }
    let payouts = app_payouts(ctx, env, &app)?;
    let channel = ctx.channel_mut(&params.multisig_address)?;
    channel.uninstall(&hash, &payouts)?;
    debug!(
        multisig = %params.multisig_address,
        identity_hash = %hash,
        payouts = payouts.len(),
        "uninstalling app"
    );

    let pending = free_balance_commitment(channel, env.network);
    ctx.set_commitment(0, pending);
    Ok(())
}
