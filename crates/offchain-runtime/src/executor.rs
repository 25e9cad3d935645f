//! Instruction executor
//!
//! Walks one role's instruction list against a [`Context`]. `SendAndWait` is
//! the only suspension point; it registers a reply waiter before sending and
//! gives up after the configured step timeout. A failed run returns the
//! error and drops the context, so nothing it did is ever persisted.
//!
//! A trailing `Send` is not performed here. It is returned with the outcome
//! so the caller can persist first and then release the peer.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, trace};

use offchain_core::commitment::SignerCapacity;
use offchain_core::protocol::{transitions, Instruction, Role, SigRef};
use offchain_core::{
    Address, Context, Messenger, OffchainError, ProtocolEnvironment, ProtocolMessage,
    ProtocolOutcome, Result, SigningKeyPair, UNASSIGNED_SEQ_NO,
};

use crate::managers::ReplyRouter;

/// Message to send once the run's outcome is durable
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredSend {
    pub to: Address,
    pub message: ProtocolMessage,
}

/// A run that reached the end of its instructions
#[derive(Debug, Clone)]
pub struct ExecutedRun {
    pub outcome: ProtocolOutcome,
    pub deferred: Option<DeferredSend>,
}

pub struct InstructionExecutor<'a> {
    key: &'a SigningKeyPair,
    messenger: &'a dyn Messenger,
    replies: &'a ReplyRouter,
    step_timeout: Duration,
}

impl<'a> InstructionExecutor<'a> {
    pub fn new(
        key: &'a SigningKeyPair,
        messenger: &'a dyn Messenger,
        replies: &'a ReplyRouter,
        step_timeout: Duration,
    ) -> Self {
        Self {
            key,
            messenger,
            replies,
            step_timeout,
        }
    }

    /// Run `ctx.role` of the protocol to completion
    pub async fn run(
        &self,
        mut ctx: Context,
        env: &ProtocolEnvironment<'_>,
        inbound: Option<&ProtocolMessage>,
    ) -> Result<ExecutedRun> {
        transitions::prepare(&mut ctx, env)?;

        let flow = ctx.flow()?;
        if let Some(message) = inbound {
            ctx.absorb(flow.receives, &message.signatures())?;
        }

        let (steps, trailing) = match flow.instructions.split_last() {
            Some((Instruction::Send { to, seq, carry }, rest)) => (rest, Some((*to, *seq, *carry))),
            _ => (flow.instructions, None),
        };

        let process_id = ctx.process_id;
        for (step, instruction) in steps.iter().enumerate() {
            trace!(process_id = %process_id, step, ?instruction, "executing instruction");
            match *instruction {
                Instruction::Sign(slot) => ctx.sign(slot, self.key, SignerCapacity::Party)?,
                Instruction::SignAsIntermediary(slot) => {
                    ctx.sign(slot, self.key, SignerCapacity::Intermediary)?
                }
                Instruction::Send { to, seq, carry } => {
                    let outbound = self.message(&ctx, env, to, seq, carry)?;
                    self.messenger.send(outbound.to, outbound.message).await?;
                }
                Instruction::SendAndWait {
                    to,
                    seq,
                    carry,
                    expect,
                } => {
                    let reply = self.send_and_wait(&ctx, env, to, seq, carry).await?;
                    ctx.absorb(expect, &reply.signatures())?;
                }
                Instruction::WriteCommitment(slot) => {
                    let written = ctx.write(slot)?;
                    debug!(
                        process_id = %process_id,
                        key = %written.key,
                        kind = %written.kind,
                        "wrote commitment"
                    );
                }
            }
        }

        transitions::complete(&mut ctx, env)?;

        let deferred = trailing
            .map(|(to, seq, carry)| self.message(&ctx, env, to, seq, carry))
            .transpose()?;
        Ok(ExecutedRun {
            outcome: ctx.into_outcome(),
            deferred,
        })
    }

    async fn send_and_wait(
        &self,
        ctx: &Context,
        env: &ProtocolEnvironment<'_>,
        to: Role,
        seq: i32,
        carry: &[SigRef],
    ) -> Result<ProtocolMessage> {
        let outbound = self.message(ctx, env, to, seq, carry)?;
        let peer = outbound.to;

        let waiter = self.replies.register(ctx.process_id, peer);
        if let Err(err) = self.messenger.send(peer, outbound.message).await {
            self.replies.cancel(ctx.process_id, &peer);
            return Err(err);
        }

        match timeout(self.step_timeout, waiter).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(OffchainError::malformed_message(format!(
                "reply waiter for {peer} was dropped"
            ))),
            Err(_) => {
                self.replies.cancel(ctx.process_id, &peer);
                Err(OffchainError::Timeout {
                    protocol: ctx.protocol().to_string(),
                    peer: peer.to_string(),
                    duration_ms: self.step_timeout.as_millis() as u64,
                })
            }
        }
    }

    fn message(
        &self,
        ctx: &Context,
        env: &ProtocolEnvironment<'_>,
        to: Role,
        seq: i32,
        carry: &[SigRef],
    ) -> Result<DeferredSend> {
        let peer = ctx.address_of(to)?;
        let message = if seq == UNASSIGNED_SEQ_NO {
            ProtocolMessage::reply(ctx.process_id, ctx.protocol(), env.me, peer)
        } else {
            ProtocolMessage::initiating(ctx.process_id, &ctx.params, env.me, peer, seq)?
        };
        Ok(DeferredSend {
            to: peer,
            message: message.with_signatures(ctx.carry(carry)?)?,
        })
    }
}
