//! Protocol state transitions
//!
//! `prepare` runs before a role's first instruction. It validates the run's
//! parameters against the local working copy, applies the protocol's effect
//! to it and fixes the commitment of every slot the role touches. Every role
//! applies the same effect independently, so a peer that disagrees fails
//! here or at signature verification, never after writing anything.
//!
//! `complete` runs after the last instruction for the few effects that
//! depend on signatures gathered during the run.

mod install;
mod propose;
mod setup;
mod uninstall;
mod update;
mod virtual_app;
mod withdraw;

use crate::apps::{AppRegistry, BalanceRefundApp};
use crate::commitment::{Commitment, CommitmentKey, SetStateCommitment};
use crate::config::NetworkContext;
use crate::errors::{OffchainError, Result, ValidationError};
use crate::model::{
    AppInstance, CoinTransfer, InterpreterParams, OutcomeType, ProposalTerms, StateChannel,
};
use crate::protocol::context::{Context, PendingCommitment, ProtocolEnvironment};
use crate::protocol::params::ProtocolParams;
use crate::types::{Address, Bytes32, U256};

pub fn prepare(ctx: &mut Context, env: &ProtocolEnvironment<'_>) -> Result<()> {
    match ctx.params.clone() {
        ProtocolParams::Setup(p) => setup::prepare(ctx, env, &p),
        ProtocolParams::Propose(p) => propose::prepare(ctx, env, &p),
        ProtocolParams::RejectInstall(p) => propose::prepare_reject(ctx, &p),
        ProtocolParams::Install(p) => install::prepare(ctx, env, &p),
        ProtocolParams::Update(p) => update::prepare_update(ctx, env, &p),
        ProtocolParams::TakeAction(p) => update::prepare_take_action(ctx, env, &p),
        ProtocolParams::Uninstall(p) => uninstall::prepare(ctx, env, &p),
        ProtocolParams::Withdraw(p) => withdraw::prepare(ctx, env, &p),
        ProtocolParams::InstallVirtualApp(p) => virtual_app::prepare_install(ctx, env, &p),
        ProtocolParams::UninstallVirtualApp(p) => virtual_app::prepare_uninstall(ctx, env, &p),
    }
}

pub fn complete(ctx: &mut Context, env: &ProtocolEnvironment<'_>) -> Result<()> {
    match ctx.params.clone() {
        ProtocolParams::InstallVirtualApp(p) => virtual_app::complete_install(ctx, env, &p),
        _ => Ok(()),
    }
}

// ----------------------------------------------------------------------------
// Shared Helpers
// ----------------------------------------------------------------------------

/// Set-state commitment for the channel's current free balance
fn free_balance_commitment(channel: &StateChannel, network: &NetworkContext) -> PendingCommitment {
    PendingCommitment::new(
        CommitmentKey::FreeBalance,
        Commitment::SetState(SetStateCommitment::for_app(
            channel.free_balance().instance(),
            network,
        )),
    )
}

/// Payouts of `state` under `app_definition`, checked against its terms
fn resolve_payouts(
    apps: &AppRegistry,
    app_definition: &Address,
    params: &InterpreterParams,
    state: &[u8],
) -> Result<Vec<CoinTransfer>> {
    let outcome = apps.get(app_definition)?.compute_outcome(state)?;
    params.interpret(&outcome)
}

/// Terms any app must meet: a registered definition and a payout limit no
/// larger than what the parties lock. The refund app locks nothing and is
/// checked against the ledger by [`check_refund_terms`] instead.
fn check_terms(env: &ProtocolEnvironment<'_>, terms: &ProposalTerms) -> Result<()> {
    env.apps.get(&terms.app_interface.addr)?;
    if terms.app_interface.addr == env.network.balance_refund_app {
        return Ok(());
    }
    let deposits = terms
        .initiator_deposit
        .checked_add(terms.responder_deposit)
        .ok_or_else(|| OffchainError::invalid_params("deposits overflow"))?;
    match terms.interpreter_limit {
        Some(limit) if limit > deposits => Err(ValidationError::LimitExceedsDeposits {
            limit: limit.to_string(),
            deposits: deposits.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// A refund app locks nothing, names the channel it sits in, sets its
/// threshold no lower than the balance the multisig already holds, and is
/// the only refund app in the channel.
fn check_refund_terms(
    ctx: &Context,
    env: &ProtocolEnvironment<'_>,
    multisig: &Address,
    installing: Option<&Bytes32>,
    terms: &ProposalTerms,
) -> Result<()> {
    let refund_app = env.network.balance_refund_app;
    if terms.app_interface.addr != refund_app {
        return Ok(());
    }
    let unverified = |reason: String| -> OffchainError {
        ValidationError::UnverifiedRefund { reason }.into()
    };
    if !terms.initiator_deposit.is_zero() || !terms.responder_deposit.is_zero() {
        return Err(unverified("refund apps lock no deposits".into()));
    }
    if terms.outcome_type != OutcomeType::CoinTransfer || terms.interpreter_limit.is_none() {
        return Err(unverified("refund apps pay a coin transfer up to a set limit".into()));
    }
    let (_, state_multisig, threshold) = BalanceRefundApp::decode_state(&terms.initial_state)?;
    if state_multisig != *multisig {
        return Err(unverified(format!("refund state names {state_multisig}")));
    }
    let held = ctx
        .ledger_balance(multisig, &terms.token)
        .ok_or_else(|| unverified(format!("no ledger balance observed for {multisig}")))?;
    if threshold < held {
        return Err(unverified(format!(
            "threshold {threshold} is below the {held} the multisig holds"
        )));
    }

    let channel = ctx.channel(multisig)?;
    let other_refund = channel
        .app_instances()
        .map(|app| (app.identity_hash(), app.app_definition()))
        .chain(
            channel
                .proposals()
                .map(|p| (p.identity_hash, p.terms.app_interface.addr)),
        )
        .any(|(hash, definition)| definition == refund_app && Some(&hash) != installing);
    if other_refund {
        return Err(unverified(format!("{multisig} already has a deposit in flight")));
    }
    Ok(())
}

/// Payouts of an installed app's latest state. The refund app pays from
/// the ledger balance observed for its channel.
fn app_payouts(
    ctx: &Context,
    env: &ProtocolEnvironment<'_>,
    app: &AppInstance,
) -> Result<Vec<CoinTransfer>> {
    let params = app.interpreter_params();
    if app.app_definition() != env.network.balance_refund_app {
        return resolve_payouts(env.apps, &app.app_definition(), params, app.latest_state());
    }
    let multisig = app.identity().owner;
    let balance: U256 = ctx.ledger_balance(&multisig, &params.token()).ok_or_else(|| {
        OffchainError::from(ValidationError::UnverifiedRefund {
            reason: format!("no ledger balance observed for {multisig}"),
        })
    })?;
    params.interpret(&BalanceRefundApp::outcome_for_balance(
        app.latest_state(),
        balance,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::AppLogic;
    use crate::config::ChannelDefaults;
    use crate::model::{AppInterface, Outcome};
    use crate::protocol::params::ProposeParams;
    use crate::protocol::Role;
    use crate::types::{ether, Bytes, ETH_TOKEN_ADDRESS};
    use std::sync::Arc;
    use uuid::Uuid;

    struct SplitApp;

    impl AppLogic for SplitApp {
        fn apply_action(&self, state: &[u8], _action: &[u8]) -> Result<Bytes> {
            Ok(Bytes::new(state.to_vec()))
        }

        fn compute_outcome(&self, _state: &[u8]) -> Result<Outcome> {
            Ok(Outcome::CoinTransfer(Vec::new()))
        }
    }

    const MULTISIG: Address = Address::new([0xcc; 20]);

    fn a() -> Address {
        Address::new([0x0a; 20])
    }

    fn b() -> Address {
        Address::new([0x0b; 20])
    }

    fn split_app() -> Address {
        Address::new([0x5a; 20])
    }

    struct Fixture {
        network: NetworkContext,
        defaults: ChannelDefaults,
        apps: AppRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let network = NetworkContext::development();
            let mut apps = AppRegistry::with_builtins(&network);
            apps.register(split_app(), Arc::new(SplitApp));
            Self {
                network,
                defaults: ChannelDefaults::default(),
                apps,
            }
        }

        fn env(&self) -> ProtocolEnvironment<'_> {
            ProtocolEnvironment {
                me: a(),
                network: &self.network,
                channel: &self.defaults,
                apps: &self.apps,
            }
        }

        fn refund_terms(&self, threshold: U256, limit: U256) -> ProposalTerms {
            ProposalTerms {
                app_interface: AppInterface {
                    addr: self.network.balance_refund_app,
                    state_encoding: BalanceRefundApp::STATE_ENCODING.into(),
                    action_encoding: None,
                },
                initial_state: BalanceRefundApp::encode_state(a(), MULTISIG, threshold),
                initiator_deposit: U256::zero(),
                responder_deposit: U256::zero(),
                token: ETH_TOKEN_ADDRESS,
                default_timeout: 1008,
                outcome_type: OutcomeType::CoinTransfer,
                interpreter_limit: Some(limit),
            }
        }

        fn context(&self, terms: &ProposalTerms) -> Context {
            let channel =
                StateChannel::setup(MULTISIG, [a(), b()], self.network.free_balance_app, 172_800)
                    .unwrap();
            Context::new(
                Uuid::nil(),
                ProtocolParams::Propose(ProposeParams {
                    initiator_identifier: a(),
                    responder_identifier: b(),
                    multisig_address: MULTISIG,
                    terms: terms.clone(),
                }),
                Role::Responder,
                [channel],
            )
        }
    }

    fn split_terms(deposit: U256, limit: Option<U256>) -> ProposalTerms {
        ProposalTerms {
            app_interface: AppInterface {
                addr: split_app(),
                state_encoding: "tuple()".into(),
                action_encoding: None,
            },
            initial_state: Bytes::default(),
            initiator_deposit: deposit,
            responder_deposit: deposit,
            token: ETH_TOKEN_ADDRESS,
            default_timeout: 100,
            outcome_type: OutcomeType::CoinTransfer,
            interpreter_limit: limit,
        }
    }

    #[test]
    fn limit_above_the_locked_deposits_is_refused() {
        let fixture = Fixture::new();
        let env = fixture.env();
        assert!(check_terms(&env, &split_terms(ether(1), None)).is_ok());
        assert!(check_terms(&env, &split_terms(ether(1), Some(ether(2)))).is_ok());

        let err = check_terms(&env, &split_terms(ether(1), Some(ether(1000)))).unwrap_err();
        assert!(matches!(
            err,
            OffchainError::Validation(ValidationError::LimitExceedsDeposits { .. })
        ));
    }

    #[test]
    fn refund_needs_an_observed_ledger_balance() {
        let fixture = Fixture::new();
        let terms = fixture.refund_terms(U256::zero(), ether(1));
        let ctx = fixture.context(&terms);

        let err = check_refund_terms(&ctx, &fixture.env(), &MULTISIG, None, &terms).unwrap_err();
        assert!(matches!(
            err,
            OffchainError::Validation(ValidationError::UnverifiedRefund { .. })
        ));
    }

    #[test]
    fn refund_threshold_must_cover_what_the_multisig_holds() {
        let fixture = Fixture::new();
        let env = fixture.env();

        let low = fixture.refund_terms(ether(1), ether(1));
        let mut ctx = fixture.context(&low);
        ctx.observe_ledger_balance(MULTISIG, ETH_TOKEN_ADDRESS, ether(2));
        assert!(check_refund_terms(&ctx, &env, &MULTISIG, None, &low).is_err());

        let exact = fixture.refund_terms(ether(2), ether(1));
        assert!(check_refund_terms(&ctx, &env, &MULTISIG, None, &exact).is_ok());

        let mut locked = exact.clone();
        locked.initiator_deposit = ether(1);
        assert!(check_refund_terms(&ctx, &env, &MULTISIG, None, &locked).is_err());

        let mut elsewhere = exact.clone();
        elsewhere.initial_state =
            BalanceRefundApp::encode_state(a(), Address::new([0xdd; 20]), ether(2));
        assert!(check_refund_terms(&ctx, &env, &MULTISIG, None, &elsewhere).is_err());
    }

    #[test]
    fn one_refund_app_per_channel() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let terms = fixture.refund_terms(U256::zero(), ether(1));
        let mut ctx = fixture.context(&terms);
        ctx.observe_ledger_balance(MULTISIG, ETH_TOKEN_ADDRESS, U256::zero());

        let proposal = ctx
            .channel_mut(&MULTISIG)
            .unwrap()
            .propose(a(), b(), terms.clone())
            .unwrap();
        let hash = proposal.identity_hash;
        assert!(check_refund_terms(&ctx, &env, &MULTISIG, Some(&hash), &terms).is_ok());
        assert!(check_refund_terms(&ctx, &env, &MULTISIG, None, &terms).is_err());
    }

    #[test]
    fn refund_pays_only_what_reached_the_multisig() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let terms = fixture.refund_terms(ether(2), ether(1000));
        let mut ctx = fixture.context(&terms);

        let channel = ctx.channel_mut(&MULTISIG).unwrap();
        let proposal = channel.propose(a(), b(), terms).unwrap();
        let app = channel.install(&proposal.identity_hash).unwrap();
        assert!(app_payouts(&ctx, &env, &app).is_err());

        // nothing was funded
        ctx.observe_ledger_balance(MULTISIG, ETH_TOKEN_ADDRESS, ether(2));
        assert_eq!(
            app_payouts(&ctx, &env, &app).unwrap(),
            vec![CoinTransfer::new(a(), U256::zero())]
        );

        ctx.observe_ledger_balance(MULTISIG, ETH_TOKEN_ADDRESS, ether(3));
        assert_eq!(
            app_payouts(&ctx, &env, &app).unwrap(),
            vec![CoinTransfer::new(a(), ether(1))]
        );
    }
}
