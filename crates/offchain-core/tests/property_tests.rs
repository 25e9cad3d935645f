//! Property-based tests for signatures and balance accounting
//!
//! These tests verify the invariants every commitment relies on: signature
//! aggregates follow owner address order, digests are a pure function of the
//! commitment, app versions only move forward, and moving funds through an
//! app never creates or destroys any.


use offchain_core::commitment::{
    virtual_app, Commitment, InstallCommitment, MultisigCall, Operation, SetStateCommitment,
    SignerCapacity, VirtualAppSetStateCommitment, WithdrawCommitment,
};
use offchain_core::model::{AppIdentity, AppInstance, InterpreterParams, StateChannel};
use offchain_core::signatures::{self, AggregatedSignature};
use offchain_core::types::ETH_TOKEN_ADDRESS;
use offchain_core::{
    abi, keccak256, Address, AppLogic, Bytes, Bytes32, NetworkContext, SigningKeyPair, U256,
};
use proptest::prelude::*;
use test_utils::*;

/// Generate a valid secp256k1 secret
fn arb_secret() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>().prop_filter("valid scalar", |bytes| {
        SigningKeyPair::from_bytes(bytes).is_ok()
    })
}

/// Generate two distinct keys
fn arb_key_pair() -> impl Strategy<Value = (SigningKeyPair, SigningKeyPair)> {
    (arb_secret(), arb_secret())
        .prop_filter("distinct keys", |(a, b)| a != b)
        .prop_map(|(a, b)| {
            (
                SigningKeyPair::from_bytes(&a).unwrap(),
                SigningKeyPair::from_bytes(&b).unwrap(),
            )
        })
}

/// Amounts in wei, small enough that sums never overflow
fn arb_amount() -> impl Strategy<Value = u64> {
    0u64..=1_000_000_000u64
}

/// Counter increments, one per state update
fn arb_increments() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..=1_000, 0..24)
}

/// Channel between `a` and `b` with a counter app installed at version 0
fn channel_with_counter(a: &SigningKeyPair, b: &SigningKeyPair) -> (StateChannel, AppInstance) {
    let mut channel = channel_between(a, b);
    let proposal = channel
        .propose(a.address(), b.address(), counter_terms(U256::zero(), U256::zero()))
        .unwrap();
    let app = channel.install(&proposal.identity_hash).unwrap();
    (channel, app)
}

/// Walk the counter through `increments` one update at a time
fn counter_after(channel: &mut StateChannel, app: &AppInstance, increments: &[u64]) -> AppInstance {
    let mut count = 0;
    for (turn, increment) in increments.iter().enumerate() {
        count += increment;
        channel
            .update_state(&app.identity_hash(), CounterApp::state(turn as u64 + 1, count))
            .unwrap();
    }
    channel.app_instance(&app.identity_hash()).unwrap().clone()
}

fn virtual_counter(a: &SigningKeyPair, b: &SigningKeyPair, intermediary: Address) -> AppInstance {
    AppInstance::new(
        AppIdentity {
            owner: Address::new([0xdd; 20]),
            participants: vec![b.address(), a.address()],
            app_definition: counter_app_definition(),
            default_timeout: 100,
            channel_nonce: 0,
        },
        CounterApp::interface(),
        CounterApp::state(0, 0),
        InterpreterParams::TwoPartyFixed {
            player_addrs: [a.address(), b.address()],
            amount: U256::from(10u64),
            token: ETH_TOKEN_ADDRESS,
        },
    )
    .into_virtual(intermediary)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: aggregates are ordered by signer address regardless of
    /// the order keys sign in
    #[test]
    fn aggregate_follows_address_order(
        (a, b) in arb_key_pair(),
        digest_bytes in any::<[u8; 32]>(),
    ) {
        let digest = offchain_core::Bytes32::new(digest_bytes);
        let forward = signatures::collect_signatures(&digest, &[&a, &b]).unwrap();
        let reverse = signatures::collect_signatures(&digest, &[&b, &a]).unwrap();
        prop_assert_eq!(&forward, &reverse);

        let mut owners = vec![a.address(), b.address()];
        owners.sort();
        prop_assert!(signatures::verify(&digest, &forward, &owners));

        let swapped: Vec<_> = forward.signatures().iter().rev().copied().collect();
        let swapped = AggregatedSignature::from_ordered(swapped);
        prop_assert!(!signatures::verify(&digest, &swapped, &owners));
    }

    /// Property: an aggregate survives its wire encoding
    #[test]
    fn aggregate_bytes_recover_the_signers(
        (a, b) in arb_key_pair(),
        digest_bytes in any::<[u8; 32]>(),
    ) {
        let digest = offchain_core::Bytes32::new(digest_bytes);
        let aggregate = signatures::collect_signatures(&digest, &[&a, &b]).unwrap();
        let parsed = AggregatedSignature::from_bytes(&aggregate.to_bytes()).unwrap();

        let mut owners = vec![a.address(), b.address()];
        owners.sort();
        prop_assert!(signatures::verify(&digest, &parsed, &owners));
    }

    /// Property: both parties derive the same install digest from the same
    /// channel state, and any change to the locked amounts changes it
    #[test]
    fn install_digest_is_deterministic(
        seed in any::<u64>(),
        deposit_a in arb_amount(),
        deposit_b in arb_amount(),
    ) {
        let mut keys = DeterministicKeys::new(seed);
        let (a, b) = keys.ordered_pair();
        let network = NetworkContext::development();

        let build = |extra: u64| {
            let mut channel = channel_between(&a, &b);
            fund(&mut channel, a.address(), U256::from(deposit_a + extra));
            fund(&mut channel, b.address(), U256::from(deposit_b));
            let split = [(a.address(), U256::zero()), (b.address(), U256::zero())];
            let proposal = channel
                .propose(
                    a.address(),
                    b.address(),
                    payout_terms(split, U256::from(deposit_a), U256::from(deposit_b)),
                )
                .unwrap();
            let app = channel.install(&proposal.identity_hash).unwrap();
            Commitment::Install(InstallCommitment::for_app(&channel, &app, &network))
        };

        let mine = build(0);
        let theirs = build(0);
        prop_assert_eq!(mine.digest(), theirs.digest());
        prop_assert_ne!(mine.digest(), build(1).digest());

        let sig_a = mine.sign(&a, SignerCapacity::Party).unwrap();
        prop_assert!(theirs.verify_signature(&a.address(), SignerCapacity::Party, &sig_a).is_ok());
    }

    /// Property: install followed by uninstall conserves the channel total
    #[test]
    fn funds_are_conserved_through_an_app(
        seed in any::<u64>(),
        deposit_a in arb_amount(),
        deposit_b in arb_amount(),
        share in 0u64..=100,
    ) {
        let mut keys = DeterministicKeys::new(seed);
        let (a, b) = keys.ordered_pair();
        let mut channel = channel_between(&a, &b);
        fund(&mut channel, a.address(), U256::from(deposit_a));
        fund(&mut channel, b.address(), U256::from(deposit_b));
        let total = channel.free_balance().state().total(&ETH_TOKEN_ADDRESS);

        let locked = deposit_a + deposit_b;
        let to_a = locked / 100 * share;
        let split = [(a.address(), U256::zero()), (b.address(), U256::zero())];
        let proposal = channel
            .propose(
                a.address(),
                b.address(),
                payout_terms(split, U256::from(deposit_a), U256::from(deposit_b)),
            )
            .unwrap();
        let app = channel.install(&proposal.identity_hash).unwrap();
        prop_assert_eq!(
            channel.free_balance().state().total(&ETH_TOKEN_ADDRESS),
            total - U256::from(locked)
        );

        let final_state = PayoutApp
            .apply_action(
                app.latest_state(),
                &PayoutApp::action([U256::from(to_a), U256::from(locked - to_a)]),
            )
            .unwrap();
        let outcome = PayoutApp.compute_outcome(&final_state).unwrap();
        let payouts = app.interpreter_params().interpret(&outcome).unwrap();
        channel.uninstall(&app.identity_hash(), &payouts).unwrap();

        prop_assert_eq!(channel.free_balance().state().total(&ETH_TOKEN_ADDRESS), total);
        prop_assert_eq!(
            channel.free_balance().state().balance_of(&ETH_TOKEN_ADDRESS, &a.address()),
            U256::from(to_a)
        );
    }

    /// Property: a set-state digest depends only on the app's identity,
    /// state, version and timeout, however the app reached them
    #[test]
    fn set_state_digest_ignores_the_update_path(
        seed in any::<u64>(),
        increments in arb_increments(),
    ) {
        let mut keys = DeterministicKeys::new(seed);
        let (a, b) = keys.ordered_pair();
        let network = NetworkContext::development();

        let (mut mine, app) = channel_with_counter(&a, &b);
        let stepped = counter_after(&mut mine, &app, &increments);

        // the peer jumps straight to the final state it was shown
        let (_, theirs) = channel_with_counter(&b, &a);
        let version = increments.len() as u64;
        let jumped = if version == 0 {
            theirs.clone()
        } else {
            theirs.set_state_at(stepped.latest_state().clone(), version).unwrap()
        };

        let by_steps = SetStateCommitment::for_app(&stepped, &network);
        let by_jump = SetStateCommitment::for_app(&jumped, &network);
        prop_assert_eq!(&by_steps, &by_jump);
        prop_assert_eq!(
            Commitment::SetState(by_steps.clone()).digest(),
            Commitment::SetState(by_jump).digest()
        );

        let assembled = SetStateCommitment {
            app_registry: network.app_registry,
            identity: stepped.identity().clone(),
            identity_hash: stepped.identity_hash(),
            app_state_hash: keccak256(stepped.latest_state()),
            version_number: version,
            timeout: stepped.timeout(),
        };
        prop_assert_eq!(
            Commitment::SetState(assembled).digest(),
            Commitment::SetState(by_steps.clone()).digest()
        );

        let next = stepped.set_state(CounterApp::state(version + 1, 0));
        prop_assert_ne!(
            Commitment::SetState(SetStateCommitment::for_app(&next, &network)).digest(),
            Commitment::SetState(by_steps).digest()
        );
    }

    /// Property: a withdrawal digest is the digest of the multisig call it
    /// stands for, and names the amount and recipient it pays
    #[test]
    fn withdraw_digest_matches_the_multisig_call(
        seed in any::<u64>(),
        amount in arb_amount(),
        recipient_bytes in any::<[u8; 20]>(),
        token_bytes in any::<[u8; 20]>(),
    ) {
        let mut keys = DeterministicKeys::new(seed);
        let (a, b) = keys.ordered_pair();
        let channel = channel_between(&a, &b);
        let recipient = Address::new(recipient_bytes);
        let token = Address::new(token_bytes);
        let amount = U256::from(amount);

        let eth = WithdrawCommitment::for_channel(&channel, recipient, amount, ETH_TOKEN_ADDRESS);
        let direct = MultisigCall {
            multisig: channel.multisig_address(),
            owners: vec![a.address(), b.address()],
            to: recipient,
            value: amount,
            data: Vec::new(),
            operation: Operation::Call,
        };
        prop_assert_eq!(Commitment::Withdraw(eth.clone()).digest(), direct.digest());

        if token != ETH_TOKEN_ADDRESS {
            let erc20 = WithdrawCommitment::for_channel(&channel, recipient, amount, token);
            let transfer = MultisigCall {
                to: token,
                value: U256::zero(),
                data: abi::encode_call(
                    "transfer(address,uint256)",
                    &[abi::Token::Address(recipient), abi::Token::Uint(amount)],
                ),
                ..direct.clone()
            };
            prop_assert_eq!(Commitment::Withdraw(erc20.clone()).digest(), transfer.digest());
            prop_assert_ne!(Commitment::Withdraw(erc20).digest(), direct.digest());
        }

        let more = WithdrawCommitment::for_channel(&channel, recipient, amount + 1, ETH_TOKEN_ADDRESS);
        prop_assert_ne!(Commitment::Withdraw(more).digest(), Commitment::Withdraw(eth).digest());
    }

    /// Property: the parties of a virtual app sign the plain set-state
    /// digest, while the intermediary's digest ignores state and version
    #[test]
    fn virtual_app_digests_follow_their_signers(
        seed in any::<u64>(),
        increments in arb_increments(),
        nonce_expiry in 1u64..=1_000_000,
    ) {
        let mut keys = DeterministicKeys::new(seed);
        let (a, b) = keys.ordered_pair();
        let intermediary = keys.next_key().address();
        let network = NetworkContext::development();

        let mut stepped = virtual_counter(&a, &b, intermediary);
        let mut count = 0;
        for (turn, increment) in increments.iter().enumerate() {
            count += increment;
            stepped = stepped.set_state(CounterApp::state(turn as u64 + 1, count));
        }
        let version = increments.len() as u64;
        let fresh = virtual_counter(&b, &a, intermediary);
        let jumped = if version == 0 {
            fresh.clone()
        } else {
            fresh.set_state_at(stepped.latest_state().clone(), version).unwrap()
        };

        let by_steps = VirtualAppSetStateCommitment::for_app(&stepped, intermediary, nonce_expiry, &network);
        let by_jump = VirtualAppSetStateCommitment::for_app(&jumped, intermediary, nonce_expiry, &network);
        let at_start = VirtualAppSetStateCommitment::for_app(&fresh, intermediary, nonce_expiry, &network);
        prop_assert_eq!(
            Commitment::VirtualAppSetState(by_steps.clone()).digest(),
            Commitment::VirtualAppSetState(by_jump.clone()).digest()
        );
        prop_assert_eq!(
            Commitment::VirtualAppSetState(by_steps.clone()).digest(),
            Commitment::SetState(SetStateCommitment::for_app(&stepped, &network)).digest()
        );

        prop_assert_eq!(
            virtual_app::intermediary_digest(&by_steps),
            virtual_app::intermediary_digest(&at_start)
        );
        let intermediary_view = Commitment::VirtualAppSetState(by_jump)
            .digest_for(SignerCapacity::Intermediary)
            .unwrap();
        prop_assert_eq!(intermediary_view, virtual_app::intermediary_digest(&by_steps));

        let later = VirtualAppSetStateCommitment::for_app(&stepped, intermediary, nonce_expiry + 1, &network);
        prop_assert_ne!(
            virtual_app::intermediary_digest(&later),
            virtual_app::intermediary_digest(&by_steps)
        );
    }

    /// Property: every update moves the version up by one, and no earlier
    /// version can be written again
    #[test]
    fn versions_only_move_forward(
        seed in any::<u64>(),
        increments in arb_increments(),
        stale_pick in any::<prop::sample::Index>(),
    ) {
        let mut keys = DeterministicKeys::new(seed);
        let (a, b) = keys.ordered_pair();
        let network = NetworkContext::development();
        let (mut channel, app) = channel_with_counter(&a, &b);
        let hash = app.identity_hash();

        let mut versions = vec![app.version_number()];
        let mut digests = vec![SetStateCommitment::for_app(&app, &network)];
        let mut count = 0;
        for (turn, increment) in increments.iter().enumerate() {
            count += increment;
            let updated = channel
                .update_state(&hash, CounterApp::state(turn as u64 + 1, count))
                .unwrap()
                .clone();
            versions.push(updated.version_number());
            digests.push(SetStateCommitment::for_app(&updated, &network));
        }

        for pair in versions.windows(2) {
            prop_assert_eq!(pair[1], pair[0] + 1);
        }
        let mut distinct: Vec<Bytes32> = digests
            .into_iter()
            .map(|c| Commitment::SetState(c).digest())
            .collect();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(distinct.len(), versions.len());

        let latest = channel.app_instance(&hash).unwrap().clone();
        let stale = versions[stale_pick.index(versions.len())];
        let replay = latest.set_state_at(Bytes::new(vec![0xab]), stale);
        prop_assert_eq!(replay.unwrap_err().kind(), "invalid_transition");
        prop_assert_eq!(latest.version_number(), *versions.last().unwrap());
    }
}
