//! Virtual apps through an intermediary
//!
//! Three nodes: two parties with no channel between them and an
//! intermediary holding a funded channel with each.


use offchain_core::types::{ether, ETH_TOKEN_ADDRESS};
use offchain_runtime::{Address, CommitmentKey, U256};
use test_utils::*;

const PARTY_A: usize = 0;
const INTERMEDIARY: usize = 1;
const PARTY_B: usize = 2;

struct Hub {
    cluster: TestCluster,
    with_a: Address,
    with_b: Address,
}

async fn hub(seed: u64) -> Hub {
    let cluster = TestCluster::new(3, seed);
    let with_a = cluster.funded_channel(PARTY_A, INTERMEDIARY, ether(2)).await;
    let with_b = cluster.funded_channel(INTERMEDIARY, PARTY_B, ether(2)).await;
    Hub {
        cluster,
        with_a,
        with_b,
    }
}

#[tokio::test]
async fn install_locks_funds_in_both_channels() {
    let Hub {
        cluster,
        with_a,
        with_b,
    } = hub(30).await;
    let (a, b) = (cluster.address(PARTY_A), cluster.address(PARTY_B));

    let app = cluster
        .node(PARTY_A)
        .install_virtual_app(
            b,
            cluster.address(INTERMEDIARY),
            payout_terms([(a, ether(1)), (b, ether(1))], ether(1), ether(1)),
        )
        .await
        .unwrap();
    assert!(app.is_virtual());
    assert_eq!(app.intermediary(), Some(cluster.address(INTERMEDIARY)));
    assert!(app.intermediary_signature().is_some());

    // each agreement locks the user's deposit and the intermediary's mirror
    for node in [PARTY_A, INTERMEDIARY] {
        assert_eq!(cluster.balance(node, &with_a, PARTY_A).await, ether(1));
        assert_eq!(cluster.balance(node, &with_a, INTERMEDIARY).await, ether(1));
    }
    for node in [INTERMEDIARY, PARTY_B] {
        assert_eq!(cluster.balance(node, &with_b, PARTY_B).await, ether(1));
        assert_eq!(cluster.balance(node, &with_b, INTERMEDIARY).await, ether(1));
    }

    let seen_by_b = cluster
        .node(PARTY_B)
        .get_app_instance(&app.identity_hash())
        .await
        .unwrap();
    assert_eq!(seen_by_b.identity_hash(), app.identity_hash());
    assert!(cluster
        .node(INTERMEDIARY)
        .get_app_instance(&app.identity_hash())
        .await
        .is_err());
    assert!(cluster
        .node(INTERMEDIARY)
        .get_commitment(&with_b, &CommitmentKey::Agreement(app.identity_hash()))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn updates_settle_through_the_agreements() {
    let Hub {
        cluster,
        with_a,
        with_b,
    } = hub(31).await;
    let (a, b) = (cluster.address(PARTY_A), cluster.address(PARTY_B));

    let app = cluster
        .node(PARTY_A)
        .install_virtual_app(
            b,
            cluster.address(INTERMEDIARY),
            payout_terms([(a, ether(1)), (b, ether(1))], ether(1), ether(1)),
        )
        .await
        .unwrap();
    let hash = app.identity_hash();

    let updated = cluster
        .node(PARTY_A)
        .update_state(hash, PayoutApp::state([(a, U256::zero()), (b, ether(2))]))
        .await
        .unwrap();
    assert_eq!(updated.version_number(), 1);
    assert_eq!(
        cluster.node(PARTY_B).get_app_instance(&hash).await.unwrap(),
        updated
    );

    let free_balance = cluster.node(PARTY_B).uninstall_virtual_app(hash).await.unwrap();
    assert_eq!(free_balance.balance_of(&ETH_TOKEN_ADDRESS, &b), ether(3));

    // A lost its deposit to the intermediary, which paid B out of its mirror
    for node in [PARTY_A, INTERMEDIARY] {
        assert_eq!(cluster.balance(node, &with_a, PARTY_A).await, ether(1));
        assert_eq!(cluster.balance(node, &with_a, INTERMEDIARY).await, ether(3));
    }
    for node in [INTERMEDIARY, PARTY_B] {
        assert_eq!(cluster.balance(node, &with_b, PARTY_B).await, ether(3));
        assert_eq!(cluster.balance(node, &with_b, INTERMEDIARY).await, ether(1));
    }
    for node in [PARTY_A, PARTY_B] {
        assert!(cluster.node(node).get_app_instance(&hash).await.is_err());
    }
}

#[tokio::test]
async fn second_virtual_app_takes_the_next_sequence_number() {
    let Hub { cluster, .. } = hub(32).await;
    let (a, b) = (cluster.address(PARTY_A), cluster.address(PARTY_B));
    let terms = || payout_terms([(a, U256::zero()), (b, U256::zero())], U256::zero(), U256::zero());

    let first = cluster
        .node(PARTY_A)
        .install_virtual_app(b, cluster.address(INTERMEDIARY), terms())
        .await
        .unwrap();
    let second = cluster
        .node(PARTY_B)
        .install_virtual_app(a, cluster.address(INTERMEDIARY), terms())
        .await
        .unwrap();

    assert_eq!(first.identity().channel_nonce + 1, second.identity().channel_nonce);
    assert_ne!(first.identity_hash(), second.identity_hash());
}

#[tokio::test]
async fn intermediary_without_funds_refuses() {
    let cluster = TestCluster::new(3, 33);
    let with_a = cluster.open_channel(PARTY_A, INTERMEDIARY).await;
    cluster.deposit(PARTY_A, with_a, ether(1)).await;
    cluster.funded_channel(INTERMEDIARY, PARTY_B, ether(1)).await;
    let (a, b) = (cluster.address(PARTY_A), cluster.address(PARTY_B));

    let err = cluster
        .node(PARTY_A)
        .install_virtual_app(
            b,
            cluster.address(INTERMEDIARY),
            payout_terms([(a, ether(1)), (b, ether(1))], ether(1), ether(1)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(cluster.balance(PARTY_A, &with_a, PARTY_A).await, ether(1));
}
