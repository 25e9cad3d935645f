//! In-memory store
//!
//! Channels and the latest signed commitment per key, behind one lock so a
//! protocol outcome lands all at once. [`MemoryStore::snapshot`] encodes the
//! whole state with bincode for bit-exact comparisons.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use offchain_core::commitment::{CommitmentKey, SignedCommitment};
use offchain_core::{Address, AppInstanceProposal, Bytes32, Result, StateChannel, Store};

#[derive(Debug, Default, Serialize)]
struct MemoryState {
    channels: BTreeMap<Address, StateChannel>,
    commitments: BTreeMap<Address, BTreeMap<CommitmentKey, SignedCommitment>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bincode encoding of everything stored
    pub async fn snapshot(&self) -> Result<Vec<u8>> {
        let state = self.state.read().await;
        Ok(bincode::serialize(&*state)?)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, multisig: &Address) -> Result<Option<StateChannel>> {
        Ok(self.state.read().await.channels.get(multisig).cloned())
    }

    async fn set(&self, channel: StateChannel) -> Result<()> {
        self.state
            .write()
            .await
            .channels
            .insert(channel.multisig_address(), channel);
        Ok(())
    }

    async fn set_with_commitments(
        &self,
        channels: Vec<StateChannel>,
        commitments: Vec<SignedCommitment>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        for channel in channels {
            state.channels.insert(channel.multisig_address(), channel);
        }
        for commitment in commitments {
            state
                .commitments
                .entry(commitment.multisig_address)
                .or_default()
                .insert(commitment.key, commitment);
        }
        Ok(())
    }

    async fn get_proposal(&self, identity_hash: &Bytes32) -> Result<Option<AppInstanceProposal>> {
        let state = self.state.read().await;
        Ok(state
            .channels
            .values()
            .find_map(|c| c.proposal(identity_hash).ok().cloned()))
    }

    async fn remove_proposal(&self, identity_hash: &Bytes32) -> Result<Option<AppInstanceProposal>> {
        let mut state = self.state.write().await;
        let holder = state
            .channels
            .values_mut()
            .find(|c| c.proposal(identity_hash).is_ok());
        match holder {
            Some(channel) => Ok(Some(channel.remove_proposal(identity_hash)?)),
            None => Ok(None),
        }
    }

    async fn get_commitment(
        &self,
        multisig: &Address,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>> {
        Ok(self
            .state
            .read()
            .await
            .commitments
            .get(multisig)
            .and_then(|by_key| by_key.get(key))
            .cloned())
    }

    async fn channels(&self) -> Result<Vec<StateChannel>> {
        Ok(self.state.read().await.channels.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offchain_core::model::{AppInterface, OutcomeType, ProposalTerms};
    use offchain_core::types::{ether, ETH_TOKEN_ADDRESS};
    use offchain_core::{Bytes, U256};

    fn channel() -> StateChannel {
        let owners = [Address::new([1u8; 20]), Address::new([2u8; 20])];
        StateChannel::setup(
            Address::new([3u8; 20]),
            owners,
            Address::new([7u8; 20]),
            172_800,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn proposals_are_found_and_removed_through_their_channel() {
        let store = MemoryStore::new();
        let mut channel = channel();
        let proposal = channel
            .propose(
                Address::new([1u8; 20]),
                Address::new([2u8; 20]),
                ProposalTerms {
                    app_interface: AppInterface {
                        addr: Address::new([8u8; 20]),
                        state_encoding: "uint256".into(),
                        action_encoding: None,
                    },
                    initial_state: Bytes::default(),
                    initiator_deposit: U256::zero(),
                    responder_deposit: U256::zero(),
                    token: ETH_TOKEN_ADDRESS,
                    default_timeout: 10,
                    outcome_type: OutcomeType::CoinTransfer,
                    interpreter_limit: Some(ether(1)),
                },
            )
            .unwrap();
        store.set(channel).await.unwrap();

        assert_eq!(
            store.get_proposal(&proposal.identity_hash).await.unwrap(),
            Some(proposal.clone())
        );
        assert!(store.remove_proposal(&proposal.identity_hash).await.unwrap().is_some());
        assert!(store.get_proposal(&proposal.identity_hash).await.unwrap().is_none());
        assert!(store.remove_proposal(&proposal.identity_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_tracks_writes() {
        let store = MemoryStore::new();
        let empty = store.snapshot().await.unwrap();
        assert_eq!(empty, store.snapshot().await.unwrap());

        let channel = channel();
        let multisig = channel.multisig_address();
        store.set(channel).await.unwrap();
        assert_ne!(empty, store.snapshot().await.unwrap());
        assert!(store.channel_between(&Address::new([2u8; 20]), &Address::new([1u8; 20]))
            .await
            .unwrap()
            .is_some_and(|c| c.multisig_address() == multisig));
    }
}
