//! Durable storage seam
//!
//! The store owns every channel (keyed by multisig address), the proposals
//! inside them, and the signed commitments. Each operation is atomic per
//! key; [`Store::set_with_commitments`] is atomic across everything a
//! protocol run produced.

use async_trait::async_trait;

use crate::commitment::{CommitmentKey, SignedCommitment};
use crate::errors::Result;
use crate::model::{AppInstanceProposal, StateChannel};
use crate::types::{Address, Bytes32};

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, multisig: &Address) -> Result<Option<StateChannel>>;

    async fn set(&self, channel: StateChannel) -> Result<()>;

    /// Persist a protocol run's channels and commitments together
    async fn set_with_commitments(
        &self,
        channels: Vec<StateChannel>,
        commitments: Vec<SignedCommitment>,
    ) -> Result<()>;

    async fn get_proposal(&self, identity_hash: &Bytes32) -> Result<Option<AppInstanceProposal>>;

    /// Remove a proposal from whichever channel holds it
    async fn remove_proposal(&self, identity_hash: &Bytes32) -> Result<Option<AppInstanceProposal>>;

    async fn get_commitment(
        &self,
        multisig: &Address,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>>;

    async fn channels(&self) -> Result<Vec<StateChannel>>;

    /// The direct channel owned by both `a` and `b`
    async fn channel_between(&self, a: &Address, b: &Address) -> Result<Option<StateChannel>> {
        Ok(self
            .channels()
            .await?
            .into_iter()
            .find(|c| !c.is_virtual() && c.has_owner(a) && c.has_owner(b)))
    }
}
