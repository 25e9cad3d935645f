//! State channels
//!
//! One `StateChannel` exists per multisig wallet. Owners are kept sorted
//! ascending by address and the free balance is never removed. Apart from
//! the constructors, all changes go through the mutators below, each of
//! which either applies completely or leaves the channel untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{self, Token};
use crate::crypto::keccak256;
use crate::errors::{OffchainError, Result, StateTransitionError, ValidationError};
use crate::model::agreement::VirtualAppAgreement;
use crate::model::app_instance::AppInstance;
use crate::model::free_balance::{FreeBalance, FREE_BALANCE_SEQ_NO};
use crate::model::outcome::CoinTransfer;
use crate::model::proposal::{AppInstanceProposal, ProposalTerms};
use crate::types::{Address, Bytes, Bytes32, U256};

// ----------------------------------------------------------------------------
// Address Derivation
// ----------------------------------------------------------------------------

/// CREATE2 address of the multisig proxy for `owners`.
///
/// The salt commits to the sorted owners and a caller-chosen nonce so both
/// parties derive the same address without talking to the ledger.
pub fn multisig_address_for(
    owners: &[Address],
    nonce: u64,
    proxy_factory: &Address,
    proxy_code_hash: &Bytes32,
) -> Address {
    let mut sorted = owners.to_vec();
    sorted.sort();
    let salt = keccak256(&abi::encode(&[
        Token::Array(sorted.into_iter().map(Token::Address).collect()),
        Token::uint(nonce),
    ]));
    let mut preimage = Vec::with_capacity(85);
    preimage.push(0xff);
    preimage.extend_from_slice(proxy_factory.as_bytes());
    preimage.extend_from_slice(salt.as_bytes());
    preimage.extend_from_slice(proxy_code_hash.as_bytes());
    Address::from_word(&keccak256(&preimage))
}

/// Key of the virtual channel between two parties via one intermediary
pub fn virtual_channel_key(parties: &[Address; 2], intermediary: &Address) -> Address {
    let mut sorted = *parties;
    sorted.sort();
    Address::from_word(&keccak256(&abi::encode_packed(&[
        Token::Address(sorted[0]),
        Token::Address(sorted[1]),
        Token::Address(*intermediary),
    ])))
}

// ----------------------------------------------------------------------------
// State Channel
// ----------------------------------------------------------------------------

/// Persisted state of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChannel {
    multisig_address: Address,
    owners: Vec<Address>,
    free_balance: FreeBalance,
    app_instances: BTreeMap<Bytes32, AppInstance>,
    proposals: BTreeMap<Bytes32, AppInstanceProposal>,
    agreements: BTreeMap<Bytes32, VirtualAppAgreement>,
    next_app_seq_no: u64,
    /// Intermediary for a virtual channel, which has no multisig behind it
    intermediary: Option<Address>,
}

impl StateChannel {
    /// New direct channel with a zero free balance at version 0
    pub fn setup(
        multisig_address: Address,
        owners: [Address; 2],
        free_balance_app: Address,
        free_balance_timeout: u64,
    ) -> Result<Self> {
        if owners[0] == owners[1] {
            return Err(ValidationError::InvalidOwners {
                reason: "a channel needs two distinct owners".into(),
            }
            .into());
        }
        let mut owners = owners.to_vec();
        owners.sort();
        let free_balance = FreeBalance::new(
            multisig_address,
            &owners,
            free_balance_app,
            free_balance_timeout,
        );
        Ok(Self {
            multisig_address,
            owners,
            free_balance,
            app_instances: BTreeMap::new(),
            proposals: BTreeMap::new(),
            agreements: BTreeMap::new(),
            next_app_seq_no: FREE_BALANCE_SEQ_NO + 1,
            intermediary: None,
        })
    }

    /// New virtual channel between `parties`, keyed by [`virtual_channel_key`]
    pub fn new_virtual(
        parties: [Address; 2],
        intermediary: Address,
        free_balance_app: Address,
        free_balance_timeout: u64,
    ) -> Result<Self> {
        let key = virtual_channel_key(&parties, &intermediary);
        let mut channel = Self::setup(key, parties, free_balance_app, free_balance_timeout)?;
        channel.intermediary = Some(intermediary);
        Ok(channel)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn multisig_address(&self) -> Address {
        self.multisig_address
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn has_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    /// The owner that is not `me`
    pub fn counterparty_of(&self, me: &Address) -> Result<Address> {
        if !self.has_owner(me) {
            return Err(ValidationError::NotParticipant {
                identifier: me.to_string(),
                context: self.multisig_address.to_string(),
            }
            .into());
        }
        self.owners
            .iter()
            .find(|o| *o != me)
            .copied()
            .ok_or_else(|| OffchainError::invalid_params("channel has a single owner"))
    }

    pub fn free_balance(&self) -> &FreeBalance {
        &self.free_balance
    }

    pub fn app_instances(&self) -> impl Iterator<Item = &AppInstance> {
        self.app_instances.values()
    }

    pub fn app_instance(&self, identity_hash: &Bytes32) -> Result<&AppInstance> {
        self.app_instances
            .get(identity_hash)
            .ok_or_else(|| OffchainError::app_not_found(identity_hash))
    }

    pub fn has_app_instance(&self, identity_hash: &Bytes32) -> bool {
        self.app_instances.contains_key(identity_hash)
    }

    pub fn proposals(&self) -> impl Iterator<Item = &AppInstanceProposal> {
        self.proposals.values()
    }

    pub fn proposal(&self, identity_hash: &Bytes32) -> Result<&AppInstanceProposal> {
        self.proposals
            .get(identity_hash)
            .ok_or_else(|| OffchainError::proposal_not_found(identity_hash))
    }

    pub fn agreement(&self, target_identity_hash: &Bytes32) -> Result<&VirtualAppAgreement> {
        self.agreements.get(target_identity_hash).ok_or_else(|| {
            StateTransitionError::Agreement {
                identity_hash: target_identity_hash.to_string(),
                reason: "not present".into(),
            }
            .into()
        })
    }

    pub fn agreements(&self) -> impl Iterator<Item = &VirtualAppAgreement> {
        self.agreements.values()
    }

    pub fn next_app_seq_no(&self) -> u64 {
        self.next_app_seq_no
    }

    pub fn is_virtual(&self) -> bool {
        self.intermediary.is_some()
    }

    pub fn intermediary(&self) -> Option<Address> {
        self.intermediary
    }

    // ------------------------------------------------------------------------
    // Proposals
    // ------------------------------------------------------------------------

    /// Record a proposal under the next app sequence number
    pub fn propose(
        &mut self,
        proposed_by: Address,
        proposed_to: Address,
        terms: ProposalTerms,
    ) -> Result<AppInstanceProposal> {
        for party in [&proposed_by, &proposed_to] {
            if !self.has_owner(party) {
                return Err(ValidationError::NotParticipant {
                    identifier: party.to_string(),
                    context: self.multisig_address.to_string(),
                }
                .into());
            }
        }
        let proposal = AppInstanceProposal::new(
            self.multisig_address,
            &self.owners,
            self.next_app_seq_no,
            proposed_by,
            proposed_to,
            terms,
        );
        if self.proposals.contains_key(&proposal.identity_hash) {
            return Err(StateTransitionError::DuplicateProposal {
                identity_hash: proposal.identity_hash.to_string(),
            }
            .into());
        }
        self.next_app_seq_no += 1;
        self.proposals
            .insert(proposal.identity_hash, proposal.clone());
        Ok(proposal)
    }

    /// Drop a proposal without installing it
    pub fn remove_proposal(&mut self, identity_hash: &Bytes32) -> Result<AppInstanceProposal> {
        self.proposals
            .remove(identity_hash)
            .ok_or_else(|| OffchainError::proposal_not_found(identity_hash))
    }

    // ------------------------------------------------------------------------
    // App Lifecycle
    // ------------------------------------------------------------------------

    /// Promote a proposal to an installed app, funding it from the free
    /// balance. The proposal is consumed.
    pub fn install(&mut self, identity_hash: &Bytes32) -> Result<AppInstance> {
        if self.app_instances.contains_key(identity_hash) {
            return Err(StateTransitionError::AlreadyInstalled {
                identity_hash: identity_hash.to_string(),
            }
            .into());
        }
        let proposal = self.proposal(identity_hash)?.clone();
        let app = proposal.to_app_instance(&self.owners);

        let mut next = self.free_balance.state().clone();
        next.decrement(&proposal.terms.token, &proposal.deposits())?;
        next.add_active_app(app.identity_hash());

        self.free_balance.apply(next);
        self.proposals.remove(identity_hash);
        self.app_instances.insert(app.identity_hash(), app.clone());
        debug!(multisig = %self.multisig_address, app = %app.identity_hash(), "installed app");
        Ok(app)
    }

    /// Remove an app and credit `payouts` to the free balance
    pub fn uninstall(
        &mut self,
        identity_hash: &Bytes32,
        payouts: &[CoinTransfer],
    ) -> Result<AppInstance> {
        let app = self
            .app_instances
            .get(identity_hash)
            .ok_or_else(|| StateTransitionError::NotInstalled {
                identity_hash: identity_hash.to_string(),
            })?
            .clone();
        self.ensure_owners(payouts)?;

        let mut next = self.free_balance.state().clone();
        next.increment(&app.interpreter_params().token(), payouts);
        next.remove_active_app(identity_hash);

        self.free_balance.apply(next);
        self.app_instances.remove(identity_hash);
        debug!(multisig = %self.multisig_address, app = %identity_hash, "uninstalled app");
        Ok(app)
    }

    /// Move an app to `new_state` at its next version
    pub fn update_state(&mut self, identity_hash: &Bytes32, new_state: Bytes) -> Result<&AppInstance> {
        let current = self
            .app_instances
            .get(identity_hash)
            .ok_or_else(|| StateTransitionError::NotInstalled {
                identity_hash: identity_hash.to_string(),
            })?;
        let next = current.set_state(new_state);
        self.app_instances.insert(*identity_hash, next);
        self.app_instance(identity_hash)
    }

    /// Debit `amount` of `token` from `owner` for an on-chain withdrawal
    pub fn withdraw(&mut self, owner: &Address, token: &Address, amount: U256) -> Result<()> {
        let mut next = self.free_balance.state().clone();
        next.decrement(token, &[CoinTransfer::new(*owner, amount)])?;
        self.free_balance.apply(next);
        Ok(())
    }

    fn ensure_owners(&self, payouts: &[CoinTransfer]) -> Result<()> {
        match payouts.iter().find(|p| !self.has_owner(&p.to)) {
            Some(stranger) => Err(ValidationError::NotParticipant {
                identifier: stranger.to.to_string(),
                context: self.multisig_address.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Virtual Apps
    // ------------------------------------------------------------------------

    /// Host a virtual app in this virtual channel, consuming the next
    /// sequence number. Funding lives in the agreements, not here.
    pub fn install_virtual_app(&mut self, app: AppInstance) -> Result<()> {
        if app.identity().channel_nonce != self.next_app_seq_no {
            return Err(StateTransitionError::SequenceMismatch {
                expected: self.next_app_seq_no,
                actual: app.identity().channel_nonce,
            }
            .into());
        }
        if self.app_instances.contains_key(&app.identity_hash()) {
            return Err(StateTransitionError::AlreadyInstalled {
                identity_hash: app.identity_hash().to_string(),
            }
            .into());
        }
        self.next_app_seq_no += 1;
        self.app_instances.insert(app.identity_hash(), app);
        Ok(())
    }

    /// Remove a virtual app; its payouts settle through the agreements
    pub fn remove_virtual_app(&mut self, identity_hash: &Bytes32) -> Result<AppInstance> {
        self.app_instances.remove(identity_hash).ok_or_else(|| {
            StateTransitionError::NotInstalled {
                identity_hash: identity_hash.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn app_instance_mut(&mut self, identity_hash: &Bytes32) -> Result<&mut AppInstance> {
        self.app_instances
            .get_mut(identity_hash)
            .ok_or_else(|| OffchainError::app_not_found(identity_hash))
    }

    /// Lock funds for a virtual app agreement
    pub fn install_agreement(&mut self, agreement: VirtualAppAgreement) -> Result<()> {
        let target = agreement.target_identity_hash;
        if self.agreements.contains_key(&target) {
            return Err(StateTransitionError::Agreement {
                identity_hash: target.to_string(),
                reason: "already present".into(),
            }
            .into());
        }
        self.ensure_owners(&agreement.debits())?;
        let mut next = self.free_balance.state().clone();
        next.decrement(&agreement.token, &agreement.debits())?;
        next.add_active_app(target);
        self.free_balance.apply(next);
        self.agreements.insert(target, agreement);
        Ok(())
    }

    /// Release an agreement, splitting its total per the virtual app's payouts
    pub fn uninstall_agreement(
        &mut self,
        target_identity_hash: &Bytes32,
        payouts: &[CoinTransfer],
    ) -> Result<VirtualAppAgreement> {
        let agreement = self.agreement(target_identity_hash)?.clone();
        let mut next = self.free_balance.state().clone();
        next.increment(&agreement.token, &agreement.settle(payouts));
        next.remove_active_app(target_identity_hash);
        self.free_balance.apply(next);
        self.agreements.remove(target_identity_hash);
        Ok(agreement)
    }
}
