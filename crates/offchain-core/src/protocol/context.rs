//! Protocol run context
//!
//! The working copy a single run mutates. Nothing in here is durable: the
//! caller loads the channels in, and only a completed run's
//! [`ProtocolOutcome`] is handed back for persistence.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::apps::AppRegistry;
use crate::commitment::{
    Commitment, CommitmentKey, CommitmentKind, SignedCommitment, SignerCapacity,
};
use crate::config::{ChannelDefaults, NetworkContext};
use crate::crypto::{Signature, SigningKeyPair};
use crate::errors::{OffchainError, Result, SignatureError, ValidationError};
use crate::model::StateChannel;
use crate::protocol::params::ProtocolParams;
use crate::protocol::{ProtocolName, Role, RoleFlow, SigRef};
use crate::types::{Address, U256};

// ----------------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------------

/// Read-only collaborators of a run
#[derive(Debug, Clone, Copy)]
pub struct ProtocolEnvironment<'a> {
    /// Local party
    pub me: Address,
    pub network: &'a NetworkContext,
    pub channel: &'a ChannelDefaults,
    pub apps: &'a AppRegistry,
}

/// How a run names a channel it needs before it has loaded it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Multisig(Address),
    /// The direct channel owned by both parties
    Between(Address, Address),
}

/// Commitment fixed for one signing slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommitment {
    pub key: CommitmentKey,
    pub commitment: Commitment,
    /// Standing intermediary signature of a virtual app, reused across updates
    pub intermediary_signature: Option<Signature>,
}

impl PendingCommitment {
    pub fn new(key: CommitmentKey, commitment: Commitment) -> Self {
        Self {
            key,
            commitment,
            intermediary_signature: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Context
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Context {
    pub process_id: Uuid,
    pub params: ProtocolParams,
    pub role: Role,
    channels: BTreeMap<Address, StateChannel>,
    slots: BTreeMap<usize, PendingCommitment>,
    signatures: BTreeMap<(usize, Address), Signature>,
    written: Vec<SignedCommitment>,
    /// Ledger balances read before the run, keyed by `(holder, token)`
    ledger_balances: BTreeMap<(Address, Address), U256>,
}

impl Context {
    pub fn new(
        process_id: Uuid,
        params: ProtocolParams,
        role: Role,
        channels: impl IntoIterator<Item = StateChannel>,
    ) -> Self {
        Self {
            process_id,
            params,
            role,
            channels: channels
                .into_iter()
                .map(|c| (c.multisig_address(), c))
                .collect(),
            slots: BTreeMap::new(),
            signatures: BTreeMap::new(),
            written: Vec::new(),
            ledger_balances: BTreeMap::new(),
        }
    }

    pub fn protocol(&self) -> ProtocolName {
        self.params.protocol()
    }

    pub fn flow(&self) -> Result<&'static RoleFlow> {
        self.protocol().definition().flow(self.role).ok_or_else(|| {
            OffchainError::invalid_params(format!("{} has no {} role", self.protocol(), self.role))
        })
    }

    pub fn address_of(&self, role: Role) -> Result<Address> {
        self.params.address_of(role)
    }

    // ------------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------------

    pub fn has_channel(&self, multisig: &Address) -> bool {
        self.channels.contains_key(multisig)
    }

    pub fn channel(&self, multisig: &Address) -> Result<&StateChannel> {
        self.channels
            .get(multisig)
            .ok_or_else(|| OffchainError::channel_not_found(multisig))
    }

    pub fn channel_mut(&mut self, multisig: &Address) -> Result<&mut StateChannel> {
        self.channels
            .get_mut(multisig)
            .ok_or_else(|| OffchainError::channel_not_found(multisig))
    }

    pub fn insert_channel(&mut self, channel: StateChannel) {
        self.channels.insert(channel.multisig_address(), channel);
    }

    /// Direct channel at `multisig`, checked to be owned by exactly `parties`
    pub fn direct_channel_mut(
        &mut self,
        multisig: &Address,
        parties: [Address; 2],
    ) -> Result<&mut StateChannel> {
        if parties[0] == parties[1] {
            return Err(OffchainError::invalid_params(
                "initiator and responder must differ",
            ));
        }
        let channel = self.channel_mut(multisig)?;
        if let Some(stranger) = parties.iter().find(|p| !channel.has_owner(p)) {
            return Err(ValidationError::NotParticipant {
                identifier: stranger.to_string(),
                context: multisig.to_string(),
            }
            .into());
        }
        Ok(channel)
    }

    /// Address of the loaded direct channel owned by `a` and `b`
    pub fn channel_between(&self, a: &Address, b: &Address) -> Result<Address> {
        self.channels
            .values()
            .find(|c| !c.is_virtual() && c.has_owner(a) && c.has_owner(b))
            .map(StateChannel::multisig_address)
            .ok_or_else(|| {
                ValidationError::NoChannelBetween {
                    first: a.to_string(),
                    second: b.to_string(),
                }
                .into()
            })
    }

    pub fn channels(&self) -> impl Iterator<Item = &StateChannel> {
        self.channels.values()
    }

    // ------------------------------------------------------------------------
    // Ledger Observations
    // ------------------------------------------------------------------------

    /// Record what `holder` held of `token` on the ledger when the run began
    pub fn observe_ledger_balance(&mut self, holder: Address, token: Address, balance: U256) {
        self.ledger_balances.insert((holder, token), balance);
    }

    pub fn ledger_balance(&self, holder: &Address, token: &Address) -> Option<U256> {
        self.ledger_balances.get(&(*holder, *token)).copied()
    }

    // ------------------------------------------------------------------------
    // Slots and Signatures
    // ------------------------------------------------------------------------

    pub fn set_commitment(&mut self, slot: usize, pending: PendingCommitment) {
        self.slots.insert(slot, pending);
    }

    pub fn commitment(&self, slot: usize) -> Result<&PendingCommitment> {
        self.slots.get(&slot).ok_or_else(|| {
            OffchainError::invalid_params(format!(
                "{} has no commitment in slot {slot}",
                self.protocol()
            ))
        })
    }

    /// The intermediary signs a virtual app's set-state in its own capacity
    /// and every other commitment as an ordinary owner.
    fn capacity(&self, slot: usize, signer: Role) -> Result<SignerCapacity> {
        let kind = self.commitment(slot)?.commitment.kind();
        Ok(match (signer, kind) {
            (Role::Intermediary, CommitmentKind::VirtualAppSetState) => {
                SignerCapacity::Intermediary
            }
            _ => SignerCapacity::Party,
        })
    }

    /// Sign `slot` with the local key
    pub fn sign(
        &mut self,
        slot: usize,
        key: &SigningKeyPair,
        capacity: SignerCapacity,
    ) -> Result<()> {
        let signature = self.commitment(slot)?.commitment.sign(key, capacity)?;
        self.signatures.insert((slot, key.address()), signature);
        Ok(())
    }

    /// Check received signatures against the slots they claim and keep them
    pub fn absorb(&mut self, refs: &[SigRef], signatures: &[Signature]) -> Result<()> {
        if refs.len() != signatures.len() {
            return Err(SignatureError::CountMismatch {
                expected: refs.len(),
                actual: signatures.len(),
            }
            .into());
        }
        for (sig_ref, signature) in refs.iter().zip(signatures) {
            let signer = self.address_of(sig_ref.signer)?;
            let capacity = self.capacity(sig_ref.slot, sig_ref.signer)?;
            self.commitment(sig_ref.slot)?
                .commitment
                .verify_signature(&signer, capacity, signature)?;
            self.signatures.insert((sig_ref.slot, signer), *signature);
        }
        Ok(())
    }

    pub fn signature(&self, sig_ref: SigRef) -> Result<Signature> {
        let signer = self.address_of(sig_ref.signer)?;
        self.signatures
            .get(&(sig_ref.slot, signer))
            .copied()
            .ok_or_else(|| {
                SignatureError::Missing {
                    slot: sig_ref.slot,
                    signer: signer.to_string(),
                }
                .into()
            })
    }

    /// Signatures to put on an outgoing message, in `refs` order
    pub fn carry(&self, refs: &[SigRef]) -> Result<Vec<Signature>> {
        refs.iter().map(|r| self.signature(*r)).collect()
    }

    /// Assemble the signatures gathered for `slot` into a signed commitment
    pub fn write(&mut self, slot: usize) -> Result<&SignedCommitment> {
        let pending = self.commitment(slot)?;
        let lookup = |signer: &Address| {
            self.signatures.get(&(slot, *signer)).copied().ok_or_else(|| {
                OffchainError::from(SignatureError::Missing {
                    slot,
                    signer: signer.to_string(),
                })
            })
        };
        let parties = pending
            .commitment
            .signers()
            .iter()
            .map(lookup)
            .collect::<Result<Vec<_>>>()?;
        let intermediary = match pending.commitment.intermediary() {
            Some(intermediary) => Some(
                lookup(&intermediary)
                    .or_else(|err| pending.intermediary_signature.ok_or(err))?,
            ),
            None => None,
        };
        let signed = pending
            .commitment
            .finalize(pending.key, &parties, intermediary.as_ref())?;
        self.written.push(signed);
        self.written
            .last()
            .ok_or_else(|| OffchainError::invalid_params("no commitment written"))
    }

    pub fn written(&self) -> &[SignedCommitment] {
        &self.written
    }

    pub fn into_outcome(self) -> ProtocolOutcome {
        ProtocolOutcome {
            protocol: self.params.protocol(),
            process_id: self.process_id,
            role: self.role,
            channels: self.channels.into_values().collect(),
            commitments: self.written,
        }
    }
}

// ----------------------------------------------------------------------------
// Outcome
// ----------------------------------------------------------------------------

/// Result of a completed run, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutcome {
    pub protocol: ProtocolName,
    pub process_id: Uuid,
    pub role: Role,
    pub channels: Vec<StateChannel>,
    pub commitments: Vec<SignedCommitment>,
}

impl ProtocolOutcome {
    pub fn channel(&self, multisig: &Address) -> Option<&StateChannel> {
        self.channels
            .iter()
            .find(|c| c.multisig_address() == *multisig)
    }

    pub fn commitment(&self, key: &CommitmentKey) -> Option<&SignedCommitment> {
        self.commitments.iter().find(|c| c.key == *key)
    }

    pub fn multisig_addresses(&self) -> Vec<Address> {
        self.channels.iter().map(StateChannel::multisig_address).collect()
    }
}
