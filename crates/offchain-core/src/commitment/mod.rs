//! Commitments
//!
//! A commitment is an on-chain transaction that a set of off-chain
//! signatures authorizes. Each kind defines the digest its signers sign and
//! the transaction those signatures unlock. Nothing here is broadcast; the
//! signed transaction is only submitted if a dispute forces it.
//!
//! - `multisig`: the shared `execTransaction` envelope and digest
//! - `setup`: free-balance payout on channel creation
//! - `install`: conditional transfer of an installed app's locked funds
//! - `set_state`: app state registered with the app registry
//! - `virtual_app`: virtual app set-state and intermediary agreements
//! - `withdraw`: direct payout from the multisig

pub mod install;
pub mod multisig;
pub mod set_state;
pub mod setup;
pub mod virtual_app;
pub mod withdraw;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{Signature, SigningKeyPair};
use crate::errors::{OffchainError, Result, SignatureError};
use crate::signatures::{self, AggregatedSignature};
use crate::types::{Address, Bytes, Bytes32, U256};

pub use install::InstallCommitment;
pub use multisig::{decode_exec_transaction, DecodedExecTransaction, MultisigCall};
pub use set_state::SetStateCommitment;
pub use setup::SetupCommitment;
pub use virtual_app::{VirtualAppAgreementCommitment, VirtualAppSetStateCommitment};
pub use withdraw::WithdrawCommitment;

/// EIP-191 version byte every signed digest starts with
pub const EIP191_PREFIX: u8 = 0x19;

// ----------------------------------------------------------------------------
// Transactions
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operation {
    Call = 0,
    DelegateCall = 1,
}

/// A ledger transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
}

// ----------------------------------------------------------------------------
// Commitment
// ----------------------------------------------------------------------------

/// Which digest a signer signs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerCapacity {
    /// Channel owner or app participant
    Party,
    /// Intermediary of a virtual app
    Intermediary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitmentKind {
    Setup,
    Install,
    SetState,
    VirtualAppSetState,
    VirtualAppAgreement,
    Withdraw,
}

impl fmt::Display for CommitmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitmentKind::Setup => "setup",
            CommitmentKind::Install => "install",
            CommitmentKind::SetState => "set-state",
            CommitmentKind::VirtualAppSetState => "virtual-app-set-state",
            CommitmentKind::VirtualAppAgreement => "virtual-app-agreement",
            CommitmentKind::Withdraw => "withdraw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commitment {
    Setup(SetupCommitment),
    Install(InstallCommitment),
    SetState(SetStateCommitment),
    VirtualAppSetState(VirtualAppSetStateCommitment),
    VirtualAppAgreement(VirtualAppAgreementCommitment),
    Withdraw(WithdrawCommitment),
}

impl Commitment {
    pub fn kind(&self) -> CommitmentKind {
        match self {
            Commitment::Setup(_) => CommitmentKind::Setup,
            Commitment::Install(_) => CommitmentKind::Install,
            Commitment::SetState(_) => CommitmentKind::SetState,
            Commitment::VirtualAppSetState(_) => CommitmentKind::VirtualAppSetState,
            Commitment::VirtualAppAgreement(_) => CommitmentKind::VirtualAppAgreement,
            Commitment::Withdraw(_) => CommitmentKind::Withdraw,
        }
    }

    /// Digest the parties sign
    pub fn digest(&self) -> Bytes32 {
        match self {
            Commitment::Setup(c) => setup::digest(c),
            Commitment::Install(c) => install::digest(c),
            Commitment::SetState(c) => set_state::digest(c),
            Commitment::VirtualAppSetState(c) => virtual_app::digest(c),
            Commitment::VirtualAppAgreement(c) => virtual_app::agreement_digest(c),
            Commitment::Withdraw(c) => withdraw::digest(c),
        }
    }

    pub fn digest_for(&self, capacity: SignerCapacity) -> Result<Bytes32> {
        match (capacity, self) {
            (SignerCapacity::Party, _) => Ok(self.digest()),
            (SignerCapacity::Intermediary, Commitment::VirtualAppSetState(c)) => {
                Ok(virtual_app::intermediary_digest(c))
            }
            (SignerCapacity::Intermediary, other) => Err(OffchainError::invalid_params(format!(
                "{} commitments have no intermediary signer",
                other.kind()
            ))),
        }
    }

    /// Parties whose signatures the transaction carries, sorted ascending
    pub fn signers(&self) -> &[Address] {
        match self {
            Commitment::Setup(c) => &c.owners,
            Commitment::Install(c) => &c.owners,
            Commitment::SetState(c) => c.signers(),
            Commitment::VirtualAppSetState(c) => c.signers(),
            Commitment::VirtualAppAgreement(c) => &c.owners,
            Commitment::Withdraw(c) => &c.owners,
        }
    }

    pub fn intermediary(&self) -> Option<Address> {
        match self {
            Commitment::VirtualAppSetState(c) => Some(c.intermediary),
            _ => None,
        }
    }

    /// Channel the commitment is stored under
    pub fn channel_address(&self) -> Address {
        match self {
            Commitment::Setup(c) => c.multisig,
            Commitment::Install(c) => c.multisig,
            Commitment::SetState(c) => c.identity.owner,
            Commitment::VirtualAppSetState(c) => c.identity.owner,
            Commitment::VirtualAppAgreement(c) => c.multisig,
            Commitment::Withdraw(c) => c.multisig,
        }
    }

    pub fn sign(&self, key: &SigningKeyPair, capacity: SignerCapacity) -> Result<Signature> {
        key.sign_digest(&self.digest_for(capacity)?)
    }

    /// Require `signature` to come from `signer` acting in `capacity`
    pub fn verify_signature(
        &self,
        signer: &Address,
        capacity: SignerCapacity,
        signature: &Signature,
    ) -> Result<()> {
        signatures::assert_signer(signer, &self.digest_for(capacity)?, signature)
    }

    /// Order and check the collected signatures and build the transaction
    /// they authorize.
    pub fn finalize(
        &self,
        key: CommitmentKey,
        party_signatures: &[Signature],
        intermediary_signature: Option<&Signature>,
    ) -> Result<SignedCommitment> {
        let digest = self.digest();
        let aggregate = signatures::sort_by_signer(&digest, party_signatures)?;
        signatures::verify_aggregate(&digest, &aggregate, self.signers())?;

        let (transaction, ordered) = match self {
            Commitment::Setup(c) => (setup::transaction(c, &aggregate), aggregate.signatures().to_vec()),
            Commitment::Install(c) => {
                (install::transaction(c, &aggregate), aggregate.signatures().to_vec())
            }
            Commitment::SetState(c) => {
                (set_state::transaction(c, &aggregate), aggregate.signatures().to_vec())
            }
            Commitment::VirtualAppSetState(c) => {
                let intermediary_signature =
                    intermediary_signature.ok_or_else(|| SignatureError::Missing {
                        slot: 0,
                        signer: c.intermediary.to_string(),
                    })?;
                self.verify_signature(
                    &c.intermediary,
                    SignerCapacity::Intermediary,
                    intermediary_signature,
                )?;
                let mut ordered = vec![*intermediary_signature];
                ordered.extend_from_slice(aggregate.signatures());
                (
                    virtual_app::transaction(c, &aggregate, intermediary_signature),
                    ordered,
                )
            }
            Commitment::VirtualAppAgreement(c) => (
                virtual_app::agreement_transaction(c, &aggregate),
                aggregate.signatures().to_vec(),
            ),
            Commitment::Withdraw(c) => {
                (withdraw::transaction(c, &aggregate), aggregate.signatures().to_vec())
            }
        };

        Ok(SignedCommitment {
            multisig_address: self.channel_address(),
            key,
            kind: self.kind(),
            digest,
            signatures: ordered,
            transaction,
        })
    }
}

// ----------------------------------------------------------------------------
// Signed Commitments
// ----------------------------------------------------------------------------

/// What a stored commitment authorizes within its channel. A later
/// commitment under the same key supersedes the earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommitmentKey {
    Setup,
    FreeBalance,
    Install(Bytes32),
    AppState(Bytes32),
    Agreement(Bytes32),
    Withdraw,
}

impl fmt::Display for CommitmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentKey::Setup => f.write_str("setup"),
            CommitmentKey::FreeBalance => f.write_str("free-balance"),
            CommitmentKey::Install(h) => write!(f, "install:{h}"),
            CommitmentKey::AppState(h) => write!(f, "app-state:{h}"),
            CommitmentKey::Agreement(h) => write!(f, "agreement:{h}"),
            CommitmentKey::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// A fully signed commitment as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCommitment {
    pub multisig_address: Address,
    pub key: CommitmentKey,
    pub kind: CommitmentKind,
    pub digest: Bytes32,
    /// In transaction order: intermediary first when present, then parties
    /// ascending by address
    pub signatures: Vec<Signature>,
    pub transaction: Transaction,
}

impl SignedCommitment {
    /// Party signatures as the multisig expects them
    pub fn aggregate(&self) -> AggregatedSignature {
        let parties = match self.kind {
            CommitmentKind::VirtualAppSetState => self.signatures.get(1..).unwrap_or_default(),
            _ => &self.signatures[..],
        };
        AggregatedSignature::from_ordered(parties.to_vec())
    }
}
