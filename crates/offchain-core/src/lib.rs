//! Off-chain State Channel Protocol Engine
//!
//! This crate provides the data model, commitment construction, protocol
//! definitions and state transitions of a two-party state channel engine
//! with intermediated (virtual) apps. It performs no I/O: storage,
//! messaging and the settlement ledger are traits implemented by the
//! runtime or the embedding application.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod abi;
pub mod apps;
pub mod commitment;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod ledger;
pub mod messaging;
pub mod model;
pub mod protocol;
pub mod signatures;
pub mod store;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use apps::{AppLogic, AppRegistry, BalanceRefundApp};
pub use commitment::{
    Commitment, CommitmentKey, CommitmentKind, Operation, SignedCommitment, SignerCapacity,
    Transaction,
};
pub use config::{ChannelDefaults, EngineConfig, NetworkContext, PersistenceConfig, ProtocolTimeouts};
pub use crypto::{keccak256, Signature, SigningKeyPair};
pub use errors::{OffchainError, OffchainResult, Result};
pub use ledger::Ledger;
pub use messaging::Messenger;
pub use model::{
    AppInstance, AppInstanceProposal, CoinTransfer, FreeBalanceState, OutcomeType, ProposalTerms,
    StateChannel, VirtualAppAgreement,
};
pub use protocol::{
    Context, ProtocolEnvironment, ProtocolName, ProtocolOutcome, ProtocolParams, Role,
    UNASSIGNED_SEQ_NO,
};
pub use store::Store;
pub use types::{Address, Bytes, Bytes32, U256};
pub use wire::ProtocolMessage;
