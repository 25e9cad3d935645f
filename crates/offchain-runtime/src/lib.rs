//! Off-chain Runtime Engine
//!
//! This crate runs the protocols `offchain-core` defines:
//! - `Node`: the request surface of one party, and where inbound messages land
//! - `InstructionExecutor`: walks a role's instructions, suspending on replies
//! - Channel lock and reply routing managers
//! - In-memory store and message network for tests and local setups
//!
//! `offchain-core` stays free of I/O; everything async lives here.

pub mod builder;
pub mod executor;
pub mod managers;
pub mod node;
pub mod store;
pub mod transport;

pub use builder::NodeBuilder;
pub use executor::{DeferredSend, ExecutedRun, InstructionExecutor};
pub use managers::*;
pub use node::Node;
pub use store::MemoryStore;
pub use transport::{Inbox, MemoryNetwork};

// Re-export core types for convenience
pub use offchain_core::{
    Address, AppInstance, AppInstanceProposal, Bytes, Bytes32, CommitmentKey, EngineConfig,
    FreeBalanceState, Ledger, Messenger, OffchainError, OffchainResult, ProposalTerms,
    ProtocolMessage, SignedCommitment, SigningKeyPair, StateChannel, Store, Transaction, U256,
};
