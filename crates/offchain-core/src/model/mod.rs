//! Channel and app-instance data model
//!
//! - `state_channel`: channels, owners, and the mutators that move them forward
//! - `app_instance`: installed apps and their identity
//! - `free_balance`: per-owner uncommitted balances
//! - `proposal`: proposed but not yet installed apps
//! - `agreement`: intermediary agreements backing virtual apps
//! - `outcome`: outcome types and interpreter parameters

pub mod agreement;
pub mod app_instance;
pub mod free_balance;
pub mod outcome;
pub mod proposal;
pub mod state_channel;

pub use agreement::VirtualAppAgreement;
pub use app_instance::{AppIdentity, AppInstance, AppInterface};
pub use free_balance::{FreeBalance, FreeBalanceState, FREE_BALANCE_SEQ_NO};
pub use outcome::{
    AssetType, CoinTransfer, InterpreterParams, Outcome, OutcomeType, Terms, TwoPartyFixedOutcome,
};
pub use proposal::{AppInstanceProposal, ProposalTerms};
pub use state_channel::{multisig_address_for, virtual_channel_key, StateChannel};
