//! App instance proposals
//!
//! A proposal is an app instance not yet accepted by the counterparty. Its
//! identity hash is the identity hash the installed app will have, so the
//! sequence number it reserves is consumed whether it is installed or not.

use serde::{Deserialize, Serialize};

use crate::model::app_instance::{AppIdentity, AppInstance, AppInterface};
use crate::model::outcome::{CoinTransfer, InterpreterParams, OutcomeType};
use crate::types::{Address, Bytes, Bytes32, U256};

/// What the proposer asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalTerms {
    pub app_interface: AppInterface,
    pub initial_state: Bytes,
    pub initiator_deposit: U256,
    pub responder_deposit: U256,
    /// Token both deposits are made in
    pub token: Address,
    pub default_timeout: u64,
    pub outcome_type: OutcomeType,
    /// Payout cap for coin-transfer outcomes, the total deposit when unset
    #[serde(default)]
    pub interpreter_limit: Option<U256>,
}

/// A proposed, not yet installed, app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstanceProposal {
    pub identity_hash: Bytes32,
    pub multisig_address: Address,
    pub app_seq_no: u64,
    pub proposed_by: Address,
    pub proposed_to: Address,
    pub intermediary: Option<Address>,
    pub terms: ProposalTerms,
}

impl AppInstanceProposal {
    /// Build a proposal for app sequence number `app_seq_no` in a channel
    /// owned by `owners`.
    pub fn new(
        multisig_address: Address,
        owners: &[Address],
        app_seq_no: u64,
        proposed_by: Address,
        proposed_to: Address,
        terms: ProposalTerms,
    ) -> Self {
        let mut proposal = Self {
            identity_hash: Bytes32::ZERO,
            multisig_address,
            app_seq_no,
            proposed_by,
            proposed_to,
            intermediary: None,
            terms,
        };
        proposal.identity_hash = proposal.identity(owners).identity_hash();
        proposal
    }

    /// Identity the installed app will have
    pub fn identity(&self, owners: &[Address]) -> AppIdentity {
        let mut participants = owners.to_vec();
        participants.sort();
        AppIdentity {
            owner: self.multisig_address,
            participants,
            app_definition: self.terms.app_interface.addr,
            default_timeout: self.terms.default_timeout,
            channel_nonce: self.app_seq_no,
        }
    }

    /// Combined deposit of both parties
    pub fn total_deposit(&self) -> U256 {
        self.terms.initiator_deposit + self.terms.responder_deposit
    }

    /// Amounts debited from the free balance on install
    pub fn deposits(&self) -> Vec<CoinTransfer> {
        vec![
            CoinTransfer::new(self.proposed_by, self.terms.initiator_deposit),
            CoinTransfer::new(self.proposed_to, self.terms.responder_deposit),
        ]
    }

    pub fn interpreter_params(&self) -> InterpreterParams {
        match self.terms.outcome_type {
            OutcomeType::CoinTransfer => InterpreterParams::CoinTransfer {
                limit: self.terms.interpreter_limit.unwrap_or_else(|| self.total_deposit()),
                token: self.terms.token,
            },
            OutcomeType::TwoPartyFixed => InterpreterParams::TwoPartyFixed {
                player_addrs: [self.proposed_by, self.proposed_to],
                amount: self.total_deposit(),
                token: self.terms.token,
            },
        }
    }

    /// The app this proposal installs as, at version 0
    pub fn to_app_instance(&self, owners: &[Address]) -> AppInstance {
        AppInstance::new(
            self.identity(owners),
            self.terms.app_interface.clone(),
            self.terms.initial_state.clone(),
            self.interpreter_params(),
        )
    }
}
