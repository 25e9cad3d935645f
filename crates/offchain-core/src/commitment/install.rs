//! Install commitment
//!
//! Moves the free balance to its post-install state and conditionally
//! transfers the app's locked funds according to the app's outcome, bounded
//! by the resolution terms.

use crate::abi::{self, Token};
use crate::commitment::multisig::MultisigCall;
use crate::commitment::{Operation, Transaction};
use crate::config::NetworkContext;
use crate::model::{AppInstance, StateChannel, Terms};
use crate::signatures::AggregatedSignature;
use crate::types::{Address, Bytes32, U256};

const INSTALL_APP: &str =
    "installApp(bytes32,bytes32,uint256,uint256,bytes32,address,(uint8,uint256,address),bytes)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommitment {
    pub multisig: Address,
    pub owners: Vec<Address>,
    pub delegate_target: Address,
    pub free_balance_identity_hash: Bytes32,
    pub free_balance_state_hash: Bytes32,
    pub free_balance_version: u64,
    pub free_balance_timeout: u64,
    pub app_identity_hash: Bytes32,
    pub interpreter: Address,
    pub terms: Terms,
    pub interpreter_params: Vec<u8>,
}

impl InstallCommitment {
    /// Commitment for `app` against the channel's post-install free balance
    pub fn for_app(channel: &StateChannel, app: &AppInstance, network: &NetworkContext) -> Self {
        let free_balance = channel.free_balance().instance();
        let params = app.interpreter_params();
        Self {
            multisig: channel.multisig_address(),
            owners: channel.owners().to_vec(),
            delegate_target: network.conditional_transaction_delegate_target,
            free_balance_identity_hash: free_balance.identity_hash(),
            free_balance_state_hash: free_balance.state_hash(),
            free_balance_version: free_balance.version_number(),
            free_balance_timeout: free_balance.timeout(),
            app_identity_hash: app.identity_hash(),
            interpreter: network.interpreter_for(params.outcome_type()),
            terms: params.terms(),
            interpreter_params: params.encode(),
        }
    }

    fn call(&self) -> MultisigCall {
        MultisigCall {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to: self.delegate_target,
            value: U256::zero(),
            data: abi::encode_call(
                INSTALL_APP,
                &[
                    Token::FixedBytes(self.free_balance_identity_hash),
                    Token::FixedBytes(self.free_balance_state_hash),
                    Token::uint(self.free_balance_version),
                    Token::uint(self.free_balance_timeout),
                    Token::FixedBytes(self.app_identity_hash),
                    Token::Address(self.interpreter),
                    self.terms.to_token(),
                    Token::Bytes(self.interpreter_params.clone()),
                ],
            ),
            operation: Operation::DelegateCall,
        }
    }
}

pub fn digest(commitment: &InstallCommitment) -> Bytes32 {
    commitment.call().digest()
}

pub fn transaction(commitment: &InstallCommitment, signatures: &AggregatedSignature) -> Transaction {
    commitment.call().transaction(signatures)
}
