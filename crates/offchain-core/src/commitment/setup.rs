//! Setup commitment
//!
//! Signed once when a channel is created. It lets either owner have the
//! multisig pay out according to the free balance if the other disappears.

use crate::abi::{self, Token};
use crate::commitment::multisig::MultisigCall;
use crate::commitment::{Operation, Transaction};
use crate::config::NetworkContext;
use crate::model::{OutcomeType, StateChannel};
use crate::signatures::AggregatedSignature;
use crate::types::{Address, Bytes32, U256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupCommitment {
    pub multisig: Address,
    pub owners: Vec<Address>,
    pub delegate_target: Address,
    pub app_registry: Address,
    pub free_balance_identity_hash: Bytes32,
    pub interpreter: Address,
}

impl SetupCommitment {
    pub fn for_channel(channel: &StateChannel, network: &NetworkContext) -> Self {
        Self {
            multisig: channel.multisig_address(),
            owners: channel.owners().to_vec(),
            delegate_target: network.conditional_transaction_delegate_target,
            app_registry: network.app_registry,
            free_balance_identity_hash: channel.free_balance().identity_hash(),
            interpreter: network.interpreter_for(OutcomeType::CoinTransfer),
        }
    }

    fn call(&self) -> MultisigCall {
        MultisigCall {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to: self.delegate_target,
            value: U256::zero(),
            data: abi::encode_call(
                "executeEffectOfFreeBalance(address,bytes32,address)",
                &[
                    Token::Address(self.app_registry),
                    Token::FixedBytes(self.free_balance_identity_hash),
                    Token::Address(self.interpreter),
                ],
            ),
            operation: Operation::DelegateCall,
        }
    }
}

pub fn digest(commitment: &SetupCommitment) -> Bytes32 {
    commitment.call().digest()
}

pub fn transaction(commitment: &SetupCommitment, signatures: &AggregatedSignature) -> Transaction {
    commitment.call().transaction(signatures)
}
