//! Withdraw commitment
//!
//! The only commitment that pays out directly: once both owners sign, the
//! multisig transfers `amount` to `recipient` with no app outcome to resolve.

use crate::abi::{self, Token};
use crate::commitment::multisig::MultisigCall;
use crate::commitment::{Operation, Transaction};
use crate::model::StateChannel;
use crate::signatures::AggregatedSignature;
use crate::types::{Address, Bytes32, U256, ETH_TOKEN_ADDRESS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawCommitment {
    pub multisig: Address,
    pub owners: Vec<Address>,
    pub recipient: Address,
    pub amount: U256,
    pub token: Address,
}

impl WithdrawCommitment {
    pub fn for_channel(channel: &StateChannel, recipient: Address, amount: U256, token: Address) -> Self {
        Self {
            multisig: channel.multisig_address(),
            owners: channel.owners().to_vec(),
            recipient,
            amount,
            token,
        }
    }

    fn call(&self) -> MultisigCall {
        let (to, value, data) = if self.token == ETH_TOKEN_ADDRESS {
            (self.recipient, self.amount, Vec::new())
        } else {
            (
                self.token,
                U256::zero(),
                abi::encode_call(
                    "transfer(address,uint256)",
                    &[Token::Address(self.recipient), Token::Uint(self.amount)],
                ),
            )
        };
        MultisigCall {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to,
            value,
            data,
            operation: Operation::Call,
        }
    }
}

pub fn digest(commitment: &WithdrawCommitment) -> Bytes32 {
    commitment.call().digest()
}

pub fn transaction(commitment: &WithdrawCommitment, signatures: &AggregatedSignature) -> Transaction {
    commitment.call().transaction(signatures)
}
