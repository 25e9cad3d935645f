//! Settlement layer seam

use async_trait::async_trait;

use crate::abi::{self, Token};
use crate::commitment::{Operation, Transaction};
use crate::errors::Result;
use crate::types::{Address, Bytes, Bytes32, U256, ETH_TOKEN_ADDRESS};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit a transaction and return its hash
    async fn submit_transaction(&self, transaction: &Transaction) -> Result<Bytes32>;

    /// Amount of `token` `holder` currently holds
    async fn balance_of(&self, holder: Address, token: Address) -> Result<U256>;
}

/// Transaction moving `amount` of `token` from the caller into `multisig`
pub fn funding_transaction(multisig: Address, amount: U256, token: Address) -> Transaction {
    if token == ETH_TOKEN_ADDRESS {
        Transaction {
            to: multisig,
            value: amount,
            data: Bytes::default(),
            operation: Operation::Call,
        }
    } else {
        Transaction {
            to: token,
            value: U256::zero(),
            data: Bytes::new(abi::encode_call(
                "transfer(address,uint256)",
                &[Token::Address(multisig), Token::Uint(amount)],
            )),
            operation: Operation::Call,
        }
    }
}
