//! Multisig wallet calls
//!
//! Every commitment executed by the channel's multisig shares one digest and
//! one outer transaction shape: `execTransaction(to, value, data, operation,
//! signatures)` on the multisig, signed over
//! `keccak256(0x19 ‖ owners ‖ to ‖ value ‖ data ‖ operation)`.

use crate::abi::{self, Decoder, Token};
use crate::commitment::{Operation, Transaction, EIP191_PREFIX};
use crate::crypto::keccak256;
use crate::errors::{OffchainError, Result};
use crate::signatures::AggregatedSignature;
use crate::types::{Address, Bytes, Bytes32, U256};

const EXEC_TRANSACTION: &str = "execTransaction(address,uint256,bytes,uint8,bytes)";

/// A call the multisig makes once its owners have signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigCall {
    pub multisig: Address,
    /// Sorted owners, the order signatures must follow
    pub owners: Vec<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub operation: Operation,
}

impl MultisigCall {
    pub fn digest(&self) -> Bytes32 {
        keccak256(&abi::encode_packed(&[
            Token::Uint8(EIP191_PREFIX),
            Token::Array(self.owners.iter().map(|o| Token::Address(*o)).collect()),
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::Bytes(self.data.clone()),
            Token::Uint8(self.operation as u8),
        ]))
    }

    pub fn transaction(&self, signatures: &AggregatedSignature) -> Transaction {
        Transaction {
            to: self.multisig,
            value: U256::zero(),
            data: Bytes::new(abi::encode_call(
                EXEC_TRANSACTION,
                &[
                    Token::Address(self.to),
                    Token::Uint(self.value),
                    Token::Bytes(self.data.clone()),
                    Token::Uint8(self.operation as u8),
                    Token::Bytes(signatures.to_bytes()),
                ],
            )),
            operation: Operation::Call,
        }
    }
}

/// Fields of a decoded `execTransaction` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedExecTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub operation: Operation,
    pub signatures: AggregatedSignature,
}

/// Decode the calldata of a multisig transaction
pub fn decode_exec_transaction(data: &[u8]) -> Result<DecodedExecTransaction> {
    let decoder = Decoder::for_call(data, EXEC_TRANSACTION)?;
    let operation = match decoder.uint(3)?.low_u32() {
        0 => Operation::Call,
        1 => Operation::DelegateCall,
        other => {
            return Err(OffchainError::malformed_message(format!(
                "unknown operation {other}"
            )))
        }
    };
    Ok(DecodedExecTransaction {
        to: decoder.address(0)?,
        value: decoder.uint(1)?,
        data: decoder.bytes(2)?,
        operation,
        signatures: AggregatedSignature::from_bytes(&decoder.bytes(4)?)?,
    })
}
