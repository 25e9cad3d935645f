//! Set-state commitment
//!
//! Registers a signed app state with the app registry. When two set-state
//! commitments for the same app conflict, the higher version wins.

use crate::abi::{self, Token};
use crate::commitment::{Operation, Transaction, EIP191_PREFIX};
use crate::config::NetworkContext;
use crate::crypto::keccak256;
use crate::model::{AppIdentity, AppInstance};
use crate::signatures::AggregatedSignature;
use crate::types::{Address, Bytes, Bytes32, U256};

const SET_STATE: &str =
    "setState((address,address[],address,uint256,uint256),(bytes32,uint256,uint256,bytes))";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStateCommitment {
    pub app_registry: Address,
    pub identity: AppIdentity,
    pub identity_hash: Bytes32,
    pub app_state_hash: Bytes32,
    pub version_number: u64,
    pub timeout: u64,
}

impl SetStateCommitment {
    /// Commitment to the app's latest state
    pub fn for_app(app: &AppInstance, network: &NetworkContext) -> Self {
        Self {
            app_registry: network.app_registry,
            identity: app.identity().clone(),
            identity_hash: app.identity_hash(),
            app_state_hash: app.state_hash(),
            version_number: app.version_number(),
            timeout: app.timeout(),
        }
    }

    pub fn signers(&self) -> &[Address] {
        &self.identity.participants
    }
}

/// `keccak256(0x19 ‖ identityHash ‖ version ‖ timeout ‖ appStateHash)`
pub(crate) fn state_digest(
    identity_hash: &Bytes32,
    version_number: u64,
    timeout: u64,
    app_state_hash: &Bytes32,
) -> Bytes32 {
    keccak256(&abi::encode_packed(&[
        Token::Uint8(EIP191_PREFIX),
        Token::FixedBytes(*identity_hash),
        Token::uint(version_number),
        Token::uint(timeout),
        Token::FixedBytes(*app_state_hash),
    ]))
}

pub fn digest(commitment: &SetStateCommitment) -> Bytes32 {
    state_digest(
        &commitment.identity_hash,
        commitment.version_number,
        commitment.timeout,
        &commitment.app_state_hash,
    )
}

pub fn transaction(commitment: &SetStateCommitment, signatures: &AggregatedSignature) -> Transaction {
    Transaction {
        to: commitment.app_registry,
        value: U256::zero(),
        data: Bytes::new(abi::encode_call(
            SET_STATE,
            &[
                commitment.identity.to_token(),
                Token::Tuple(vec![
                    Token::FixedBytes(commitment.app_state_hash),
                    Token::uint(commitment.version_number),
                    Token::uint(commitment.timeout),
                    Token::Bytes(signatures.to_bytes()),
                ]),
            ],
        )),
        operation: Operation::Call,
    }
}
