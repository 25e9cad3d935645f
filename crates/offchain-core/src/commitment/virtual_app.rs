//! Virtual app commitments
//!
//! A virtual app's state is co-signed by its two parties on every update and
//! by the intermediary once, over a digest that carries a version bound
//! instead of a version. The agreement commitment locks funds in each of the
//! intermediary's channels for the virtual app's lifetime.

use crate::abi::{self, Token};
use crate::commitment::multisig::MultisigCall;
use crate::commitment::set_state::state_digest;
use crate::commitment::{Operation, Transaction, EIP191_PREFIX};
use crate::config::NetworkContext;
use crate::crypto::{keccak256, Signature};
use crate::model::{AppIdentity, AppInstance, StateChannel, VirtualAppAgreement};
use crate::signatures::AggregatedSignature;
use crate::types::{Address, Bytes, Bytes32, U256};

const VIRTUAL_APP_SET_STATE: &str =
    "virtualAppSetState((address,address[],address,uint256,uint256),(bytes32,uint256,uint256,uint256,bytes))";

const INSTALL_AGREEMENT: &str = "installVirtualAppAgreement(bytes32,bytes32,uint256,uint256,bytes32,(uint256,address,address,address,uint256),(uint8,uint256,address))";

// ----------------------------------------------------------------------------
// Virtual App Set-State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAppSetStateCommitment {
    pub app_registry: Address,
    pub identity: AppIdentity,
    pub identity_hash: Bytes32,
    pub app_state_hash: Bytes32,
    pub version_number: u64,
    pub timeout: u64,
    pub nonce_expiry: u64,
    pub intermediary: Address,
}

impl VirtualAppSetStateCommitment {
    pub fn for_app(
        app: &AppInstance,
        intermediary: Address,
        nonce_expiry: u64,
        network: &NetworkContext,
    ) -> Self {
        Self {
            app_registry: network.app_registry,
            identity: app.identity().clone(),
            identity_hash: app.identity_hash(),
            app_state_hash: app.state_hash(),
            version_number: app.version_number(),
            timeout: app.timeout(),
            nonce_expiry,
            intermediary,
        }
    }

    pub fn signers(&self) -> &[Address] {
        &self.identity.participants
    }
}

/// Digest the two parties sign
pub fn digest(commitment: &VirtualAppSetStateCommitment) -> Bytes32 {
    state_digest(
        &commitment.identity_hash,
        commitment.version_number,
        commitment.timeout,
        &commitment.app_state_hash,
    )
}

/// `keccak256(0x19 ‖ identityHash ‖ nonceExpiry ‖ timeout ‖ 0x01)`, the
/// digest the intermediary signs
pub fn intermediary_digest(commitment: &VirtualAppSetStateCommitment) -> Bytes32 {
    keccak256(&abi::encode_packed(&[
        Token::Uint8(EIP191_PREFIX),
        Token::FixedBytes(commitment.identity_hash),
        Token::uint(commitment.nonce_expiry),
        Token::uint(commitment.timeout),
        Token::Uint8(0x01),
    ]))
}

/// The intermediary's signature leads, followed by the parties in address order
pub fn transaction(
    commitment: &VirtualAppSetStateCommitment,
    signatures: &AggregatedSignature,
    intermediary_signature: &Signature,
) -> Transaction {
    let mut all = intermediary_signature.to_bytes().to_vec();
    all.extend(signatures.to_bytes());
    Transaction {
        to: commitment.app_registry,
        value: U256::zero(),
        data: Bytes::new(abi::encode_call(
            VIRTUAL_APP_SET_STATE,
            &[
                commitment.identity.to_token(),
                Token::Tuple(vec![
                    Token::FixedBytes(commitment.app_state_hash),
                    Token::uint(commitment.version_number),
                    Token::uint(commitment.timeout),
                    Token::uint(commitment.nonce_expiry),
                    Token::Bytes(all),
                ]),
            ],
        )),
        operation: Operation::Call,
    }
}

// ----------------------------------------------------------------------------
// Virtual App Agreement
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAppAgreementCommitment {
    pub multisig: Address,
    pub owners: Vec<Address>,
    pub delegate_target: Address,
    pub free_balance_identity_hash: Bytes32,
    pub free_balance_state_hash: Bytes32,
    pub free_balance_version: u64,
    pub free_balance_timeout: u64,
    pub agreement: VirtualAppAgreement,
}

impl VirtualAppAgreementCommitment {
    /// Commitment for `agreement` against the channel's post-install free balance
    pub fn for_agreement(
        channel: &StateChannel,
        agreement: &VirtualAppAgreement,
        network: &NetworkContext,
    ) -> Self {
        let free_balance = channel.free_balance().instance();
        Self {
            multisig: channel.multisig_address(),
            owners: channel.owners().to_vec(),
            delegate_target: network.conditional_transaction_delegate_target,
            free_balance_identity_hash: free_balance.identity_hash(),
            free_balance_state_hash: free_balance.state_hash(),
            free_balance_version: free_balance.version_number(),
            free_balance_timeout: free_balance.timeout(),
            agreement: agreement.clone(),
        }
    }

    fn call(&self) -> MultisigCall {
        MultisigCall {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to: self.delegate_target,
            value: U256::zero(),
            data: abi::encode_call(
                INSTALL_AGREEMENT,
                &[
                    Token::FixedBytes(self.free_balance_identity_hash),
                    Token::FixedBytes(self.free_balance_state_hash),
                    Token::uint(self.free_balance_version),
                    Token::uint(self.free_balance_timeout),
                    Token::FixedBytes(self.agreement.target_identity_hash),
                    self.agreement.to_token(),
                    self.agreement.target_interpreter_params.terms().to_token(),
                ],
            ),
            operation: Operation::DelegateCall,
        }
    }
}

pub fn agreement_digest(commitment: &VirtualAppAgreementCommitment) -> Bytes32 {
    commitment.call().digest()
}

pub fn agreement_transaction(
    commitment: &VirtualAppAgreementCommitment,
    signatures: &AggregatedSignature,
) -> Transaction {
    commitment.call().transaction(signatures)
}
