//! App instances
//!
//! An app instance is one off-chain application hosted in a channel. Its
//! identity hash never changes; its state only ever moves forward to a copy
//! with a strictly greater version number.

use serde::{Deserialize, Serialize};

use crate::abi::{self, Token};
use crate::crypto::{keccak256, Signature};
use crate::errors::{Result, StateTransitionError};
use crate::model::outcome::InterpreterParams;
use crate::types::{Address, Bytes, Bytes32};

// ----------------------------------------------------------------------------
// App Interface
// ----------------------------------------------------------------------------

/// On-chain app definition and the encodings its state and actions use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInterface {
    /// Address of the app definition contract
    pub addr: Address,
    pub state_encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_encoding: Option<String>,
}

// ----------------------------------------------------------------------------
// App Identity
// ----------------------------------------------------------------------------

/// Fields hashed into an app's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Multisig (or virtual channel key) the app belongs to
    pub owner: Address,
    /// Participant signing keys, sorted ascending
    pub participants: Vec<Address>,
    pub app_definition: Address,
    pub default_timeout: u64,
    /// Per-channel app sequence number, never reused
    pub channel_nonce: u64,
}

impl AppIdentity {
    /// `(address owner, address[] participants, address appDefinition,
    /// uint256 defaultTimeout, uint256 channelNonce)`
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.owner),
            Token::Array(
                self.participants
                    .iter()
                    .map(|p| Token::Address(*p))
                    .collect(),
            ),
            Token::Address(self.app_definition),
            Token::uint(self.default_timeout),
            Token::uint(self.channel_nonce),
        ])
    }

    pub fn identity_hash(&self) -> Bytes32 {
        keccak256(&abi::encode(&[self.to_token()]))
    }
}

// ----------------------------------------------------------------------------
// App Instance
// ----------------------------------------------------------------------------

/// An installed app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstance {
    identity: AppIdentity,
    identity_hash: Bytes32,
    app_interface: AppInterface,
    latest_state: Bytes,
    latest_version_number: u64,
    latest_timeout: u64,
    interpreter_params: InterpreterParams,
    /// Intermediary co-signing a virtual app's set-state commitments
    intermediary: Option<Address>,
    /// Intermediary's standing signature over the virtual app's state channel
    intermediary_signature: Option<Signature>,
}

impl AppInstance {
    /// Create an app at version 0
    pub fn new(
        mut identity: AppIdentity,
        app_interface: AppInterface,
        initial_state: Bytes,
        interpreter_params: InterpreterParams,
    ) -> Self {
        identity.participants.sort();
        let identity_hash = identity.identity_hash();
        let latest_timeout = identity.default_timeout;
        Self {
            identity,
            identity_hash,
            app_interface,
            latest_state: initial_state,
            latest_version_number: 0,
            latest_timeout,
            interpreter_params,
            intermediary: None,
            intermediary_signature: None,
        }
    }

    /// Mark as a virtual app relayed through `intermediary`
    pub fn into_virtual(mut self, intermediary: Address) -> Self {
        self.intermediary = Some(intermediary);
        self
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    pub fn identity_hash(&self) -> Bytes32 {
        self.identity_hash
    }

    pub fn app_interface(&self) -> &AppInterface {
        &self.app_interface
    }

    pub fn app_definition(&self) -> Address {
        self.app_interface.addr
    }

    pub fn participants(&self) -> &[Address] {
        &self.identity.participants
    }

    /// Position of `address` in the sorted participant list
    pub fn participant_index(&self, address: &Address) -> Option<usize> {
        self.identity.participants.iter().position(|p| p == address)
    }

    pub fn latest_state(&self) -> &Bytes {
        &self.latest_state
    }

    /// Keccak-256 of the encoded state
    pub fn state_hash(&self) -> Bytes32 {
        keccak256(&self.latest_state)
    }

    pub fn version_number(&self) -> u64 {
        self.latest_version_number
    }

    pub fn timeout(&self) -> u64 {
        self.latest_timeout
    }

    pub fn default_timeout(&self) -> u64 {
        self.identity.default_timeout
    }

    pub fn interpreter_params(&self) -> &InterpreterParams {
        &self.interpreter_params
    }

    pub fn is_virtual(&self) -> bool {
        self.intermediary.is_some()
    }

    pub fn intermediary(&self) -> Option<Address> {
        self.intermediary
    }

    pub fn intermediary_signature(&self) -> Option<&Signature> {
        self.intermediary_signature.as_ref()
    }

    pub(crate) fn set_intermediary_signature(&mut self, signature: Signature) {
        self.intermediary_signature = Some(signature);
    }

    /// Copy with `new_state` at the next version
    pub fn set_state(&self, new_state: Bytes) -> Self {
        Self {
            latest_state: new_state,
            latest_version_number: self.latest_version_number + 1,
            ..self.clone()
        }
    }

    /// Copy with `new_state` at an explicit version, which must move forward
    pub fn set_state_at(&self, new_state: Bytes, version_number: u64) -> Result<Self> {
        if version_number <= self.latest_version_number {
            return Err(StateTransitionError::StaleVersion {
                current: self.latest_version_number,
                proposed: version_number,
            }
            .into());
        }
        Ok(Self {
            latest_state: new_state,
            latest_version_number: version_number,
            ..self.clone()
        })
    }
}
