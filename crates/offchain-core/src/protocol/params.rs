//! Protocol parameters
//!
//! The initiator's parameters travel as the message's `params` object and
//! are decoded by every other role. Unknown fields are ignored so newer
//! peers can add fields without breaking older ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{OffchainError, Result};
use crate::model::{virtual_channel_key, ProposalTerms};
use crate::protocol::context::ChannelRef;
use crate::protocol::{ProtocolName, Role};
use crate::types::{Address, Bytes, Bytes32, U256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
    pub terms: ProposalTerms,
}

/// Parameters shared by the protocols that target one app or proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
    pub app_identity_hash: Bytes32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
    pub app_identity_hash: Bytes32,
    pub new_state: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeActionParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
    pub app_identity_hash: Bytes32,
    pub action: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
    pub recipient: Address,
    pub amount: U256,
    pub token_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallVirtualAppParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub intermediary_identifier: Address,
    pub terms: ProposalTerms,
    /// Sequence number the app takes in the virtual channel
    pub app_seq_no: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallVirtualAppParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub intermediary_identifier: Address,
    pub target_app_identity_hash: Bytes32,
    /// Final state the outcome is computed from
    pub target_app_state: Bytes,
}

// ----------------------------------------------------------------------------
// Protocol Params
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolParams {
    Setup(SetupParams),
    Propose(ProposeParams),
    Install(AppParams),
    Update(UpdateParams),
    TakeAction(TakeActionParams),
    Uninstall(AppParams),
    Withdraw(WithdrawParams),
    RejectInstall(AppParams),
    InstallVirtualApp(InstallVirtualAppParams),
    UninstallVirtualApp(UninstallVirtualAppParams),
}

impl ProtocolParams {
    pub fn protocol(&self) -> ProtocolName {
        match self {
            ProtocolParams::Setup(_) => ProtocolName::Setup,
            ProtocolParams::Propose(_) => ProtocolName::Propose,
            ProtocolParams::Install(_) => ProtocolName::Install,
            ProtocolParams::Update(_) => ProtocolName::Update,
            ProtocolParams::TakeAction(_) => ProtocolName::TakeAction,
            ProtocolParams::Uninstall(_) => ProtocolName::Uninstall,
            ProtocolParams::Withdraw(_) => ProtocolName::Withdraw,
            ProtocolParams::RejectInstall(_) => ProtocolName::RejectInstall,
            ProtocolParams::InstallVirtualApp(_) => ProtocolName::InstallVirtualApp,
            ProtocolParams::UninstallVirtualApp(_) => ProtocolName::UninstallVirtualApp,
        }
    }

    /// Decode the `params` object of a message for `protocol`
    pub fn from_wire(protocol: ProtocolName, params: Value) -> Result<Self> {
        let decoded = match protocol {
            ProtocolName::Setup => ProtocolParams::Setup(serde_json::from_value(params)?),
            ProtocolName::Propose => ProtocolParams::Propose(serde_json::from_value(params)?),
            ProtocolName::Install => ProtocolParams::Install(serde_json::from_value(params)?),
            ProtocolName::Update => ProtocolParams::Update(serde_json::from_value(params)?),
            ProtocolName::TakeAction => {
                ProtocolParams::TakeAction(serde_json::from_value(params)?)
            }
            ProtocolName::Uninstall => ProtocolParams::Uninstall(serde_json::from_value(params)?),
            ProtocolName::Withdraw => ProtocolParams::Withdraw(serde_json::from_value(params)?),
            ProtocolName::RejectInstall => {
                ProtocolParams::RejectInstall(serde_json::from_value(params)?)
            }
            ProtocolName::InstallVirtualApp => {
                ProtocolParams::InstallVirtualApp(serde_json::from_value(params)?)
            }
            ProtocolName::UninstallVirtualApp => {
                ProtocolParams::UninstallVirtualApp(serde_json::from_value(params)?)
            }
        };
        Ok(decoded)
    }

    pub fn to_wire(&self) -> Result<Value> {
        let value = match self {
            ProtocolParams::Setup(p) => serde_json::to_value(p)?,
            ProtocolParams::Propose(p) => serde_json::to_value(p)?,
            ProtocolParams::Install(p)
            | ProtocolParams::Uninstall(p)
            | ProtocolParams::RejectInstall(p) => serde_json::to_value(p)?,
            ProtocolParams::Update(p) => serde_json::to_value(p)?,
            ProtocolParams::TakeAction(p) => serde_json::to_value(p)?,
            ProtocolParams::Withdraw(p) => serde_json::to_value(p)?,
            ProtocolParams::InstallVirtualApp(p) => serde_json::to_value(p)?,
            ProtocolParams::UninstallVirtualApp(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    pub fn initiator(&self) -> Address {
        match self {
            ProtocolParams::Setup(p) => p.initiator_identifier,
            ProtocolParams::Propose(p) => p.initiator_identifier,
            ProtocolParams::Install(p)
            | ProtocolParams::Uninstall(p)
            | ProtocolParams::RejectInstall(p) => p.initiator_identifier,
            ProtocolParams::Update(p) => p.initiator_identifier,
            ProtocolParams::TakeAction(p) => p.initiator_identifier,
            ProtocolParams::Withdraw(p) => p.initiator_identifier,
            ProtocolParams::InstallVirtualApp(p) => p.initiator_identifier,
            ProtocolParams::UninstallVirtualApp(p) => p.initiator_identifier,
        }
    }

    pub fn responder(&self) -> Address {
        match self {
            ProtocolParams::Setup(p) => p.responder_identifier,
            ProtocolParams::Propose(p) => p.responder_identifier,
            ProtocolParams::Install(p)
            | ProtocolParams::Uninstall(p)
            | ProtocolParams::RejectInstall(p) => p.responder_identifier,
            ProtocolParams::Update(p) => p.responder_identifier,
            ProtocolParams::TakeAction(p) => p.responder_identifier,
            ProtocolParams::Withdraw(p) => p.responder_identifier,
            ProtocolParams::InstallVirtualApp(p) => p.responder_identifier,
            ProtocolParams::UninstallVirtualApp(p) => p.responder_identifier,
        }
    }

    pub fn intermediary(&self) -> Option<Address> {
        match self {
            ProtocolParams::InstallVirtualApp(p) => Some(p.intermediary_identifier),
            ProtocolParams::UninstallVirtualApp(p) => Some(p.intermediary_identifier),
            _ => None,
        }
    }

    pub fn address_of(&self, role: Role) -> Result<Address> {
        match role {
            Role::Initiator => Ok(self.initiator()),
            Role::Responder => Ok(self.responder()),
            Role::Intermediary => self.intermediary().ok_or_else(|| {
                OffchainError::invalid_params(format!("{} has no intermediary", self.protocol()))
            }),
        }
    }

    /// Role `address` plays in this run
    pub fn role_of(&self, address: &Address) -> Option<Role> {
        if *address == self.initiator() {
            Some(Role::Initiator)
        } else if *address == self.responder() {
            Some(Role::Responder)
        } else if self.intermediary() == Some(*address) {
            Some(Role::Intermediary)
        } else {
            None
        }
    }

    /// Channels `role` must hold locked and loaded for the run
    pub fn channel_refs(&self, role: Role) -> Vec<ChannelRef> {
        let multisig = match self {
            ProtocolParams::Setup(p) => p.multisig_address,
            ProtocolParams::Propose(p) => p.multisig_address,
            ProtocolParams::Install(p)
            | ProtocolParams::Uninstall(p)
            | ProtocolParams::RejectInstall(p) => p.multisig_address,
            ProtocolParams::Update(p) => p.multisig_address,
            ProtocolParams::TakeAction(p) => p.multisig_address,
            ProtocolParams::Withdraw(p) => p.multisig_address,
            ProtocolParams::InstallVirtualApp(_) | ProtocolParams::UninstallVirtualApp(_) => {
                return self.virtual_channel_refs(role)
            }
        };
        vec![ChannelRef::Multisig(multisig)]
    }

    fn virtual_channel_refs(&self, role: Role) -> Vec<ChannelRef> {
        let (a, b) = (self.initiator(), self.responder());
        let Some(i) = self.intermediary() else {
            return Vec::new();
        };
        let virtual_channel = ChannelRef::Multisig(virtual_channel_key(&[a, b], &i));
        match role {
            Role::Initiator => vec![ChannelRef::Between(a, i), virtual_channel],
            Role::Intermediary => vec![ChannelRef::Between(a, i), ChannelRef::Between(i, b)],
            Role::Responder => vec![ChannelRef::Between(i, b), virtual_channel],
        }
    }
}
