//! Protocol definitions
//!
//! Each protocol is a fixed table of per-role instruction sequences. A run
//! first applies the protocol's state transition to a working copy of the
//! involved channels (see [`transitions`]), which also fixes the commitment
//! in every signing slot. The executor then walks the role's instructions,
//! signing slots, exchanging messages and writing fully signed commitments.
//!
//! Signatures travel in the message's `signature`, `signature2` and
//! `signature3` fields, in the order of the `carry` list of the sending
//! instruction and the `receives`/`expect` list of the receiving side.

pub mod context;
pub mod params;
pub mod transitions;

use core::fmt;

use serde::{Deserialize, Serialize};

pub use context::{ChannelRef, Context, PendingCommitment, ProtocolEnvironment, ProtocolOutcome};
pub use params::*;

/// Sequence number carried by every reply
pub const UNASSIGNED_SEQ_NO: i32 = -1;

// ----------------------------------------------------------------------------
// Names and Roles
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolName {
    Setup,
    Propose,
    Install,
    Update,
    TakeAction,
    Uninstall,
    Withdraw,
    RejectInstall,
    InstallVirtualApp,
    UninstallVirtualApp,
}

impl ProtocolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolName::Setup => "setup",
            ProtocolName::Propose => "propose",
            ProtocolName::Install => "install",
            ProtocolName::Update => "update",
            ProtocolName::TakeAction => "takeAction",
            ProtocolName::Uninstall => "uninstall",
            ProtocolName::Withdraw => "withdraw",
            ProtocolName::RejectInstall => "rejectInstall",
            ProtocolName::InstallVirtualApp => "installVirtualApp",
            ProtocolName::UninstallVirtualApp => "uninstallVirtualApp",
        }
    }

    /// Instruction table for this protocol
    pub fn definition(&self) -> &'static Protocol {
        match self {
            ProtocolName::Setup => &SETUP,
            ProtocolName::Propose => &PROPOSE,
            ProtocolName::Install => &INSTALL,
            ProtocolName::Update => &UPDATE,
            ProtocolName::TakeAction => &TAKE_ACTION,
            ProtocolName::Uninstall => &UNINSTALL,
            ProtocolName::Withdraw => &WITHDRAW,
            ProtocolName::RejectInstall => &REJECT_INSTALL,
            ProtocolName::InstallVirtualApp => &INSTALL_VIRTUAL_APP,
            ProtocolName::UninstallVirtualApp => &UNINSTALL_VIRTUAL_APP,
        }
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
    Intermediary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
            Role::Intermediary => "intermediary",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Instructions
// ----------------------------------------------------------------------------

/// Signature of `signer` over the commitment in `slot`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigRef {
    pub slot: usize,
    pub signer: Role,
}

const fn sig(slot: usize, signer: Role) -> SigRef {
    SigRef { slot, signer }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Sign the slot's commitment as a party
    Sign(usize),
    /// Sign the slot's virtual app commitment as its intermediary
    SignAsIntermediary(usize),
    /// Send without waiting; replies use [`UNASSIGNED_SEQ_NO`]
    Send {
        to: Role,
        seq: i32,
        carry: &'static [SigRef],
    },
    /// Send, then suspend until `to` replies with the `expect` signatures
    SendAndWait {
        to: Role,
        seq: i32,
        carry: &'static [SigRef],
        expect: &'static [SigRef],
    },
    /// Assemble the slot's signatures into a signed commitment
    WriteCommitment(usize),
}

/// What one role does in a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFlow {
    pub role: Role,
    /// Sequence number of the message that starts this role
    pub seq: i32,
    /// Signatures carried by that message
    pub receives: &'static [SigRef],
    pub instructions: &'static [Instruction],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub name: ProtocolName,
    pub flows: &'static [RoleFlow],
}

impl Protocol {
    pub fn flow(&self, role: Role) -> Option<&'static RoleFlow> {
        self.flows.iter().find(|flow| flow.role == role)
    }

    /// Role started by an inbound message with sequence number `seq`
    pub fn flow_for_seq(&self, seq: i32) -> Option<&'static RoleFlow> {
        self.flows.iter().find(|flow| flow.seq == seq && flow.role != Role::Initiator)
    }

    /// Role whose message starts `role`
    pub fn sender_of(&self, role: Role) -> Option<Role> {
        let seq = self.flow(role)?.seq;
        self.flows.iter().find_map(|flow| {
            flow.instructions.iter().find_map(|instruction| match *instruction {
                Instruction::Send { to, seq: s, .. } | Instruction::SendAndWait { to, seq: s, .. }
                    if to == role && s == seq =>
                {
                    Some(flow.role)
                }
                _ => None,
            })
        })
    }
}

// ----------------------------------------------------------------------------
// Definitions
// ----------------------------------------------------------------------------

use Instruction::{Send, SendAndWait, Sign, SignAsIntermediary, WriteCommitment};
use Role::{Initiator, Intermediary, Responder};

/// Sign one commitment and swap signatures with the responder
macro_rules! single_commitment_protocol {
    ($name:ident, $protocol:expr) => {
        pub static $name: Protocol = Protocol {
            name: $protocol,
            flows: &[
                RoleFlow {
                    role: Initiator,
                    seq: 0,
                    receives: &[],
                    instructions: &[
                        Sign(0),
                        SendAndWait {
                            to: Responder,
                            seq: 1,
                            carry: &[sig(0, Initiator)],
                            expect: &[sig(0, Responder)],
                        },
                        WriteCommitment(0),
                    ],
                },
                RoleFlow {
                    role: Responder,
                    seq: 1,
                    receives: &[sig(0, Initiator)],
                    instructions: &[
                        Sign(0),
                        WriteCommitment(0),
                        Send {
                            to: Initiator,
                            seq: UNASSIGNED_SEQ_NO,
                            carry: &[sig(0, Responder)],
                        },
                    ],
                },
            ],
        };
    };
}

single_commitment_protocol!(SETUP, ProtocolName::Setup);
single_commitment_protocol!(INSTALL, ProtocolName::Install);
single_commitment_protocol!(UPDATE, ProtocolName::Update);
single_commitment_protocol!(TAKE_ACTION, ProtocolName::TakeAction);
single_commitment_protocol!(UNINSTALL, ProtocolName::Uninstall);

pub static PROPOSE: Protocol = Protocol {
    name: ProtocolName::Propose,
    flows: &[
        RoleFlow {
            role: Initiator,
            seq: 0,
            receives: &[],
            instructions: &[SendAndWait {
                to: Responder,
                seq: 1,
                carry: &[],
                expect: &[],
            }],
        },
        RoleFlow {
            role: Responder,
            seq: 1,
            receives: &[],
            instructions: &[Send {
                to: Initiator,
                seq: UNASSIGNED_SEQ_NO,
                carry: &[],
            }],
        },
    ],
};

pub static REJECT_INSTALL: Protocol = Protocol {
    name: ProtocolName::RejectInstall,
    flows: &[
        RoleFlow {
            role: Initiator,
            seq: 0,
            receives: &[],
            instructions: &[Send {
                to: Responder,
                seq: 1,
                carry: &[],
            }],
        },
        RoleFlow {
            role: Responder,
            seq: 1,
            receives: &[],
            instructions: &[],
        },
    ],
};

/// Slot 0 is the free-balance set-state, slot 1 the withdraw transfer
pub static WITHDRAW: Protocol = Protocol {
    name: ProtocolName::Withdraw,
    flows: &[
        RoleFlow {
            role: Initiator,
            seq: 0,
            receives: &[],
            instructions: &[
                Sign(0),
                Sign(1),
                SendAndWait {
                    to: Responder,
                    seq: 1,
                    carry: &[sig(0, Initiator), sig(1, Initiator)],
                    expect: &[sig(0, Responder), sig(1, Responder)],
                },
                WriteCommitment(0),
                WriteCommitment(1),
            ],
        },
        RoleFlow {
            role: Responder,
            seq: 1,
            receives: &[sig(0, Initiator), sig(1, Initiator)],
            instructions: &[
                Sign(0),
                Sign(1),
                WriteCommitment(0),
                WriteCommitment(1),
                Send {
                    to: Initiator,
                    seq: UNASSIGNED_SEQ_NO,
                    carry: &[sig(0, Responder), sig(1, Responder)],
                },
            ],
        },
    ],
};

/// Slot 0 is the initiator-intermediary agreement, slot 1 the virtual
/// app's set-state, slot 2 the intermediary-responder agreement
pub static INSTALL_VIRTUAL_APP: Protocol = Protocol {
    name: ProtocolName::InstallVirtualApp,
    flows: &[
        RoleFlow {
            role: Initiator,
            seq: 0,
            receives: &[],
            instructions: &[
                Sign(0),
                Sign(1),
                SendAndWait {
                    to: Intermediary,
                    seq: 1,
                    carry: &[sig(0, Initiator), sig(1, Initiator)],
                    expect: &[sig(0, Intermediary), sig(1, Intermediary), sig(1, Responder)],
                },
                WriteCommitment(0),
                WriteCommitment(1),
            ],
        },
        RoleFlow {
            role: Intermediary,
            seq: 1,
            receives: &[sig(0, Initiator), sig(1, Initiator)],
            instructions: &[
                Sign(0),
                SignAsIntermediary(1),
                Sign(2),
                SendAndWait {
                    to: Responder,
                    seq: 2,
                    carry: &[sig(2, Intermediary), sig(1, Intermediary), sig(1, Initiator)],
                    expect: &[sig(2, Responder), sig(1, Responder)],
                },
                WriteCommitment(0),
                WriteCommitment(2),
                Send {
                    to: Initiator,
                    seq: UNASSIGNED_SEQ_NO,
                    carry: &[sig(0, Intermediary), sig(1, Intermediary), sig(1, Responder)],
                },
            ],
        },
        RoleFlow {
            role: Responder,
            seq: 2,
            receives: &[sig(2, Intermediary), sig(1, Intermediary), sig(1, Initiator)],
            instructions: &[
                Sign(2),
                Sign(1),
                WriteCommitment(2),
                WriteCommitment(1),
                Send {
                    to: Intermediary,
                    seq: UNASSIGNED_SEQ_NO,
                    carry: &[sig(2, Responder), sig(1, Responder)],
                },
            ],
        },
    ],
};

/// Slot 0 is the initiator-intermediary free balance, slot 1 the
/// intermediary-responder free balance
pub static UNINSTALL_VIRTUAL_APP: Protocol = Protocol {
    name: ProtocolName::UninstallVirtualApp,
    flows: &[
        RoleFlow {
            role: Initiator,
            seq: 0,
            receives: &[],
            instructions: &[
                Sign(0),
                SendAndWait {
                    to: Intermediary,
                    seq: 1,
                    carry: &[sig(0, Initiator)],
                    expect: &[sig(0, Intermediary)],
                },
                WriteCommitment(0),
            ],
        },
        RoleFlow {
            role: Intermediary,
            seq: 1,
            receives: &[sig(0, Initiator)],
            instructions: &[
                Sign(0),
                Sign(1),
                SendAndWait {
                    to: Responder,
                    seq: 2,
                    carry: &[sig(1, Intermediary)],
                    expect: &[sig(1, Responder)],
                },
                WriteCommitment(0),
                WriteCommitment(1),
                Send {
                    to: Initiator,
                    seq: UNASSIGNED_SEQ_NO,
                    carry: &[sig(0, Intermediary)],
                },
            ],
        },
        RoleFlow {
            role: Responder,
            seq: 2,
            receives: &[sig(1, Intermediary)],
            instructions: &[
                Sign(1),
                WriteCommitment(1),
                Send {
                    to: Intermediary,
                    seq: UNASSIGNED_SEQ_NO,
                    carry: &[sig(1, Responder)],
                },
            ],
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProtocolName; 10] = [
        ProtocolName::Setup,
        ProtocolName::Propose,
        ProtocolName::Install,
        ProtocolName::Update,
        ProtocolName::TakeAction,
        ProtocolName::Uninstall,
        ProtocolName::Withdraw,
        ProtocolName::RejectInstall,
        ProtocolName::InstallVirtualApp,
        ProtocolName::UninstallVirtualApp,
    ];

    fn carried(instruction: &Instruction) -> &'static [SigRef] {
        match instruction {
            Send { carry, .. } | SendAndWait { carry, .. } => carry,
            _ => &[],
        }
    }

    #[test]
    fn every_message_fits_the_signature_fields() {
        for name in ALL {
            for flow in name.definition().flows {
                assert!(flow.receives.len() <= 3, "{name} {}", flow.role);
                for instruction in flow.instructions {
                    assert!(carried(instruction).len() <= 3, "{name} {}", flow.role);
                }
            }
        }
    }

    #[test]
    fn receives_match_what_the_sender_carries() {
        for name in ALL {
            let protocol = name.definition();
            for flow in protocol.flows {
                for instruction in flow.instructions {
                    let (to, seq, carry) = match instruction {
                        Send { to, seq, carry } | SendAndWait { to, seq, carry, .. } => {
                            (*to, *seq, *carry)
                        }
                        _ => continue,
                    };
                    if seq == UNASSIGNED_SEQ_NO {
                        continue;
                    }
                    let receiver = protocol.flow(to).unwrap();
                    assert_eq!(receiver.seq, seq, "{name}");
                    assert_eq!(receiver.receives, carry, "{name}");
                }
            }
        }
    }

    #[test]
    fn every_signature_is_produced_before_it_is_carried() {
        for name in ALL {
            for flow in name.definition().flows {
                let mut have: Vec<SigRef> = flow.receives.to_vec();
                for instruction in flow.instructions {
                    match instruction {
                        Sign(slot) | SignAsIntermediary(slot) => have.push(sig(*slot, flow.role)),
                        Send { carry, .. } => {
                            for s in *carry {
                                assert!(have.contains(s), "{name} {} missing {s:?}", flow.role);
                            }
                        }
                        SendAndWait { carry, expect, .. } => {
                            for s in *carry {
                                assert!(have.contains(s), "{name} {} missing {s:?}", flow.role);
                            }
                            have.extend_from_slice(expect);
                        }
                        WriteCommitment(_) => {}
                    }
                }
            }
        }
    }

    #[test]
    fn replies_start_no_role() {
        assert!(INSTALL.flow_for_seq(UNASSIGNED_SEQ_NO).is_none());
        assert_eq!(INSTALL_VIRTUAL_APP.flow_for_seq(2).unwrap().role, Responder);
        assert_eq!(INSTALL_VIRTUAL_APP.flow_for_seq(1).unwrap().role, Intermediary);
    }

    #[test]
    fn virtual_responders_hear_from_the_intermediary() {
        assert_eq!(INSTALL_VIRTUAL_APP.sender_of(Responder), Some(Intermediary));
        assert_eq!(UNINSTALL_VIRTUAL_APP.sender_of(Intermediary), Some(Initiator));
        assert_eq!(WITHDRAW.sender_of(Responder), Some(Initiator));
        assert_eq!(WITHDRAW.sender_of(Initiator), None);
    }

    #[test]
    fn names_use_wire_spelling() {
        let json = serde_json::to_string(&ProtocolName::InstallVirtualApp).unwrap();
        assert_eq!(json, "\"installVirtualApp\"");
        assert_eq!(ProtocolName::TakeAction.to_string(), "takeAction");
    }
}
