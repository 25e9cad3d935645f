//! Wire format
//!
//! `ProtocolMessage` is the only thing peers exchange. Its JSON shape is
//! stable: `{processId, protocol, params, toIdentifier, fromIdentifier, seq,
//! signature?, signature2?, signature3?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::Signature;
use crate::errors::{OffchainError, Result, SignatureError};
use crate::protocol::{ProtocolName, ProtocolParams, UNASSIGNED_SEQ_NO};
use crate::types::Address;

/// Most signatures one message can carry
pub const MAX_CARRIED_SIGNATURES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage {
    pub process_id: Uuid,
    pub protocol: ProtocolName,
    #[serde(default)]
    pub params: Value,
    pub to_identifier: Address,
    pub from_identifier: Address,
    pub seq: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature2: Option<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature3: Option<Signature>,
}

impl ProtocolMessage {
    /// Message that starts a role, carrying the initiator's parameters
    pub fn initiating(
        process_id: Uuid,
        params: &ProtocolParams,
        from: Address,
        to: Address,
        seq: i32,
    ) -> Result<Self> {
        Ok(Self {
            process_id,
            protocol: params.protocol(),
            params: params.to_wire()?,
            to_identifier: to,
            from_identifier: from,
            seq,
            signature: None,
            signature2: None,
            signature3: None,
        })
    }

    /// Reply to the peer that is waiting on this run
    pub fn reply(process_id: Uuid, protocol: ProtocolName, from: Address, to: Address) -> Self {
        Self {
            process_id,
            protocol,
            params: Value::Object(Default::default()),
            to_identifier: to,
            from_identifier: from,
            seq: UNASSIGNED_SEQ_NO,
            signature: None,
            signature2: None,
            signature3: None,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.seq == UNASSIGNED_SEQ_NO
    }

    /// Fill the signature fields in order
    pub fn with_signatures(mut self, signatures: Vec<Signature>) -> Result<Self> {
        if signatures.len() > MAX_CARRIED_SIGNATURES {
            return Err(SignatureError::CountMismatch {
                expected: MAX_CARRIED_SIGNATURES,
                actual: signatures.len(),
            }
            .into());
        }
        let mut carried = signatures.into_iter();
        self.signature = carried.next();
        self.signature2 = carried.next();
        self.signature3 = carried.next();
        Ok(self)
    }

    /// Carried signatures in field order, stopping at the first empty field
    pub fn signatures(&self) -> Vec<Signature> {
        [self.signature, self.signature2, self.signature3]
            .into_iter()
            .map_while(|s| s)
            .collect()
    }

    pub fn decode_params(&self) -> Result<ProtocolParams> {
        ProtocolParams::from_wire(self.protocol, self.params.clone())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OffchainError::malformed_message(format!("invalid protocol message: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKeyPair;
    use crate::protocol::AppParams;
    use crate::types::Bytes32;
    use serde_json::json;

    fn params() -> ProtocolParams {
        ProtocolParams::Uninstall(AppParams {
            initiator_identifier: Address::new([1u8; 20]),
            responder_identifier: Address::new([2u8; 20]),
            multisig_address: Address::new([3u8; 20]),
            app_identity_hash: Bytes32::new([4u8; 32]),
        })
    }

    #[test]
    fn json_field_names_are_stable() {
        let key = SigningKeyPair::from_bytes(&[7u8; 32]).unwrap();
        let sig = key.sign_digest(&Bytes32::new([5u8; 32])).unwrap();
        let msg = ProtocolMessage::initiating(
            Uuid::nil(),
            &params(),
            Address::new([1u8; 20]),
            Address::new([2u8; 20]),
            1,
        )
        .unwrap()
        .with_signatures(vec![sig])
        .unwrap();

        let value: Value = serde_json::from_slice(&msg.to_json().unwrap()).unwrap();
        for field in ["processId", "protocol", "params", "toIdentifier", "fromIdentifier", "seq", "signature"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert!(value.get("signature2").is_none());
        assert_eq!(value["protocol"], json!("uninstall"));
        assert_eq!(value["params"]["appIdentityHash"], json!(Bytes32::new([4u8; 32]).to_string()));
    }

    #[test]
    fn unknown_message_fields_are_ignored() {
        let msg = ProtocolMessage::initiating(
            Uuid::nil(),
            &params(),
            Address::new([1u8; 20]),
            Address::new([2u8; 20]),
            1,
        )
        .unwrap();
        let mut value = serde_json::to_value(&msg).unwrap();
        value["transportHint"] = json!("relay");
        value["params"]["extra"] = json!(7);
        let parsed = ProtocolMessage::from_json(&serde_json::to_vec(&value).unwrap()).unwrap();
        assert_eq!(parsed.decode_params().unwrap(), params());
    }

    #[test]
    fn signatures_fill_fields_in_order() {
        let key = SigningKeyPair::from_bytes(&[7u8; 32]).unwrap();
        let sigs: Vec<_> = (0u8..3)
            .map(|i| key.sign_digest(&Bytes32::new([i; 32])).unwrap())
            .collect();
        let msg = ProtocolMessage::reply(Uuid::nil(), ProtocolName::Install, Address::ZERO, Address::ZERO)
            .with_signatures(sigs.clone())
            .unwrap();
        assert!(msg.is_reply());
        assert_eq!(msg.signatures(), sigs);
        assert_eq!(msg.signature3, Some(sigs[2]));

        let too_many = [sigs.clone(), sigs].concat();
        assert!(ProtocolMessage::reply(Uuid::nil(), ProtocolName::Install, Address::ZERO, Address::ZERO)
            .with_signatures(too_many)
            .is_err());
    }
}
