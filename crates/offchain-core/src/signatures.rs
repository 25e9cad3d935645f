//! Signature collection and verification
//!
//! The multisig contract checks signatures against its owner list sorted
//! ascending by address, so every aggregate produced here is ordered the same
//! way. An aggregate that is correctly signed but ordered differently is
//! rejected exactly like a forged one.

use crate::crypto::{Signature, SigningKeyPair};
use crate::errors::{Result, SignatureError};
use crate::types::{Address, Bytes32};

/// Concatenated `r ‖ s ‖ v` signatures in signer-address-ascending order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregatedSignature(Vec<Signature>);

impl AggregatedSignature {
    /// Wrap signatures that are already in their final order
    pub fn from_ordered(signatures: Vec<Signature>) -> Self {
        Self(signatures)
    }

    /// Parse a concatenation of 65-byte signatures
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % Signature::LEN != 0 {
            return Err(SignatureError::Malformed {
                reason: format!("aggregate length {} is not a multiple of 65", bytes.len()),
            }
            .into());
        }
        let signatures = bytes
            .chunks(Signature::LEN)
            .map(Signature::from_bytes)
            .collect::<core::result::Result<Vec<_>, _>>()?;
        Ok(Self(signatures))
    }

    /// Wire encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|sig| sig.to_bytes()).collect()
    }

    /// Signatures in aggregate order
    pub fn signatures(&self) -> &[Signature] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sign `digest` with every key and order the results by signer address
pub fn collect_signatures(digest: &Bytes32, keys: &[&SigningKeyPair]) -> Result<AggregatedSignature> {
    let mut signed = keys
        .iter()
        .map(|key| Ok((key.address(), key.sign_digest(digest)?)))
        .collect::<Result<Vec<_>>>()?;
    signed.sort_by_key(|(address, _)| *address);
    Ok(AggregatedSignature(
        signed.into_iter().map(|(_, sig)| sig).collect(),
    ))
}

/// Order independently gathered signatures by their recovered signer
pub fn sort_by_signer(digest: &Bytes32, signatures: &[Signature]) -> Result<AggregatedSignature> {
    let mut recovered = signatures
        .iter()
        .map(|sig| Ok((sig.recover(digest)?, *sig)))
        .collect::<Result<Vec<_>>>()?;
    recovered.sort_by_key(|(address, _)| *address);
    Ok(AggregatedSignature(
        recovered.into_iter().map(|(_, sig)| sig).collect(),
    ))
}

/// Recover every signer of `aggregate` and require them to equal
/// `expected_owners` position by position.
pub fn verify_aggregate(
    digest: &Bytes32,
    aggregate: &AggregatedSignature,
    expected_owners: &[Address],
) -> Result<()> {
    if aggregate.len() != expected_owners.len() {
        return Err(SignatureError::CountMismatch {
            expected: expected_owners.len(),
            actual: aggregate.len(),
        }
        .into());
    }
    for (signature, expected) in aggregate.signatures().iter().zip(expected_owners) {
        assert_signer(expected, digest, signature)?;
    }
    Ok(())
}

/// `verify_aggregate` as a predicate
pub fn verify(digest: &Bytes32, aggregate: &AggregatedSignature, expected_owners: &[Address]) -> bool {
    verify_aggregate(digest, aggregate, expected_owners).is_ok()
}

/// Require `signature` over `digest` to recover to `expected`
pub fn assert_signer(expected: &Address, digest: &Bytes32, signature: &Signature) -> Result<()> {
    let recovered = signature.recover(digest)?;
    if &recovered != expected {
        return Err(SignatureError::SignerMismatch {
            expected: expected.to_string(),
            recovered: recovered.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keccak256;

    fn sorted_owners(keys: &[&SigningKeyPair]) -> Vec<Address> {
        let mut owners: Vec<Address> = keys.iter().map(|k| k.address()).collect();
        owners.sort();
        owners
    }

    #[test]
    fn collected_signatures_verify_against_sorted_owners() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let digest = keccak256(b"free balance v1");
        let aggregate = collect_signatures(&digest, &[&a, &b]).unwrap();
        let owners = sorted_owners(&[&a, &b]);
        assert!(verify(&digest, &aggregate, &owners));

        let mut reversed = owners.clone();
        reversed.reverse();
        assert!(!verify(&digest, &aggregate, &reversed));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let digest = keccak256(b"x");
        assert_eq!(
            collect_signatures(&digest, &[&a, &b]).unwrap(),
            collect_signatures(&digest, &[&b, &a]).unwrap()
        );
    }

    #[test]
    fn sort_by_signer_matches_collection() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let digest = keccak256(b"y");
        let loose = vec![b.sign_digest(&digest).unwrap(), a.sign_digest(&digest).unwrap()];
        assert_eq!(
            sort_by_signer(&digest, &loose).unwrap(),
            collect_signatures(&digest, &[&a, &b]).unwrap()
        );
    }

    #[test]
    fn wrong_count_is_a_mismatch() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let digest = keccak256(b"z");
        let aggregate = collect_signatures(&digest, &[&a]).unwrap();
        let err = verify_aggregate(&digest, &aggregate, &sorted_owners(&[&a, &b])).unwrap_err();
        assert_eq!(err.kind(), "signature_mismatch");
    }

    #[test]
    fn aggregate_bytes_roundtrip() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let digest = keccak256(b"w");
        let aggregate = collect_signatures(&digest, &[&a, &b]).unwrap();
        let bytes = aggregate.to_bytes();
        assert_eq!(bytes.len(), 130);
        assert_eq!(AggregatedSignature::from_bytes(&bytes).unwrap(), aggregate);
        assert!(AggregatedSignature::from_bytes(&bytes[..100]).is_err());
    }
}
