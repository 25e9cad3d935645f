//! Cryptographic primitives
//!
//! Keccak-256 hashing, secp256k1 signing keys and 65-byte recoverable
//! signatures in the settlement layer's `r ‖ s ‖ v` layout.

use core::fmt;
use core::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand_core::{CryptoRng, OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::errors::{CryptographicError, OffchainError, Result, SignatureError};
use crate::types::{Address, Bytes32};

// ----------------------------------------------------------------------------
// Hashing
// ----------------------------------------------------------------------------

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> Bytes32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Bytes32::new(hasher.finalize().into())
}

/// Settlement-layer address of a public key: low 20 bytes of the Keccak-256
/// of the uncompressed point without its `0x04` tag.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_word(&keccak256(&point.as_bytes()[1..]))
}

// ----------------------------------------------------------------------------
// Recoverable Signature
// ----------------------------------------------------------------------------

/// 65-byte recoverable ECDSA signature
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
    v: u8,
}

impl Signature {
    /// Encoded width
    pub const LEN: usize = 65;

    /// Parse `r ‖ s ‖ v`. Accepts `v` as 0/1 or 27/28.
    pub fn from_bytes(bytes: &[u8]) -> core::result::Result<Self, SignatureError> {
        if bytes.len() != Self::LEN {
            return Err(SignatureError::Malformed {
                reason: format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            });
        }
        let v = match bytes[64] {
            0 | 1 => bytes[64] + 27,
            27 | 28 => bytes[64],
            other => {
                return Err(SignatureError::Malformed {
                    reason: format!("invalid recovery byte {other}"),
                })
            }
        };
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v })
    }

    /// Encode as `r ‖ s ‖ v`
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Recovery parameter (27 or 28)
    pub fn v(&self) -> u8 {
        self.v
    }

    /// Recover the address that produced this signature over `digest`
    pub fn recover(&self, digest: &Bytes32) -> Result<Address> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature = EcdsaSignature::from_slice(&rs).map_err(|_| SignatureError::Malformed {
            reason: "r or s out of range".into(),
        })?;
        let recovery_id =
            RecoveryId::from_byte(self.v - 27).ok_or(CryptographicError::RecoveryFailed)?;
        let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &signature, recovery_id)
            .map_err(|_| CryptographicError::RecoveryFailed)?;
        Ok(address_of(&key))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for Signature {
    type Err = OffchainError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(clean_str)
            .map_err(|_| OffchainError::malformed_message("Invalid hex in Signature"))?;
        Ok(Self::from_bytes(&bytes)?)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
// Signing Key
// ----------------------------------------------------------------------------

/// secp256k1 signing key together with its settlement-layer address
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate a key pair from a caller-provided RNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_signing_key(SigningKey::random(rng))
    }

    /// Restore a key pair from its 32-byte secret scalar
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| CryptographicError::InvalidKeyFormat)?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Address derived from the public key
    pub fn address(&self) -> Address {
        self.address
    }

    /// Secret scalar bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Sign a 32-byte digest without further hashing
    pub fn sign_digest(&self, digest: &Bytes32) -> Result<Signature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|_| CryptographicError::SigningFailed)?;
        let rs = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&rs[..32]);
        s.copy_from_slice(&rs[32..]);
        Ok(Signature {
            r,
            s,
            v: 27 + recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            keccak256(b"").to_string(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn sign_and_recover() {
        let key = SigningKeyPair::generate();
        let digest = keccak256(b"commitment");
        let signature = key.sign_digest(&digest).unwrap();
        assert!(signature.v() == 27 || signature.v() == 28);
        assert_eq!(signature.recover(&digest).unwrap(), key.address());
        assert_ne!(
            signature.recover(&keccak256(b"other")).unwrap(),
            key.address()
        );
    }

    #[test]
    fn known_key_address() {
        // Secret key 1 maps to the well-known generator-point address
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKeyPair::from_bytes(&secret).unwrap();
        assert_eq!(
            key.address().to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn signature_bytes_roundtrip() {
        let key = SigningKeyPair::generate();
        let signature = key.sign_digest(&keccak256(b"x")).unwrap();
        let parsed = Signature::from_bytes(&signature.to_bytes()).unwrap();
        assert_eq!(parsed, signature);
        let text: Signature = signature.to_string().parse().unwrap();
        assert_eq!(text, signature);
    }

    #[test]
    fn rejects_malformed_signatures() {
        assert!(Signature::from_bytes(&[0u8; 64]).is_err());
        let mut bytes = [1u8; 65];
        bytes[64] = 5;
        assert!(Signature::from_bytes(&bytes).is_err());
    }
}
