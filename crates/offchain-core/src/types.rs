//! Core types for the off-chain protocol engine
//!
//! This module defines the fundamental value types used throughout the protocol,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::OffchainError;

pub use primitive_types::U256;

// ----------------------------------------------------------------------------
// Fixed-width Byte Strings
// ----------------------------------------------------------------------------

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width in bytes
            pub const LEN: usize = $len;

            /// All-zero value
            pub const ZERO: Self = Self([0u8; $len]);

            /// Create from raw bytes
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Create from a slice of exactly the right width
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let array: [u8; $len] = bytes.try_into().ok()?;
                Some(Self(array))
            }

            /// Get the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether every byte is zero
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = OffchainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let clean_str = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(clean_str).map_err(|_| {
                    OffchainError::malformed_message(concat!("Invalid hex in ", stringify!($name)))
                })?;
                Self::from_slice(&bytes).ok_or_else(|| {
                    OffchainError::malformed_message(concat!(
                        "Wrong length for ",
                        stringify!($name)
                    ))
                })
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 20-byte settlement-layer account address.
    ///
    /// Ordering is byte-lexicographic, which matches numeric ordering of the
    /// address, so sorting a list of owners yields the order the multisig
    /// contract checks signatures in.
    Address,
    20
);

fixed_bytes!(
    /// 32-byte digest or identity hash
    Bytes32,
    32
);

impl Address {
    /// Take the low 20 bytes of a 32-byte word
    pub fn from_word(word: &Bytes32) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word.as_bytes()[12..]);
        Self(bytes)
    }
}

/// Token address used to denote the native asset (ETH)
pub const ETH_TOKEN_ADDRESS: Address = Address::ZERO;

/// Wei in one ether
pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Amount of wei in `whole` ether
pub fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::from(WEI_PER_ETHER)
}

/// Amount of wei in `thousandths` milli-ether
pub fn milli_ether(thousandths: u64) -> U256 {
    U256::from(thousandths) * U256::from(WEI_PER_ETHER / 1000)
}

// ----------------------------------------------------------------------------
// Variable-length Bytes
// ----------------------------------------------------------------------------

/// Opaque byte string with a `0x` hex text form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    /// Create from a byte vector
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Consume into the inner vector
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl FromStr for Bytes {
    type Err = OffchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(clean_str)
            .map(Self)
            .map_err(|_| OffchainError::malformed_message("Invalid hex in Bytes"))
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
