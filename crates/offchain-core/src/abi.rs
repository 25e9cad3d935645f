//! Contract ABI encoding
//!
//! Standard head/tail encoding for calls and identity structs, the packed
//! encoding used for signed digests, and a word-level reader for decoding
//! the handful of calls the engine itself needs to inspect.

use crate::crypto::keccak256;
use crate::errors::{OffchainError, Result};
use crate::types::{Address, Bytes32, U256};

/// ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    /// `uint8`, one word in standard encoding and one byte when packed
    Uint8(u8),
    FixedBytes(Bytes32),
    Bool(bool),
    Bytes(Vec<u8>),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    /// Unsigned integer from a `u64`
    pub fn uint(value: u64) -> Self {
        Token::Uint(U256::from(value))
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::Array(_) => true,
            Token::Tuple(tokens) => tokens.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Token::Tuple(tokens) if !self.is_dynamic() => tokens.iter().map(Token::head_size).sum(),
            _ => 32,
        }
    }
}

// ----------------------------------------------------------------------------
// Standard Encoding
// ----------------------------------------------------------------------------

fn word_from_uint(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.write_as_big_endian(&mut word);
    word
}

fn word_from_usize(value: usize) -> [u8; 32] {
    word_from_uint(U256::from(value))
}

fn pad_right(data: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(data);
    let rem = data.len() % 32;
    if rem != 0 {
        out.extend(core::iter::repeat(0u8).take(32 - rem));
    }
}

fn encode_sequence(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&word_from_usize(head_len + tail.len()));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }
    head.extend(tail);
    head
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(address) => {
            let mut word = vec![0u8; 12];
            word.extend_from_slice(address.as_bytes());
            word
        }
        Token::Uint(value) => word_from_uint(*value).to_vec(),
        Token::Uint8(value) => word_from_usize(*value as usize).to_vec(),
        Token::FixedBytes(bytes) => bytes.as_bytes().to_vec(),
        Token::Bool(value) => word_from_usize(*value as usize).to_vec(),
        Token::Bytes(bytes) => {
            let mut out = word_from_usize(bytes.len()).to_vec();
            pad_right(bytes, &mut out);
            out
        }
        Token::Array(items) => {
            let mut out = word_from_usize(items.len()).to_vec();
            out.extend(encode_sequence(items));
            out
        }
        Token::Tuple(items) => encode_sequence(items),
    }
}

/// `abi.encode(tokens...)`
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    encode_sequence(tokens)
}

/// First four bytes of the Keccak-256 of a canonical function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[..4]);
    out
}

/// Calldata for `signature` applied to `args`
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

// ----------------------------------------------------------------------------
// Packed Encoding
// ----------------------------------------------------------------------------

/// `abi.encodePacked(tokens...)`
pub fn encode_packed(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    for token in tokens {
        match token {
            Token::Address(address) => out.extend_from_slice(address.as_bytes()),
            Token::Uint(value) => out.extend_from_slice(&word_from_uint(*value)),
            Token::Uint8(value) => out.push(*value),
            Token::FixedBytes(bytes) => out.extend_from_slice(bytes.as_bytes()),
            Token::Bool(value) => out.push(*value as u8),
            Token::Bytes(bytes) => out.extend_from_slice(bytes),
            // array elements are padded to a full word even when packed
            Token::Array(items) => {
                for item in items {
                    out.extend(encode_token(item));
                }
            }
            Token::Tuple(items) => out.extend(encode_packed(items)),
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Word-level reader over ABI-encoded data
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Reader over plain `abi.encode` output
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Reader over calldata, checking and skipping the selector
    pub fn for_call(data: &'a [u8], signature: &str) -> Result<Self> {
        if data.len() < 4 || data[..4] != selector(signature) {
            return Err(OffchainError::malformed_message(format!(
                "calldata is not a call to {signature}"
            )));
        }
        Ok(Self { data: &data[4..] })
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(32)
            .ok_or_else(|| OffchainError::malformed_message("ABI offset overflow"))?;
        self.data
            .get(offset..end)
            .ok_or_else(|| OffchainError::malformed_message("ABI data truncated"))
    }

    fn head(index: usize) -> Result<usize> {
        index
            .checked_mul(32)
            .ok_or_else(|| OffchainError::malformed_message("ABI index overflow"))
    }

    /// Head word `index` as a 32-byte value
    pub fn fixed_bytes(&self, index: usize) -> Result<Bytes32> {
        let word = self.word_at(Self::head(index)?)?;
        Bytes32::from_slice(word).ok_or_else(|| OffchainError::malformed_message("bad word"))
    }

    /// Head word `index` as an unsigned integer
    pub fn uint(&self, index: usize) -> Result<U256> {
        Ok(U256::from_big_endian(self.word_at(Self::head(index)?)?))
    }

    /// Head word `index` as an address
    pub fn address(&self, index: usize) -> Result<Address> {
        Ok(Address::from_word(&self.fixed_bytes(index)?))
    }

    /// Dynamic `bytes` referenced by the offset in head word `index`
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>> {
        let offset = self.offset(index)?;
        let len = usize::try_from(U256::from_big_endian(self.word_at(offset)?))
            .map_err(|_| OffchainError::malformed_message("bytes length overflow"))?;
        let start = offset + 32;
        let end = start
            .checked_add(len)
            .ok_or_else(|| OffchainError::malformed_message("bytes length overflow"))?;
        self.data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| OffchainError::malformed_message("bytes truncated"))
    }

    /// Reader positioned at the dynamic tuple referenced by head word `index`
    pub fn tuple(&self, index: usize) -> Result<Decoder<'a>> {
        let offset = self.offset(index)?;
        self.data
            .get(offset..)
            .map(Decoder::new)
            .ok_or_else(|| OffchainError::malformed_message("tuple truncated"))
    }

    fn offset(&self, index: usize) -> Result<usize> {
        usize::try_from(self.uint(index)?)
            .map_err(|_| OffchainError::malformed_message("offset overflow"))
    }
}
