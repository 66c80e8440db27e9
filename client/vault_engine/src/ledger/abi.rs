//! Minimal ABI encoding for the handful of static-typed calls the engine
//! makes, plus decoding of single-word and `address[]` return values.

use sha3::{Digest, Keccak256};

use crate::errors::{EngineError, Result};
use crate::types::{Address, BaseUnits, VaultName};

const WORD: usize = 32;

/// A static ABI argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(BaseUnits),
    /// `type(uint256).max`
    UintMax,
    Bytes32([u8; 32]),
}

impl From<Address> for Token {
    fn from(a: Address) -> Self {
        Token::Address(a)
    }
}

impl From<VaultName> for Token {
    fn from(n: VaultName) -> Self {
        Token::Bytes32(*n.as_bytes())
    }
}

impl Token {
    fn encode_into(&self, out: &mut Vec<u8>) {
        let mut word = [0u8; WORD];
        match self {
            Token::Address(a) => word[12..].copy_from_slice(a.as_bytes()),
            Token::Uint(v) => word[16..].copy_from_slice(&v.to_be_bytes()),
            Token::UintMax => word = [0xff; WORD],
            Token::Bytes32(b) => word = *b,
        }
        out.extend_from_slice(&word);
    }
}

/// First four bytes of `keccak256(signature)`, e.g. `balanceOf(address)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + WORD * args.len());
    out.extend_from_slice(&selector(signature));
    for arg in args {
        arg.encode_into(&mut out);
    }
    out
}

pub fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex_data(data: &str) -> Result<Vec<u8>> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits).map_err(|e| EngineError::LedgerRead(format!("bad hex data '{data}': {e}")))
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * WORD;
    data.get(start..start + WORD).ok_or_else(|| {
        EngineError::LedgerRead(format!(
            "return data too short: {} bytes, need word {index}",
            data.len()
        ))
    })
}

/// Decode a `uint256` word, saturating values wider than 128 bits.
fn uint_from_word(word: &[u8]) -> BaseUnits {
    if word[..16].iter().any(|b| *b != 0) {
        return BaseUnits::MAX;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    BaseUnits::from_be_bytes(low)
}

fn address_from_word(word: &[u8]) -> Address {
    let mut raw = [0u8; 20];
    raw.copy_from_slice(&word[12..]);
    Address::from_bytes(raw)
}

pub fn decode_uint(data: &[u8]) -> Result<BaseUnits> {
    word_at(data, 0).map(uint_from_word)
}

pub fn decode_address(data: &[u8]) -> Result<Address> {
    word_at(data, 0).map(address_from_word)
}

pub fn decode_bytes32(data: &[u8]) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    out.copy_from_slice(word_at(data, 0)?);
    Ok(out)
}

/// Decode a single dynamic `address[]` return value.
pub fn decode_address_array(data: &[u8]) -> Result<Vec<Address>> {
    let offset = usize::try_from(uint_from_word(word_at(data, 0)?))
        .map_err(|_| EngineError::LedgerRead("array offset out of range".to_string()))?;
    if offset % WORD != 0 {
        return Err(EngineError::LedgerRead(format!("unaligned array offset {offset}")));
    }
    let head = offset / WORD;
    let len = usize::try_from(uint_from_word(word_at(data, head)?))
        .map_err(|_| EngineError::LedgerRead("array length out of range".to_string()))?;
    (0..len)
        .map(|i| word_at(data, head + 1 + i).map(address_from_word))
        .collect()
}

/// Encode an `address[]` return value; the inverse of
/// [`decode_address_array`], used by fixtures.
pub fn encode_address_array(items: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD * (2 + items.len()));
    Token::Uint(WORD as BaseUnits).encode_into(&mut out);
    Token::Uint(items.len() as BaseUnits).encode_into(&mut out);
    for item in items {
        Token::Address(*item).encode_into(&mut out);
    }
    out
}
