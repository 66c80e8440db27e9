//! # Types
//!
//! Shared value types used across the engine.
//!
//! - [`Address`]: a 20-byte ledger account / contract address.
//! - [`NetworkId`]: the numeric chain identifier reported by the wallet.
//! - [`BaseUnits`]: integer token amounts in the token's smallest unit.
//! - [`StablecoinDescriptor`]: a recognised stablecoin on one network.
//! - [`VaultName`]: the fixed 32-byte name stored by each vault.
//! - [`FieldErrors`]: validation messages keyed by form field.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::errors::{EngineError, Field};

/// Token amount in base units (e.g. 1 USDC = 1_000_000 at precision 6).
///
/// Ledger words wider than 128 bits saturate to `u128::MAX` on decode.
pub type BaseUnits = u128;

// ── Address ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a `0x`-prefixed 40-digit hex literal at compile time.
    ///
    /// Panics (a compile error in const context) on malformed input.
    pub const fn from_hex_literal(s: &str) -> Self {
        let bytes = s.as_bytes();
        assert!(
            bytes.len() == 42 && bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X'),
            "address literal must be 0x followed by 40 hex digits"
        );
        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            out[i] = (hex_nibble(bytes[2 + 2 * i]) << 4) | hex_nibble(bytes[3 + 2 * i]);
            i += 1;
        }
        Self(out)
    }

    /// An address with every byte set to `b`. Handy for fixtures.
    pub const fn repeat_byte(b: u8) -> Self {
        Self([b; 20])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `0xa53a…3526` style abbreviation for table cells.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in address literal"),
    }
}

/// Text that is not a `0x`-prefixed 20-byte hex address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{input}' is not an address ({reason})")]
pub struct AddressError {
    pub input: String,
    pub reason: String,
}

impl AddressError {
    /// Key this failure to the form field the text came from.
    pub fn for_field(self, field: Field) -> EngineError {
        EngineError::InvalidInput {
            field,
            reason: self.to_string(),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| invalid_address(s, "missing 0x prefix"))?;
        if digits.len() != 40 {
            return Err(invalid_address(s, "expected 40 hex digits"));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(digits, &mut out).map_err(|e| invalid_address(s, &e.to_string()))?;
        Ok(Self(out))
    }
}

fn invalid_address(input: &str, reason: &str) -> AddressError {
    AddressError {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── NetworkId ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub const MAINNET: NetworkId = NetworkId(1);
    pub const OPTIMISM: NetworkId = NetworkId(10);
    pub const POLYGON: NetworkId = NetworkId(137);
    pub const LOCALHOST: NetworkId = NetworkId(1337);
    pub const BASE: NetworkId = NetworkId(8453);
    pub const FOUNDRY: NetworkId = NetworkId(31337);
    pub const ARBITRUM: NetworkId = NetworkId(42161);
    pub const BASE_SEPOLIA: NetworkId = NetworkId(84532);
    pub const ARBITRUM_SEPOLIA: NetworkId = NetworkId(421614);
    pub const SEPOLIA: NetworkId = NetworkId(11155111);
    pub const OPTIMISM_SEPOLIA: NetworkId = NetworkId(11155420);

    /// Local development chains where a freshly deployed mock token replaces
    /// the configured stablecoin address.
    pub fn is_local(&self) -> bool {
        *self == Self::FOUNDRY || *self == Self::LOCALHOST
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── StablecoinDescriptor ─────────────────────────────────────────────

/// A stablecoin recognised on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StablecoinDescriptor {
    pub symbol: String,
    pub name: String,
    pub address: Address,
    /// Decimal precision; the only valid source for unit conversion.
    pub decimals: u8,
}

impl StablecoinDescriptor {
    pub fn new(symbol: &str, name: &str, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            address,
            decimals,
        }
    }

    /// Option label used by currency pickers, e.g. `USD Coin (USDC)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.symbol)
    }
}

// ── VaultName ────────────────────────────────────────────────────────

/// Vault names are stored on the ledger as a zero-padded `bytes32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaultName([u8; 32]);

impl VaultName {
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encode `text` as UTF-8, truncated to 32 bytes on a character boundary
    /// and padded with trailing zeros.
    pub fn encode(text: &str) -> Self {
        let mut end = text.len().min(Self::LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut out = [0u8; 32];
        out[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Decode back to text: trailing zero padding is stripped and any stray
    /// NUL bytes are dropped.
    pub fn decode(&self) -> String {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..end]).replace('\0', "")
    }
}

impl fmt::Debug for VaultName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultName({:?})", self.decode())
    }
}

// ── FieldErrors ──────────────────────────────────────────────────────

/// Validation messages keyed by form field, for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    /// Record `err` under its field. Returns `false` for errors that are not
    /// user-correctable (ledger failures), which are not field errors.
    pub fn record(&mut self, err: &EngineError) -> bool {
        match err.field() {
            Some(field) => {
                self.insert(field, err.to_string());
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, field: Field) {
        self.0.remove(&field);
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
