//! On-chain identifiers: wallet addresses and transaction hashes.
//!
//! Both are stored lowercased so checksummed and plain spellings of the same
//! address compare equal.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an on-chain identifier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The value does not start with `0x`.
    #[error("expected a 0x-prefixed value")]
    MissingPrefix,
    /// The hex body has the wrong length.
    #[error("expected {expected} hex characters, got {actual}")]
    WrongLength {
        /// Required number of hex characters.
        expected: usize,
        /// Number of hex characters found.
        actual: usize,
    },
    /// The body contains non-hex characters.
    #[error("value contains non-hex characters")]
    NotHex,
}

fn parse_prefixed_hex(s: &str, expected: usize) -> Result<String, AddressError> {
    let s = s.trim();
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or(AddressError::MissingPrefix)?;

    if body.len() != expected {
        return Err(AddressError::WrongLength {
            expected,
            actual: body.len(),
        });
    }

    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::NotHex);
    }

    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// A 20-byte account address (`0x` + 40 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Number of hex characters after the prefix.
    pub const HEX_LENGTH: usize = 40;

    /// Parse an address.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the value is not a `0x`-prefixed,
    /// 40-character hex string.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        parse_prefixed_hex(s, Self::HEX_LENGTH).map(Self)
    }

    /// Lowercase `0x`-prefixed representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for display (`0x1234…abcd`).
    #[must_use]
    pub fn short(&self) -> String {
        let head = self.0.get(..6).unwrap_or(&self.0);
        let tail = self.0.get(self.0.len().saturating_sub(4)..).unwrap_or("");
        format!("{head}…{tail}")
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

/// A 32-byte transaction hash (`0x` + 64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    /// Number of hex characters after the prefix.
    pub const HEX_LENGTH: usize = 64;

    /// Parse a transaction hash.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the value is not a `0x`-prefixed,
    /// 64-character hex string.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        parse_prefixed_hex(s, Self::HEX_LENGTH).map(Self)
    }

    /// Lowercase `0x`-prefixed representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TxHash {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TxHash {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.0
    }
}
