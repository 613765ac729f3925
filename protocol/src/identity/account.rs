//! # Account Identifiers
//!
//! Every participant in the registry is addressed by a 20-byte account
//! identifier, written as `0x` followed by 40 hex digits. This is the same
//! shape wallets hand out, so identifiers pasted from a wallet UI parse as-is.
//!
//! ```text
//! 0x5B38Da6a701c568545dCfcB03FcB875f56beddC4   (input, any case)
//!     -> [u8; 20]
//!     -> 0x5b38da6a701c568545dcfcb03fcb875f56beddc4   (canonical output)
//! ```
//!
//! Parsing is strict: a missing prefix, a wrong length, or a non-hex digit
//! is rejected instead of being silently coerced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an account identifier in bytes.
pub const ACCOUNT_ID_LENGTH: usize = 20;

/// Prefix of the textual account form.
const ACCOUNT_PREFIX: &str = "0x";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while parsing an [`AccountId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountIdError {
    /// The string does not start with `0x`.
    #[error("account id must start with 0x: {0}")]
    MissingPrefix(String),

    /// The hex payload has the wrong number of digits.
    #[error("account id must have {expected} hex digits, got {got}")]
    InvalidLength {
        /// Expected number of hex digits.
        expected: usize,
        /// Number of hex digits found.
        got: usize,
    },

    /// The payload contains a non-hex character.
    #[error("account id is not valid hex: {0}")]
    InvalidHex(String),
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A registry account: the caller of an operation, the subject of a
/// credential, or a verifier granted access to one.
///
/// Ordering and hashing follow the raw bytes, so two spellings of the same
/// account (upper/lower case hex) compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; ACCOUNT_ID_LENGTH]);

impl AccountId {
    /// Wrap raw account bytes.
    pub const fn from_bytes(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse the textual `0x...` form.
    pub fn parse(s: &str) -> Result<Self, AccountIdError> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix(ACCOUNT_PREFIX)
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AccountIdError::MissingPrefix(trimmed.to_string()))?;

        if hex_part.len() != ACCOUNT_ID_LENGTH * 2 {
            return Err(AccountIdError::InvalidLength {
                expected: ACCOUNT_ID_LENGTH * 2,
                got: hex_part.len(),
            });
        }

        let mut bytes = [0u8; ACCOUNT_ID_LENGTH];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| AccountIdError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Raw account bytes. Used as a storage key prefix.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }

    /// Canonical lowercase `0x...` form.
    pub fn to_hex(&self) -> String {
        format!("{}{}", ACCOUNT_PREFIX, hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            AccountId::parse(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; ACCOUNT_ID_LENGTH]>::deserialize(deserializer)?;
            Ok(AccountId(bytes))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
