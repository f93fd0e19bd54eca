//! Ledger account identifiers (`0x` + 20 bytes, hex).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ViewError;

/// A 20-byte ledger account.
///
/// Parsing accepts any hex casing; the canonical form is lowercase, so two
/// identifiers that differ only in checksum casing compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId([u8; 20]);

impl AccountId {
    #[cfg(test)]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// `0x1234...cdef`-style abbreviation used in donor rows.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..5], &full[full.len() - 5..])
    }
}

impl FromStr for AccountId {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ViewError::InvalidAccount(format!("missing 0x prefix: {s}")))?;
        if digits.len() != 40 {
            return Err(ViewError::InvalidAccount(format!(
                "expected 40 hex digits, got {}",
                digits.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| ViewError::InvalidAccount(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
