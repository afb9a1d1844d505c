//! # Fingerprint Codec
//!
//! Converts between the canonical uppercase hex form of a fingerprint and its
//! raw bytes. The canonical hex form is the lookup key of a hash record.

use crate::domain::errors::ChainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw digest bytes supplied by a caller.
///
/// The bytes are of arbitrary origin and length; the engine never interprets
/// them beyond concatenation into the chain.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Parse a fingerprint from hex text.
    ///
    /// Accepts upper and lower case digits. Rejects empty input, any non-hex
    /// character and odd-length input.
    pub fn decode(text: &str) -> Result<Self, ChainError> {
        if text.is_empty() {
            return Err(ChainError::InvalidFormat {
                reason: "fingerprint is empty".to_string(),
            });
        }
        if text.len() % 2 != 0 {
            return Err(ChainError::InvalidFormat {
                reason: format!("odd number of hex digits ({})", text.len()),
            });
        }
        let bytes = hex::decode(text).map_err(|e| ChainError::InvalidFormat {
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Canonical uppercase hex form.
    pub fn encode(&self) -> String {
        hex::encode_upper(&self.0)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.encode())
    }
}

/// Uppercase hex of arbitrary bytes, the form used for digests and linking
/// inputs in proofs and reports.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Shorten a hex string to `ABCD...WXYZ` for human-readable reports.
///
/// Strings of eight characters or fewer are returned unchanged.
pub fn short_hex(hex: &str) -> String {
    if hex.len() <= 8 {
        return hex.to_string();
    }
    format!("{}...{}", &hex[..4], &hex[hex.len() - 4..])
}
