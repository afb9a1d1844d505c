//! # Validation Chains
//!
//! The proof returned for a fingerprint: every entry from (just before) the
//! fingerprint's chain position up to the anchored tip, each carrying the
//! linking input a verifier hashes to reproduce the entry's digest.
//!
//! Serialized field names are part of the public contract:
//!
//! ```json
//! {
//!   "hash": "AAAA",
//!   "includedInChain": true,
//!   "validated": true,
//!   "chainId": 1,
//!   "validatedChainId": 2,
//!   "validatedHash": "…",
//!   "validationChain": [
//!     { "chainId": 1, "chainHash": "…", "hash": "AAAA", "hashedValue": "AAAA" }
//!   ]
//! }
//! ```

use crate::domain::chain::hash;
use crate::domain::entities::{ChainEntry, ChainPosition};
use crate::domain::fingerprint::to_hex;
use serde::{Deserialize, Serialize};

/// One step of a validation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationChainEntry {
    /// Chain position.
    pub chain_id: ChainPosition,
    /// Entry digest.
    pub chain_hash: String,
    /// Item fingerprint chained at this position.
    pub hash: String,
    /// Linking input that was hashed.
    pub hashed_value: String,
}

impl From<&ChainEntry> for ValidationChainEntry {
    fn from(entry: &ChainEntry) -> Self {
        Self {
            chain_id: entry.position,
            chain_hash: entry.digest_hex(),
            hash: entry.item_fingerprint.encode(),
            hashed_value: entry.linking_input_hex(),
        }
    }
}

/// Membership state and, once anchored, the proof for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub hash: String,
    pub included_in_chain: bool,
    pub validated: bool,
    pub chain_id: Option<ChainPosition>,
    pub validated_chain_id: Option<ChainPosition>,
    pub validated_hash: Option<String>,
    pub validation_chain: Option<Vec<ValidationChainEntry>>,
}

impl ValidationResult {
    /// Known but waiting to be chained.
    pub fn pending(hash: String) -> Self {
        Self {
            hash,
            included_in_chain: false,
            validated: false,
            chain_id: None,
            validated_chain_id: None,
            validated_hash: None,
            validation_chain: None,
        }
    }

    /// Chained, but no anchor covers it yet.
    pub fn chained(hash: String, chain_id: ChainPosition) -> Self {
        Self {
            included_in_chain: true,
            chain_id: Some(chain_id),
            ..Self::pending(hash)
        }
    }

    /// Chained and covered by the anchor at `validated_chain_id`.
    ///
    /// `entries` must be ordered by position and end at the anchored tip.
    pub fn validated(
        hash: String,
        chain_id: ChainPosition,
        validated_chain_id: ChainPosition,
        entries: &[ChainEntry],
    ) -> Self {
        let validation_chain: Vec<ValidationChainEntry> =
            entries.iter().map(ValidationChainEntry::from).collect();
        let validated_hash = validation_chain.last().map(|e| e.chain_hash.clone());

        Self {
            hash,
            included_in_chain: true,
            validated: true,
            chain_id: Some(chain_id),
            validated_chain_id: Some(validated_chain_id),
            validated_hash,
            validation_chain: Some(validation_chain),
        }
    }

    /// Recompute the proof from its own contents, without the ledger.
    ///
    /// Checks that every `hashedValue` hashes to its `chainHash`, that each
    /// step embeds the previous `chainHash` followed by its own `hash`, that
    /// the queried fingerprint is chained at `chainId`, and that the last
    /// `chainHash` is `validatedHash`.
    pub fn verify(&self) -> bool {
        let (Some(chain), Some(validated_hash), Some(chain_id), Some(validated_id)) = (
            self.validation_chain.as_ref(),
            self.validated_hash.as_ref(),
            self.chain_id,
            self.validated_chain_id,
        ) else {
            return false;
        };

        let mut previous: Option<&ValidationChainEntry> = None;
        for step in chain {
            let (Ok(input), Ok(fingerprint)) =
                (hex::decode(&step.hashed_value), hex::decode(&step.hash))
            else {
                return false;
            };
            if to_hex(&hash(&input)) != step.chain_hash || !input.ends_with(&fingerprint) {
                return false;
            }
            if let Some(prev) = previous {
                let Ok(prev_digest) = hex::decode(&prev.chain_hash) else {
                    return false;
                };
                if step.chain_id != prev.chain_id + 1 || !input.starts_with(&prev_digest) {
                    return false;
                }
            }
            previous = Some(step);
        }

        let covers_item = chain
            .iter()
            .any(|step| step.chain_id == chain_id && step.hash == self.hash);
        match previous {
            Some(last) => {
                covers_item && last.chain_id == validated_id && &last.chain_hash == validated_hash
            }
            None => false,
        }
    }
}
