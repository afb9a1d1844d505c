//! # Domain Entities
//!
//! Records persisted by the ledger.
//!
//! | Entity | Written by | Mutability |
//! |--------|------------|------------|
//! | `HashRecord` | Ingestion, Extender, Publisher | set-once optional fields |
//! | `PendingItem` | Ingestion | deleted once by Extender |
//! | `ChainEntry` | Extender | immutable |
//! | `PublicationRecord` | Publisher | immutable |

use crate::domain::fingerprint::{to_hex, Fingerprint};
use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// 1-based index of an entry in the hash chain.
pub type ChainPosition = u64;

/// SHA-256 output.
pub type Digest = [u8; 32];

/// Per fingerprint membership record, keyed by canonical hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Canonical uppercase hex of the fingerprint.
    pub fingerprint_hex: String,
    /// Set exactly once when the fingerprint is chained.
    pub chain_position: Option<ChainPosition>,
    /// Tip position at the time the covering anchor was published.
    pub published_position: Option<ChainPosition>,
}

impl HashRecord {
    /// A freshly ingested, not yet chained record.
    pub fn new(fingerprint: &Fingerprint) -> Self {
        Self {
            fingerprint_hex: fingerprint.encode(),
            chain_position: None,
            published_position: None,
        }
    }

    pub fn is_chained(&self) -> bool {
        self.chain_position.is_some()
    }

    pub fn is_published(&self) -> bool {
        self.published_position.is_some()
    }
}

/// Issuance-ordered marker assigned to each pending item.
///
/// Nanoseconds since the epoch, forced strictly increasing per issuer. Ties
/// across issuers are broken by the fingerprint in the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArrivalMarker(pub u64);

/// A fingerprint waiting to be chained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub fingerprint: Fingerprint,
    pub arrival: ArrivalMarker,
    pub queued_at: Timestamp,
}

/// One link of the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub position: ChainPosition,
    pub item_fingerprint: Fingerprint,
    /// `previous digest ‖ item fingerprint` (empty previous digest at position 1).
    pub linking_input: Vec<u8>,
    /// `SHA-256(linking_input)`.
    pub digest: Digest,
    /// When the originating pending item was queued.
    pub queued_at: Timestamp,
}

impl ChainEntry {
    pub fn digest_hex(&self) -> String {
        to_hex(&self.digest)
    }

    pub fn linking_input_hex(&self) -> String {
        to_hex(&self.linking_input)
    }
}

/// A successful anchor of the chain tip at one authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub authority: String,
    /// Tip position at publish time.
    pub position: ChainPosition,
    /// Uppercase hex of the digest submitted to the authority.
    pub digest_hex: String,
    pub published_at: Timestamp,
    /// Identifier assigned by the authority, if it returned one.
    pub receipt_id: Option<String>,
}

/// Point-in-time summary of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    pub tip_position: Option<ChainPosition>,
    pub tip_digest: Option<String>,
    pub pending_count: usize,
    pub halted: bool,
    pub halt_reason: Option<String>,
}
