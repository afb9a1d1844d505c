//! # Engine Configuration
//!
//! Deadlines for collaborator calls and the presentation choices that are
//! not fixed by the chain format itself.

use std::time::Duration;

/// Configuration for the hash-chain engine.
///
/// All values have defaults suitable for a single-node deployment.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Deadline for a single store call (default: 5s).
    pub store_timeout: Duration,

    /// Deadline for one submission to a timestamp authority (default: 30s).
    pub authority_timeout: Duration,

    /// Deadline for one notification delivery (default: 10s).
    pub notifier_timeout: Duration,

    /// Start proofs one entry before the queried position (default: true).
    ///
    /// The preceding entry is redundant for verification; it is kept so a
    /// human auditor sees the digest that was combined with the fingerprint.
    pub include_preceding_entry: bool,

    /// Shorten digests in publication report tables (default: true).
    pub short_report_digests: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            authority_timeout: Duration::from_secs(30),
            notifier_timeout: Duration::from_secs(10),
            include_preceding_entry: true,
            short_report_digests: true,
        }
    }
}

impl ChainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_authority_timeout(mut self, timeout: Duration) -> Self {
        self.authority_timeout = timeout;
        self
    }

    pub fn with_notifier_timeout(mut self, timeout: Duration) -> Self {
        self.notifier_timeout = timeout;
        self
    }

    pub fn with_preceding_entry(mut self, include: bool) -> Self {
        self.include_preceding_entry = include;
        self
    }

    pub fn with_short_report_digests(mut self, short: bool) -> Self {
        self.short_report_digests = short;
        self
    }
}

/// Key prefixes for the key-value store.
///
/// Positions and arrival markers are big-endian so that lexicographic key
/// order equals numeric order; the highest position is the last key under
/// its prefix.
#[derive(Debug, Clone, Copy)]
pub enum KeyPrefix {
    /// Hash record: `h:{fingerprint hex}` -> HashRecord
    Hash,
    /// Pending item: `p:{arrival be}{fingerprint}` -> PendingItem
    Pending,
    /// Chain entry: `c:{position be}` -> ChainEntry
    Chain,
    /// Publication: `u:{authority}/{position be}` -> PublicationRecord
    Publication,
    /// Engine state: `m:{name}`
    Meta,
}

impl KeyPrefix {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            KeyPrefix::Hash => b"h:",
            KeyPrefix::Pending => b"p:",
            KeyPrefix::Chain => b"c:",
            KeyPrefix::Publication => b"u:",
            KeyPrefix::Meta => b"m:",
        }
    }

    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.as_bytes().to_vec();
        key.extend_from_slice(suffix);
        key
    }

    pub fn hash_key(fingerprint_hex: &str) -> Vec<u8> {
        KeyPrefix::Hash.key(fingerprint_hex.as_bytes())
    }

    pub fn pending_key(arrival: u64, fingerprint: &[u8]) -> Vec<u8> {
        let mut suffix = arrival.to_be_bytes().to_vec();
        suffix.extend_from_slice(fingerprint);
        KeyPrefix::Pending.key(&suffix)
    }

    pub fn chain_key(position: u64) -> Vec<u8> {
        KeyPrefix::Chain.key(&position.to_be_bytes())
    }

    /// Reason chain extension is halted. Present only while halted.
    pub fn halt_key() -> Vec<u8> {
        KeyPrefix::Meta.key(b"halt")
    }

    pub fn publication_prefix(authority: &str) -> Vec<u8> {
        let mut prefix = KeyPrefix::Publication.key(authority.as_bytes());
        prefix.push(b'/');
        prefix
    }

    pub fn publication_key(authority: &str, position: u64) -> Vec<u8> {
        let mut key = Self::publication_prefix(authority);
        key.extend_from_slice(&position.to_be_bytes());
        key
    }
}
