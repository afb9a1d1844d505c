//! # Chain Linking
//!
//! Pure functions that build and check chain entries. No I/O.
//!
//! ```text
//! entry[1].linking_input = fp[1]
//! entry[p].linking_input = entry[p-1].digest ‖ fp[p]
//! entry[p].digest        = SHA-256(entry[p].linking_input)
//! ```

use crate::domain::entities::{ChainEntry, ChainPosition, Digest, PendingItem};
use crate::domain::errors::ChainError;
use sha2::{Digest as _, Sha256};

/// SHA-256 of `data`.
pub fn hash(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Build the entry that follows `previous` (or the first entry when `None`).
pub fn link(previous: Option<&ChainEntry>, item: &PendingItem) -> ChainEntry {
    let (previous_digest, previous_position): (&[u8], ChainPosition) = match previous {
        Some(entry) => (&entry.digest, entry.position),
        None => (&[], 0),
    };

    let mut linking_input = Vec::with_capacity(previous_digest.len() + item.fingerprint.len());
    linking_input.extend_from_slice(previous_digest);
    linking_input.extend_from_slice(item.fingerprint.as_bytes());

    ChainEntry {
        position: previous_position + 1,
        item_fingerprint: item.fingerprint.clone(),
        digest: hash(&linking_input),
        linking_input,
        queued_at: item.queued_at,
    }
}

/// Check an entry in isolation: position, digest, and the fingerprint suffix.
pub fn verify_entry(entry: &ChainEntry) -> Result<(), ChainError> {
    if entry.position == 0 {
        return Err(violation(entry.position, "position 0 is not a valid chain position"));
    }
    if hash(&entry.linking_input) != entry.digest {
        return Err(violation(entry.position, "digest does not match linking input"));
    }
    if !entry
        .linking_input
        .ends_with(entry.item_fingerprint.as_bytes())
    {
        return Err(violation(entry.position, "linking input does not end with item fingerprint"));
    }
    if entry.position == 1 && entry.linking_input.len() != entry.item_fingerprint.len() {
        return Err(violation(1, "first entry must have an empty previous digest"));
    }
    Ok(())
}

/// Check that `entry` directly follows `previous`.
pub fn verify_link(previous: &ChainEntry, entry: &ChainEntry) -> Result<(), ChainError> {
    if entry.position != previous.position + 1 {
        return Err(violation(
            entry.position,
            &format!("gap after position {}", previous.position),
        ));
    }
    let fingerprint = entry.item_fingerprint.as_bytes();
    let expected_len = previous.digest.len() + fingerprint.len();
    if entry.linking_input.len() != expected_len
        || entry.linking_input[..previous.digest.len()] != previous.digest
    {
        return Err(violation(
            entry.position,
            "linking input does not start with previous digest",
        ));
    }
    Ok(())
}

/// Check a run of entries ordered by position: each entry on its own, and
/// each consecutive pair linked.
pub fn verify_segment(entries: &[ChainEntry]) -> Result<(), ChainError> {
    for entry in entries {
        verify_entry(entry)?;
    }
    for pair in entries.windows(2) {
        verify_link(&pair[0], &pair[1])?;
    }
    Ok(())
}

fn violation(position: ChainPosition, reason: &str) -> ChainError {
    ChainError::InvariantViolation {
        position,
        reason: reason.to_string(),
    }
}
