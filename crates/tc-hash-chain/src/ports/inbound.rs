//! # Inbound Ports (Driving Ports)
//!
//! The transport-agnostic API of the hash-chain engine. Ingestion and
//! queries are called by external callers at any rate; `process_pending`
//! and `publish_tip` are called by a scheduler.

use crate::domain::entities::{ChainPosition, LedgerStatus};
use crate::domain::errors::ChainResult;
use crate::domain::proof::ValidationResult;
use async_trait::async_trait;

/// Outcome of a fingerprint submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New fingerprint, queued for chaining.
    Accepted,
    /// Seen before. No state changed.
    AlreadyExists,
}

/// Outcome of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The tip at `position` was anchored.
    Published { position: ChainPosition },
    /// Nothing to anchor: empty chain, or the tip is already anchored.
    NoChange,
}

/// Primary API for the hash-chain engine.
#[async_trait]
pub trait HashChainApi: Send + Sync {
    /// Validate, deduplicate and enqueue a fingerprint.
    ///
    /// ## Errors
    ///
    /// - `InvalidFormat`: not a non-empty, even-length hex string
    /// - `PersistenceFault` / `Timeout`: store unavailable
    async fn submit(&self, fingerprint_hex: &str) -> ChainResult<SubmitOutcome>;

    /// Chain every pending fingerprint in arrival order.
    ///
    /// Returns the number of entries appended. Safe to re-run after a
    /// partial failure.
    ///
    /// ## Errors
    ///
    /// - `ChainHalted`: a previous run detected an invariant violation
    /// - `InvariantViolation`: the stored tip fails its linking check
    /// - `WriterBusy`: another run is extending the chain
    async fn process_pending(&self) -> ChainResult<usize>;

    /// Anchor the current tip at `authority`.
    ///
    /// ## Errors
    ///
    /// - `UnknownAuthority`: no authority registered under that name
    /// - `UpstreamUnavailable` / `Timeout`: the authority rejected or did not
    ///   answer; nothing was committed
    async fn publish_tip(&self, authority: &str) -> ChainResult<PublishOutcome>;

    /// Membership state and proof for a fingerprint.
    ///
    /// ## Errors
    ///
    /// - `InvalidFormat`: malformed hex
    /// - `NotFound`: never submitted
    /// - `InvariantViolation`: the stored proof range is not contiguous
    async fn get_validation_chain(&self, fingerprint_hex: &str) -> ChainResult<ValidationResult>;

    /// Tip, pending count and halt state.
    async fn status(&self) -> ChainResult<LedgerStatus>;

    /// Operator action after manual reconciliation: allow extension again.
    ///
    /// The whole chain is re-verified first; the halt is only cleared, in
    /// memory and in the ledger, when every entry and link checks out.
    ///
    /// ## Errors
    ///
    /// - `InvariantViolation`: the chain is still broken; the halt stays
    async fn reset_halt(&self) -> ChainResult<()>;
}
