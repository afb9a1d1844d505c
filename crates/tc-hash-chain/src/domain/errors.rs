//! # Domain Errors
//!
//! Error types for the hash-chain engine.
//!
//! | Variant | Caller sees | Retried by |
//! |---------|-------------|------------|
//! | `InvalidFormat` | yes | never |
//! | `NotFound` | yes | never |
//! | `UpstreamUnavailable` | scheduler | next scheduled run |
//! | `PersistenceFault` | yes | caller / next run |
//! | `Timeout` | yes | caller / next run |
//! | `InvariantViolation` | yes | never (halts extension) |
//!
//! "Already exists" is not an error: it is [`SubmitOutcome::AlreadyExists`].
//!
//! [`SubmitOutcome::AlreadyExists`]: crate::ports::inbound::SubmitOutcome

use thiserror::Error;

/// Errors surfaced by the hash-chain engine.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Caller input is not an even-length, non-empty hex string.
    #[error("Invalid fingerprint format: {reason}")]
    InvalidFormat { reason: String },

    /// No hash record exists for this fingerprint.
    #[error("Fingerprint not found: {fingerprint}")]
    NotFound { fingerprint: String },

    /// The timestamp authority or notifier failed. Nothing was committed.
    #[error("Upstream {service} unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// The store is unavailable or returned inconsistent data.
    #[error("Persistence fault: {reason}")]
    PersistenceFault { reason: String },

    /// A store or authority call exceeded its deadline.
    #[error("Operation '{operation}' timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Chain contiguity or linking check failed on read.
    #[error("Chain invariant violated at position {position}: {reason}")]
    InvariantViolation { position: u64, reason: String },

    /// Extension is refused until the chain is manually reconciled.
    #[error("Chain extension halted awaiting manual reconciliation: {reason}")]
    ChainHalted { reason: String },

    /// Another run currently holds the writer lock.
    #[error("Another {job} run is in progress")]
    WriterBusy { job: &'static str },

    /// No authority with this identifier is registered.
    #[error("Unknown timestamp authority: {authority}")]
    UnknownAuthority { authority: String },
}

impl ChainError {
    /// Whether the next scheduled run may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::UpstreamUnavailable { .. }
                | ChainError::PersistenceFault { .. }
                | ChainError::Timeout { .. }
                | ChainError::WriterBusy { .. }
        )
    }
}

/// Result type for hash-chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Key-value store errors.
#[derive(Debug, Clone, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },

    /// A stored value could not be encoded or decoded.
    #[error("KV store serialization error: {message}")]
    Serialization { message: String },
}

impl From<KVStoreError> for ChainError {
    fn from(err: KVStoreError) -> Self {
        ChainError::PersistenceFault {
            reason: err.to_string(),
        }
    }
}

impl From<bincode::Error> for KVStoreError {
    fn from(err: bincode::Error) -> Self {
        KVStoreError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::InvariantViolation {
            position: 7,
            reason: "linking input does not start with previous digest".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("position 7"));
        assert!(msg.contains("previous digest"));
    }

    #[test]
    fn test_kv_error_conversion() {
        let kv_err = KVStoreError::IOError {
            message: "disk failure".to_string(),
        };
        let err: ChainError = kv_err.into();

        match err {
            ChainError::PersistenceFault { reason } => assert!(reason.contains("disk failure")),
            other => panic!("Expected PersistenceFault, got {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Timeout {
            operation: "store.get",
            after_ms: 10
        }
        .is_transient());
        assert!(!ChainError::InvariantViolation {
            position: 1,
            reason: String::new()
        }
        .is_transient());
        assert!(!ChainError::InvalidFormat {
            reason: String::new()
        }
        .is_transient());
    }
}
