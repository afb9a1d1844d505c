//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the hash-chain engine requires the host application to
//! provide: a key-value store, timestamp authorities, a notifier and a
//! clock.

use crate::domain::entities::Timestamp;
use crate::domain::errors::{ChainResult, KVStoreError};
use crate::domain::report::PublicationReport;
use async_trait::async_trait;

/// Ordered `(key, value)` pairs returned by scans.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Abstract interface for key-value database operations.
///
/// Scans return pairs in ascending key order. Keys for positions are
/// big-endian so "highest position" is `last_with_prefix`.
///
/// Testing: `InMemoryKVStore`. Durable: `FileBackedKVStore`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair, replacing any previous value.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, or NONE are.
    async fn atomic_batch_write(&self, operations: Vec<BatchOperation>)
        -> Result<(), KVStoreError>;

    /// Execute an atomic batch write guarded by preconditions.
    ///
    /// Conditions are checked and operations applied as one step. Returns
    /// `Ok(false)`, with nothing applied, when any condition does not hold.
    async fn conditional_batch_write(
        &self,
        conditions: Vec<BatchCondition>,
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError>;

    /// All pairs whose key starts with `prefix`.
    async fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;

    /// All pairs with `start <= key <= end`.
    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<ScanResult, KVStoreError>;

    /// The pair with the greatest key starting with `prefix`.
    async fn last_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, KVStoreError>;

    /// Check if a key exists.
    async fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Insert `value` under `key` only if the key is absent.
    ///
    /// Returns `Ok(false)` when the key already existed.
    async fn insert_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, KVStoreError> {
        self.conditional_batch_write(
            vec![BatchCondition::absent(key)],
            vec![BatchOperation::put(key, value)],
        )
        .await
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Precondition for a conditional batch write.
#[derive(Debug, Clone)]
pub enum BatchCondition {
    /// The key must not exist.
    Absent { key: Vec<u8> },
    /// The key must exist.
    Present { key: Vec<u8> },
}

impl BatchCondition {
    pub fn absent(key: impl Into<Vec<u8>>) -> Self {
        BatchCondition::Absent { key: key.into() }
    }

    pub fn present(key: impl Into<Vec<u8>>) -> Self {
        BatchCondition::Present { key: key.into() }
    }

    /// Evaluate against a membership test.
    pub fn holds(&self, contains: impl Fn(&[u8]) -> bool) -> bool {
        match self {
            BatchCondition::Absent { key } => !contains(key),
            BatchCondition::Present { key } => contains(key),
        }
    }
}

/// Receipt returned by a timestamp authority on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityReceipt {
    /// Authority-assigned identifier, if the authority returns one.
    pub receipt_id: Option<String>,
}

/// An independent, externally verifiable timestamp authority.
///
/// Any `Err` is treated as "not anchored": the engine commits nothing and
/// the next scheduled run retries the same tip.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    /// Identifier used to key publication records.
    fn name(&self) -> &str;

    /// Submit the uppercase hex digest of the chain tip.
    async fn submit(&self, digest_hex: &str) -> ChainResult<AuthorityReceipt>;
}

/// Best-effort delivery of publication reports.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, report: &PublicationReport) -> ChainResult<()>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;

    /// Current time in nanoseconds since epoch, used for arrival markers.
    fn now_nanos(&self) -> u64 {
        self.now().saturating_mul(1_000_000_000)
    }
}
