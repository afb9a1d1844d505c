//! # Hash Chain Engine (tc)
//!
//! Proves that a fingerprint existed at or before a known point in time
//! without trusting the operator. Each fingerprint is appended to a singly
//! linked SHA-256 chain; the chain tip is periodically anchored at an
//! independent timestamp authority. Anyone holding a fingerprint can ask for
//! its validation chain and recompute it up to the anchored digest.
//!
//! ## Data Flow
//!
//! ```text
//! caller ──submit──→ Ingestion Guard ──→ pending items (store)
//!                                              │
//!                         scheduler ──→ Chain Extender ──→ chain entries
//!                                                              │
//!                         scheduler ──→ Tip Publisher ──→ authority
//!                                              │          + publication record
//!                                              ↓          + back-filled hash records
//! caller ──query──→ Proof Builder ──reads──→ hash record + chain entries
//! ```
//!
//! ## Domain Invariants
//!
//! | # | Invariant | Enforced by |
//! |---|-----------|-------------|
//! | 1 | Positions are `1..=N` with no gaps | compare-and-set append on the previous position |
//! | 2 | `input[p] = digest[p-1] ‖ fp[p]`, `digest[p] = SHA-256(input[p])` | `domain::chain`, checked on read |
//! | 3 | One hash record and one pending item per distinct fingerprint | create-if-absent batch |
//! | 4 | `published_position >= chain_position`, set once | back-fill only fills missing values |
//! | 5 | Publication positions per authority strictly increase | single publisher per authority, no-op on unchanged tip |
//! | 6 | A broken chain is never extended | stored halt until a verified `reset_halt` |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Pure domain logic (codec, entities, linking, proofs, reports)
//! - `ports/` - Port traits (inbound API, outbound SPI)
//! - `adapters/` - Stores, clocks, in-process authority and notifiers
//! - `service/` - Application service implementing the API
//!
//! ## Usage
//!
//! ```ignore
//! use tc_hash_chain::*;
//!
//! let service = HashChainService::open(
//!     HashChainDependencies {
//!         kv_store: FileBackedKVStore::open("data/ledger.db")?,
//!         time_source: SystemTimeSource,
//!         notifier: Arc::new(LogNotifier::new(true)),
//!     },
//!     ChainConfig::default(),
//! )
//! .await?
//! .with_authority(Arc::new(MockAuthority::new("OriginStamp")));
//!
//! service.submit("AAAA").await?;
//! service.process_pending().await?;
//! service.publish_tip("OriginStamp").await?;
//! let proof = service.get_validation_chain("AAAA").await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export key types for convenience
pub use adapters::{
    FileBackedKVStore, InMemoryKVStore, LogNotifier, ManualTimeSource, MockAuthority,
    RecordingNotifier, SystemTimeSource,
};
pub use domain::config::ChainConfig;
pub use domain::entities::{
    ChainEntry, ChainPosition, HashRecord, LedgerStatus, PendingItem, PublicationRecord,
    Timestamp,
};
pub use domain::errors::{ChainError, ChainResult, KVStoreError};
pub use domain::fingerprint::Fingerprint;
pub use domain::proof::{ValidationChainEntry, ValidationResult};
pub use domain::report::PublicationReport;
pub use ports::inbound::{HashChainApi, PublishOutcome, SubmitOutcome};
pub use ports::outbound::{
    AuthorityReceipt, BatchCondition, BatchOperation, KeyValueStore, Notifier, ScanResult,
    TimeSource, TimestampAuthority,
};
pub use service::{HashChainDependencies, HashChainService};
