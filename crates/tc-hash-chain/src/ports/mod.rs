//! # Ports Layer
//!
//! - `inbound.rs` - Driving ports (API exposed to callers and the scheduler)
//! - `outbound.rs` - Driven ports (dependencies required by the service)

pub mod inbound;
pub mod outbound;

pub use inbound::{HashChainApi, PublishOutcome, SubmitOutcome};
pub use outbound::{
    AuthorityReceipt, BatchCondition, BatchOperation, KeyValueStore, Notifier, ScanResult,
    TimeSource, TimestampAuthority,
};
