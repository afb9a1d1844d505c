//! # Domain Layer
//!
//! Pure domain logic for the hash-chain engine. No I/O happens here.
//!
//! ## Modules
//!
//! - `fingerprint` - Hex codec for caller fingerprints
//! - `entities` - Persisted records (hash records, pending items, entries, publications)
//! - `chain` - Entry linking and contiguity checks
//! - `proof` - Validation chains returned to callers
//! - `report` - Publication reports sent after an anchor
//! - `config` - Engine configuration and store key layout
//! - `errors` - Domain error types

pub mod chain;
pub mod config;
pub mod entities;
pub mod errors;
pub mod fingerprint;
pub mod proof;
pub mod report;
