//! # Adapters Module
//!
//! Implementations of the outbound ports that ship with the engine.
//!
//! ## Modules
//!
//! - `storage`: in-memory and file-backed key-value stores
//! - `infra`: clocks, an in-process authority and report notifiers

pub mod infra;
pub mod storage;

pub use infra::{LogNotifier, ManualTimeSource, MockAuthority, RecordingNotifier, SystemTimeSource};
pub use storage::{FileBackedKVStore, InMemoryKVStore};
