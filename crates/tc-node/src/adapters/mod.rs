//! # Adapters Module
//!
//! Outbound ports backed by real services, plus the process lock.
//!
//! - `authority`: HTTP timestamp authority
//! - `notifier`: webhook report delivery
//! - `lock`: data directory lock (singleton guard)
//! - `rocksdb`: RocksDB ledger store (feature `rocksdb`)

pub mod authority;
pub mod lock;
pub mod notifier;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

pub use authority::HttpTimestampAuthority;
pub use lock::{DataDirLock, LockError};
pub use notifier::WebhookNotifier;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::{RocksDbConfig, RocksDbStore};
