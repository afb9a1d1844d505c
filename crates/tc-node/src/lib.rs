//! # Timestamp Node
//!
//! Runs the hash-chain engine as a service.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment and validate it
//! 2. Install the tracing subscriber
//! 3. Lock the data directory, open the ledger and restore engine state
//! 4. Register the HTTP timestamp authority and the report notifier
//! 5. Start the ingestion worker and the extension/publish schedules
//! 6. Serve the HTTP API until Ctrl+C
//!
//! ## Modules
//!
//! - `config` - `NodeConfig::from_env`
//! - `telemetry` - tracing subscriber
//! - `adapters` - HTTP authority, webhook notifier, data directory lock,
//!   RocksDB ledger (feature `rocksdb`)
//! - `runtime` - ingestion queue worker and scheduler
//! - `api` - axum router
//! - `node` - wiring

pub mod adapters;
pub mod api;
pub mod config;
pub mod node;
pub mod runtime;
pub mod telemetry;

pub use config::{AuthorityConfig, ConfigError, NodeConfig, StorageBackend};
pub use node::TimestampNode;
