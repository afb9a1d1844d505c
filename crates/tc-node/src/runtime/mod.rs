//! Background tasks driving the engine.

pub mod ingest;
pub mod scheduler;

pub use ingest::{run_ingestion_worker, EnqueueError, IngestQueue, RetryBackoff};
pub use scheduler::{process_job, publish_job, run_periodic};
