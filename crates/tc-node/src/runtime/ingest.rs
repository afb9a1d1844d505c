//! FIFO ingestion channel and the worker that drains it.

use std::sync::Arc;
use std::time::Duration;
use tc_hash_chain::{HashChainApi, SubmitOutcome};
use tokio::sync::{mpsc, watch};

/// Why a message could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

/// Sending half of the ingestion channel.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<String>,
}

impl IngestQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue one fingerprint without waiting for capacity.
    pub fn enqueue(&self, fingerprint_hex: String) -> Result<(), EnqueueError> {
        self.tx.try_send(fingerprint_hex).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Delay schedule for fingerprints the store failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

impl RetryBackoff {
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max.max(self.initial);
        self
    }

    fn next(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.max)
    }
}

/// Feed queued fingerprints to `submit` in order until every sender is
/// gone. Returns the number of accepted fingerprints.
///
/// Invalid input is logged and dropped. A transient failure holds the queue
/// and retries the same fingerprint with exponential backoff. On shutdown
/// the queue is closed and what is already queued is still submitted.
pub async fn run_ingestion_worker(
    mut rx: mpsc::Receiver<String>,
    api: Arc<dyn HashChainApi>,
    mut shutdown: watch::Receiver<bool>,
    backoff: RetryBackoff,
) -> usize {
    let mut accepted = 0;
    let mut draining = stopping(&shutdown);
    if draining {
        rx.close();
    }
    loop {
        let message = if draining {
            rx.recv().await
        } else {
            tokio::select! {
                message = rx.recv() => message,
                _ = shutdown.changed() => {
                    tracing::info!("[tc] Ingestion worker draining {} queued fingerprints", rx.len());
                    rx.close();
                    draining = true;
                    continue;
                }
            }
        };
        let Some(fingerprint_hex) = message else {
            break;
        };
        if submit_with_retry(api.as_ref(), &fingerprint_hex, &mut shutdown, backoff).await {
            accepted += 1;
        }
    }
    accepted
}

/// Returns true when the fingerprint was newly accepted.
async fn submit_with_retry(
    api: &dyn HashChainApi,
    fingerprint_hex: &str,
    shutdown: &mut watch::Receiver<bool>,
    backoff: RetryBackoff,
) -> bool {
    let mut delay = backoff.initial;
    loop {
        match api.submit(fingerprint_hex).await {
            Ok(SubmitOutcome::Accepted) => return true,
            Ok(SubmitOutcome::AlreadyExists) => {
                tracing::info!(fingerprint = %fingerprint_hex, "[tc] Hash already added");
                return false;
            }
            Err(e) if e.is_transient() => {
                if stopping(shutdown) {
                    tracing::error!(
                        fingerprint = %fingerprint_hex,
                        "[tc] Hash not stored before shutdown: {}",
                        e
                    );
                    return false;
                }
                tracing::warn!(
                    fingerprint = %fingerprint_hex,
                    retry_in_ms = delay.as_millis() as u64,
                    "[tc] Failed to store hash: {}",
                    e
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {}
                }
                delay = backoff.next(delay);
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint_hex, "[tc] Rejected hash: {}", e);
                return false;
            }
        }
    }
}

/// Shutdown was requested or its sender is gone.
fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let backoff = RetryBackoff::default().with_max(Duration::from_millis(350));
        assert_eq!(backoff.next(Duration::from_millis(100)), Duration::from_millis(200));
        assert_eq!(backoff.next(Duration::from_millis(200)), Duration::from_millis(350));
        assert_eq!(backoff.next(Duration::from_millis(350)), Duration::from_millis(350));
    }

    #[test]
    fn test_cap_never_below_initial() {
        let backoff = RetryBackoff::default().with_max(Duration::from_millis(10));
        assert_eq!(backoff.max, backoff.initial);
    }
}
