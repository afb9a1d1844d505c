use crate::domain::errors::{ChainError, ChainResult};
use crate::ports::outbound::{AuthorityReceipt, TimestampAuthority};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-process timestamp authority for tests and offline runs.
///
/// Records every digest it accepts. Can be switched to reject submissions or
/// to answer slowly.
pub struct MockAuthority {
    name: String,
    submissions: Mutex<Vec<String>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockAuthority {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            submissions: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    /// Reject every following submission with `UpstreamUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Digests accepted so far, in order.
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl TimestampAuthority for MockAuthority {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, digest_hex: &str) -> ChainResult<AuthorityReceipt> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(ChainError::UpstreamUnavailable {
                service: self.name.clone(),
                reason: "authority rejected submission".to_string(),
            });
        }

        let mut submissions = self.submissions.lock();
        submissions.push(digest_hex.to_string());
        Ok(AuthorityReceipt {
            receipt_id: Some(format!("{}-{}", self.name.to_lowercase(), submissions.len())),
        })
    }
}
