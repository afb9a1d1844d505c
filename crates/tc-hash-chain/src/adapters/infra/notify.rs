use crate::domain::errors::{ChainError, ChainResult};
use crate::domain::report::PublicationReport;
use crate::ports::outbound::Notifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Writes publication reports to the log.
#[derive(Debug, Default)]
pub struct LogNotifier {
    short_digests: bool,
}

impl LogNotifier {
    pub fn new(short_digests: bool) -> Self {
        Self { short_digests }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, report: &PublicationReport) -> ChainResult<()> {
        tracing::info!(
            authority = %report.authority,
            position = report.anchored_position,
            "[tc] {}\n{}",
            report.subject(),
            report.render(self.short_digests)
        );
        Ok(())
    }
}

/// Keeps every report it receives. Can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<PublicationReport>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<PublicationReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, report: &PublicationReport) -> ChainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChainError::UpstreamUnavailable {
                service: "notifier".to_string(),
                reason: "delivery refused".to_string(),
            });
        }
        self.reports.lock().push(report.clone());
        Ok(())
    }
}
