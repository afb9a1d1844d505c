//! Periodic jobs: chain extension and tip publication.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tc_hash_chain::{ChainError, ChainResult, HashChainApi, PublishOutcome};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Run `job` every `period`, first after `initial_delay`, until shutdown.
///
/// Failed runs are logged; the next tick retries.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    initial_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<String>>,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                tracing::info!(job = name, "[tc] Scheduler shutting down");
                return;
            }
        }

        match job().await {
            Ok(summary) => tracing::debug!(job = name, "[tc] {}", summary),
            Err(ChainError::WriterBusy { .. }) => {
                tracing::debug!(job = name, "[tc] Previous run still active, skipping");
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(job = name, "[tc] Run failed, retrying next period: {}", e);
            }
            Err(e) => tracing::error!(job = name, "[tc] Run failed: {}", e),
        }
    }
}

/// One extension run.
pub async fn process_job(api: Arc<dyn HashChainApi>) -> ChainResult<String> {
    let chained = api.process_pending().await?;
    Ok(format!("chained {} fingerprints", chained))
}

/// One publish run against `authority`.
pub async fn publish_job(api: Arc<dyn HashChainApi>, authority: String) -> ChainResult<String> {
    Ok(match api.publish_tip(&authority).await? {
        PublishOutcome::Published { position } => format!("published position {}", position),
        PublishOutcome::NoChange => "tip unchanged".to_string(),
    })
}
