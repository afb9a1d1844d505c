//! Wiring of the engine, collaborators and background tasks.

use crate::adapters::{DataDirLock, HttpTimestampAuthority, WebhookNotifier};
use crate::api::{self, AppState};
use crate::config::{NodeConfig, StorageBackend};
use crate::runtime::{self, IngestQueue, RetryBackoff};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tc_hash_chain::{
    ChainConfig, FileBackedKVStore, HashChainApi, HashChainDependencies, HashChainService,
    KeyValueStore, LogNotifier, Notifier, SystemTimeSource, TimestampAuthority,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The running node.
pub struct TimestampNode {
    config: NodeConfig,
    api: Arc<dyn HashChainApi>,
    queue: IngestQueue,
    queue_rx: Option<mpsc::Receiver<String>>,
    publishing_enabled: bool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
    _lock: DataDirLock,
}

impl TimestampNode {
    /// Lock the data directory, open the ledger and build the engine.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let lock = DataDirLock::acquire(&config.data_dir)
            .with_context(|| format!("Failed to lock {}", config.data_dir.display()))?;
        info!("[tc] Data directory locked by pid {} ({})", lock.pid(), lock.path().display());

        let chain_config = config.chain_config();
        let short_digests = chain_config.short_report_digests;
        let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Arc::new(
                WebhookNotifier::new(
                    url.clone(),
                    config.notify_to.clone(),
                    short_digests,
                    config.notify_timeout,
                )
                .context("Failed to build webhook client")?,
            ),
            None => Arc::new(LogNotifier::new(short_digests)),
        };

        let authority: Option<Arc<dyn TimestampAuthority>> = match &config.authority {
            Some(authority) => Some(Arc::new(
                HttpTimestampAuthority::new(authority.clone(), config.authority_timeout)
                    .context("Failed to build authority client")?,
            )),
            None => {
                warn!("[tc] TC_AUTHORITY_URL not set, publishing disabled");
                None
            }
        };
        let publishing_enabled = authority.is_some();

        let ledger_path = config.ledger_path();
        let api = match config.storage {
            StorageBackend::File => {
                let kv_store = FileBackedKVStore::open(&ledger_path)
                    .with_context(|| format!("Failed to open {}", ledger_path.display()))?;
                build_service(kv_store, notifier, chain_config, authority).await?
            }
            #[cfg(feature = "rocksdb")]
            StorageBackend::RocksDb => {
                let kv_store = crate::adapters::RocksDbStore::open_default(&ledger_path)
                    .with_context(|| format!("Failed to open {}", ledger_path.display()))?;
                build_service(kv_store, notifier, chain_config, authority).await?
            }
            #[cfg(not(feature = "rocksdb"))]
            StorageBackend::RocksDb => {
                anyhow::bail!("TC_STORAGE=rocksdb needs a build with the `rocksdb` feature")
            }
        };

        let (queue, queue_rx) = IngestQueue::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            api,
            queue,
            queue_rx: Some(queue_rx),
            publishing_enabled,
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
            _lock: lock,
        })
    }

    pub fn api(&self) -> Arc<dyn HashChainApi> {
        Arc::clone(&self.api)
    }

    /// Spawn the ingestion worker and the scheduled jobs.
    pub fn start_background(&mut self) -> Result<()> {
        let queue_rx = self
            .queue_rx
            .take()
            .context("Background tasks already started")?;

        let api = self.api();
        let shutdown = self.shutdown_rx.clone();
        let backoff = RetryBackoff::default().with_max(self.config.ingest_retry_max);
        self.tasks.push(tokio::spawn(async move {
            let accepted = runtime::run_ingestion_worker(queue_rx, api, shutdown, backoff).await;
            info!("[tc] Ingestion worker stopped after {} new fingerprints", accepted);
        }));

        let api = self.api();
        self.tasks.push(tokio::spawn(runtime::run_periodic(
            "process_pending",
            Duration::ZERO,
            self.config.process_interval,
            self.shutdown_rx.clone(),
            move || runtime::process_job(Arc::clone(&api)),
        )));

        if self.publishing_enabled {
            let api = self.api();
            let authority = self.config.authority_name.clone();
            self.tasks.push(tokio::spawn(runtime::run_periodic(
                "publish_tip",
                self.config.publish_interval,
                self.config.publish_interval,
                self.shutdown_rx.clone(),
                move || runtime::publish_job(Arc::clone(&api), authority.clone()),
            )));
        }
        Ok(())
    }

    /// Serve the HTTP API until shutdown is signalled.
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.http_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.http_addr))?;
        info!("[tc] HTTP API listening on {}", self.config.http_addr);

        let app = api::router(
            AppState {
                api: self.api(),
                queue: self.queue.clone(),
            },
            self.config.request_timeout,
        );
        let mut shutdown = self.shutdown_rx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .context("HTTP server error")
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        info!("[tc] Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            warn!("[tc] Failed to send shutdown signal: {}", e);
        }
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
        info!("[tc] Shutdown complete");
    }

    /// Handle used to trigger shutdown from a signal listener.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }
}

/// Restore engine state from `kv_store` and register the authority.
async fn build_service<KV>(
    kv_store: KV,
    notifier: Arc<dyn Notifier>,
    chain_config: ChainConfig,
    authority: Option<Arc<dyn TimestampAuthority>>,
) -> Result<Arc<dyn HashChainApi>>
where
    KV: KeyValueStore + 'static,
{
    let mut service = HashChainService::open(
        HashChainDependencies {
            kv_store,
            time_source: SystemTimeSource,
            notifier,
        },
        chain_config,
    )
    .await
    .context("Failed to restore ledger state")?;
    if let Some(authority) = authority {
        service = service.with_authority(authority);
    }
    Ok(Arc::new(service))
}
