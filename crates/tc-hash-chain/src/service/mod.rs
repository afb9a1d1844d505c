//! # Hash Chain Service
//!
//! The main service implementing the Hash Chain API.
//!
//! ## Architecture
//!
//! This service:
//! 1. Implements `HashChainApi` for ingestion, scheduled jobs and queries
//! 2. Keeps the chain tip in the store only: every append is a
//!    compare-and-set on the previous position
//! 3. Serializes extension runs, and publish runs per authority, with
//!    in-process writer locks
//! 4. Halts extension after an invariant violation until `reset_halt`;
//!    the halt is stored in the ledger and survives restarts
//!
//! | Component | File |
//! |-----------|------|
//! | Ingestion Guard | `ingest.rs` |
//! | Chain Extender | `extend.rs` |
//! | Tip Publisher | `publish.rs` |
//! | Proof Builder | `proof.rs` |
//! | Ledger reads/writes | `repository.rs` |

mod extend;
mod ingest;
mod proof;
mod publish;
mod repository;

use crate::domain::config::{ChainConfig, KeyPrefix};
use crate::domain::entities::{ArrivalMarker, ChainPosition, LedgerStatus, PendingItem};
use crate::domain::errors::{ChainError, ChainResult};
use crate::domain::proof::ValidationResult;
use crate::ports::inbound::{HashChainApi, PublishOutcome, SubmitOutcome};
use crate::ports::outbound::{KeyValueStore, Notifier, TimeSource, TimestampAuthority};
use async_trait::async_trait;
use parking_lot::RwLock;
use repository::{decode, encode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Entries read per window when `reset_halt` re-verifies the chain.
const VERIFY_WINDOW: ChainPosition = 1024;

/// A registered authority and the lock that keeps its publish runs serial.
struct AuthoritySlot {
    client: Arc<dyn TimestampAuthority>,
    publish_lock: Mutex<()>,
}

/// The Hash Chain Service.
pub struct HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Key-value store holding every ledger entity.
    pub(crate) kv_store: KV,
    /// Time source for queue timestamps and arrival markers.
    pub(crate) time_source: TS,
    /// Receives a report after each successful anchor.
    pub(crate) notifier: Arc<dyn Notifier>,
    /// Registered timestamp authorities by name.
    authorities: HashMap<String, AuthoritySlot>,
    /// Service configuration.
    pub(crate) config: ChainConfig,
    /// Last issued arrival marker.
    last_arrival: AtomicU64,
    /// Held for the duration of a `process_pending` run.
    extend_lock: Mutex<()>,
    /// Held across read-modify-write of hash records that already have a
    /// chain entry, so publish runs for different authorities and interrupted
    /// append repair never overwrite each other.
    record_lock: Mutex<()>,
    /// Reason extension is halted, if it is.
    halt_reason: RwLock<Option<String>>,
}

/// Dependencies for HashChainService
pub struct HashChainDependencies<KV, TS> {
    pub kv_store: KV,
    pub time_source: TS,
    pub notifier: Arc<dyn Notifier>,
}

impl<KV, TS> HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Create a new Hash Chain Service with no authorities registered.
    ///
    /// Does not read the store. Use [`HashChainService::open`] for a ledger
    /// that may already hold state.
    pub fn new(deps: HashChainDependencies<KV, TS>, config: ChainConfig) -> Self {
        Self {
            kv_store: deps.kv_store,
            time_source: deps.time_source,
            notifier: deps.notifier,
            authorities: HashMap::new(),
            config,
            last_arrival: AtomicU64::new(0),
            extend_lock: Mutex::new(()),
            record_lock: Mutex::new(()),
            halt_reason: RwLock::new(None),
        }
    }

    /// Create the service over an existing ledger.
    ///
    /// Restores a stored halt and continues arrival markers after the newest
    /// pending item, so a clock that moved backwards across a restart cannot
    /// reorder the queue.
    pub async fn open(deps: HashChainDependencies<KV, TS>, config: ChainConfig) -> ChainResult<Self> {
        let service = Self::new(deps, config);

        let halt = service
            .store_call("store.get", service.kv_store.get(&KeyPrefix::halt_key()))
            .await?
            .map(|bytes| decode::<String>(&bytes))
            .transpose()?;
        if let Some(reason) = halt {
            tracing::error!("[tc] Ledger is halted: {}", reason);
            *service.halt_reason.write() = Some(reason);
        }

        let newest = service
            .store_call(
                "store.last_with_prefix",
                service
                    .kv_store
                    .last_with_prefix(KeyPrefix::Pending.as_bytes()),
            )
            .await?
            .map(|(_, bytes)| decode::<PendingItem>(&bytes))
            .transpose()?;
        if let Some(item) = newest {
            service.last_arrival.store(item.arrival.0, Ordering::SeqCst);
        }

        Ok(service)
    }

    /// Register an authority under its own `name()`. A later registration
    /// with the same name replaces the earlier one.
    pub fn with_authority(mut self, authority: Arc<dyn TimestampAuthority>) -> Self {
        self.authorities.insert(
            authority.name().to_string(),
            AuthoritySlot {
                client: authority,
                publish_lock: Mutex::new(()),
            },
        );
        self
    }

    /// Names of the registered authorities.
    pub fn authority_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.authorities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_halted(&self) -> bool {
        self.halt_reason.read().is_some()
    }

    /// Strictly increasing marker: wall-clock nanoseconds, bumped past the
    /// previous marker when the clock has not moved.
    pub(crate) fn next_arrival(&self) -> ArrivalMarker {
        let now = self.time_source.now_nanos();
        let previous = match self.last_arrival.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last.saturating_add(1))),
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        ArrivalMarker(now.max(previous.saturating_add(1)))
    }

    pub(crate) fn ensure_not_halted(&self) -> ChainResult<()> {
        match self.halt_reason.read().as_ref() {
            Some(reason) => Err(ChainError::ChainHalted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Record `err` as the halt reason when it is an invariant violation.
    ///
    /// The reason is written to the ledger so the halt outlives the process.
    /// A failed write is logged; the in-memory halt still applies.
    pub(crate) async fn halt_on(&self, err: ChainError) -> ChainError {
        let ChainError::InvariantViolation { position, reason } = &err else {
            return err;
        };
        tracing::error!(position = *position, "[tc] Chain extension halted: {}", reason);

        let first = {
            let mut halt_reason = self.halt_reason.write();
            if halt_reason.is_some() {
                false
            } else {
                *halt_reason = Some(err.to_string());
                true
            }
        };
        if first {
            let stored = match encode(&err.to_string()) {
                Ok(bytes) => {
                    self.store_call(
                        "store.put",
                        self.kv_store.put(&KeyPrefix::halt_key(), &bytes),
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                tracing::error!("[tc] Failed to persist halt: {}", e);
            }
        }
        err
    }

    /// Pass `result` through, halting on an invariant violation.
    pub(crate) async fn guard<T>(&self, result: ChainResult<T>) -> ChainResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.halt_on(e).await),
        }
    }

    /// Check every entry and link from position 1 to the tip, window by
    /// window. Does not halt; the caller decides.
    async fn verify_chain(&self) -> ChainResult<()> {
        let Some(tip) = self.load_tip().await? else {
            return Ok(());
        };
        let mut start = 1;
        while start <= tip.position {
            let end = start.saturating_add(VERIFY_WINDOW - 1).min(tip.position);
            // Overlap one entry so the link into this window is checked too.
            self.read_segment(start.saturating_sub(1).max(1), end).await?;
            start = end + 1;
        }
        Ok(())
    }

    fn authority(&self, name: &str) -> ChainResult<&AuthoritySlot> {
        self.authorities
            .get(name)
            .ok_or_else(|| ChainError::UnknownAuthority {
                authority: name.to_string(),
            })
    }
}

#[async_trait]
impl<KV, TS> HashChainApi for HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    async fn submit(&self, fingerprint_hex: &str) -> ChainResult<SubmitOutcome> {
        self.ingest(fingerprint_hex).await
    }

    async fn process_pending(&self) -> ChainResult<usize> {
        self.extend().await
    }

    async fn publish_tip(&self, authority: &str) -> ChainResult<PublishOutcome> {
        self.publish(authority).await
    }

    async fn get_validation_chain(&self, fingerprint_hex: &str) -> ChainResult<ValidationResult> {
        self.build_proof(fingerprint_hex).await
    }

    async fn status(&self) -> ChainResult<LedgerStatus> {
        let tip = self.load_tip().await?;
        let pending_count = self.count_pending().await?;
        let halt_reason = self.halt_reason.read().clone();

        Ok(LedgerStatus {
            tip_position: tip.as_ref().map(|entry| entry.position),
            tip_digest: tip.as_ref().map(|entry| entry.digest_hex()),
            pending_count,
            halted: halt_reason.is_some(),
            halt_reason,
        })
    }

    async fn reset_halt(&self) -> ChainResult<()> {
        let Some(reason) = self.halt_reason.read().clone() else {
            return Ok(());
        };
        let _writer = self.extend_lock.lock().await;

        if let Err(e) = self.verify_chain().await {
            tracing::warn!("[tc] Halt kept, chain still fails verification: {}", e);
            return Err(e);
        }
        self.store_call("store.delete", self.kv_store.delete(&KeyPrefix::halt_key()))
            .await?;
        *self.halt_reason.write() = None;
        tracing::warn!("[tc] Halt cleared by operator (was: {})", reason);
        Ok(())
    }
}
