use super::repository::encode;
use super::HashChainService;
use crate::domain::chain::{link, verify_entry};
use crate::domain::config::KeyPrefix;
use crate::domain::entities::{ChainEntry, HashRecord, PendingItem};
use crate::domain::errors::{ChainError, ChainResult};
use crate::ports::outbound::{BatchCondition, BatchOperation, KeyValueStore, TimeSource};

/// What happened to one pending item.
enum Step {
    Appended(ChainEntry),
    /// Already chained by an earlier, interrupted run. Pending item removed.
    Skipped,
}

impl<KV, TS> HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Chain every pending item in arrival order.
    ///
    /// Each append is one conditional batch: the new entry's position must be
    /// free and its predecessor present. The batch also removes the pending
    /// item and sets the hash record's chain position, so a run interrupted
    /// between items resumes cleanly.
    pub(crate) async fn extend(&self) -> ChainResult<usize> {
        self.ensure_not_halted()?;
        let _writer = self
            .extend_lock
            .try_lock()
            .map_err(|_| ChainError::WriterBusy {
                job: "process_pending",
            })?;

        let pending = self.load_pending().await?;
        if pending.is_empty() {
            tracing::debug!("[tc] No pending fingerprints");
            return Ok(0);
        }

        self.load_verified_tip().await?;

        let mut appended = 0;
        let mut skipped = 0;
        for (pending_key, item) in &pending {
            match self.chain_item(pending_key, item).await? {
                Step::Appended(entry) => {
                    tracing::debug!(
                        position = entry.position,
                        fingerprint = %entry.item_fingerprint,
                        digest = %entry.digest_hex(),
                        "[tc] Chained fingerprint"
                    );
                    appended += 1;
                }
                Step::Skipped => skipped += 1,
            }
        }

        tracing::info!(
            "[tc] Processed {} pending fingerprints ({} chained, {} already chained)",
            pending.len(),
            appended,
            skipped
        );
        Ok(appended)
    }

    async fn chain_item(&self, pending_key: &[u8], item: &PendingItem) -> ChainResult<Step> {
        let canonical = item.fingerprint.encode();
        let hash_key = KeyPrefix::hash_key(&canonical);

        // Re-read before every item: the tip in the store is the only truth.
        let tip = self.load_tip().await?;
        if let Some(tip) = &tip {
            self.guard(verify_entry(tip)).await?;
        }

        let mut record = match self.load_hash_record(&canonical).await? {
            Some(record) => record,
            None => {
                tracing::warn!(
                    fingerprint = %canonical,
                    "[tc] Pending item without hash record, recreating record"
                );
                HashRecord::new(&item.fingerprint)
            }
        };

        if record.is_chained() {
            self.store_call("store.delete", self.kv_store.delete(pending_key))
                .await?;
            return Ok(Step::Skipped);
        }

        // Entry written but record not updated: only possible for the tip.
        if let Some(tip) = tip.as_ref().filter(|t| t.item_fingerprint == item.fingerprint) {
            // The tip may be anchored already; re-read under the record lock so
            // a concurrent back-fill is not overwritten.
            let _records = self.record_lock.lock().await;
            let mut record = self
                .load_hash_record(&canonical)
                .await?
                .unwrap_or_else(|| HashRecord::new(&item.fingerprint));
            tracing::warn!(
                position = tip.position,
                fingerprint = %canonical,
                "[tc] Completing interrupted append"
            );
            record.chain_position = Some(tip.position);
            self.store_call(
                "store.atomic_batch_write",
                self.kv_store.atomic_batch_write(vec![
                    BatchOperation::put(hash_key, encode(&record)?),
                    BatchOperation::delete(pending_key),
                ]),
            )
            .await?;
            return Ok(Step::Skipped);
        }

        let entry = link(tip.as_ref(), item);
        record.chain_position = Some(entry.position);

        let entry_key = KeyPrefix::chain_key(entry.position);
        let mut conditions = vec![BatchCondition::absent(entry_key.clone())];
        if entry.position > 1 {
            conditions.push(BatchCondition::present(KeyPrefix::chain_key(entry.position - 1)));
        }

        let applied = self
            .store_call(
                "store.conditional_batch_write",
                self.kv_store.conditional_batch_write(
                    conditions,
                    vec![
                        BatchOperation::put(entry_key, encode(&entry)?),
                        BatchOperation::delete(pending_key),
                        BatchOperation::put(hash_key, encode(&record)?),
                    ],
                ),
            )
            .await?;

        if !applied {
            tracing::warn!(
                position = entry.position,
                "[tc] Position taken by another writer, stopping run"
            );
            return Err(ChainError::WriterBusy {
                job: "process_pending",
            });
        }
        Ok(Step::Appended(entry))
    }
}
