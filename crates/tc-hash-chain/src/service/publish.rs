use super::repository::encode;
use super::HashChainService;
use crate::domain::config::KeyPrefix;
use crate::domain::entities::{ChainEntry, ChainPosition, PublicationRecord};
use crate::domain::errors::{ChainError, ChainResult};
use crate::domain::report::PublicationReport;
use crate::ports::inbound::PublishOutcome;
use crate::ports::outbound::{
    AuthorityReceipt, BatchCondition, BatchOperation, KeyValueStore, TimeSource,
    TimestampAuthority,
};

/// Hash records updated per store batch during back-fill.
const BACKFILL_BATCH_SIZE: usize = 256;

impl<KV, TS> HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Anchor the current tip at `authority_name`.
    ///
    /// Order of effects: submit, record the publication, back-fill hash
    /// records in ascending position, notify. Nothing is written before the
    /// authority accepts; an interrupted back-fill is completed by the next
    /// run that finds the tip already anchored.
    pub(crate) async fn publish(&self, authority_name: &str) -> ChainResult<PublishOutcome> {
        let slot = self.authority(authority_name)?;
        let _writer = slot
            .publish_lock
            .try_lock()
            .map_err(|_| ChainError::WriterBusy { job: "publish_tip" })?;
        self.ensure_not_halted()?;

        let Some(tip) = self.load_tip().await? else {
            tracing::debug!(authority = authority_name, "[tc] Chain is empty, nothing to publish");
            return Ok(PublishOutcome::NoChange);
        };

        let previous = self.latest_publication(authority_name).await?;
        if let Some(previous) = &previous {
            if previous.position == tip.position {
                self.recover_backfill(authority_name).await?;
                tracing::debug!(
                    authority = authority_name,
                    position = tip.position,
                    "[tc] Tip already published"
                );
                return Ok(PublishOutcome::NoChange);
            }
            if previous.position > tip.position {
                return Err(self
                    .halt_on(ChainError::InvariantViolation {
                        position: tip.position,
                        reason: format!(
                            "{} publication at {} is ahead of the chain tip",
                            authority_name, previous.position
                        ),
                    })
                    .await);
            }
        }

        // Include the previously anchored entry so the new range is checked
        // against the digest the authority already holds.
        let anchored_from = previous.as_ref().map_or(1, |p| p.position);
        let segment = self.load_segment(anchored_from, tip.position).await?;

        let digest_hex = tip.digest_hex();
        let receipt = self.submit_to_authority(slot.client.as_ref(), &digest_hex).await?;

        let publication = PublicationRecord {
            authority: authority_name.to_string(),
            position: tip.position,
            digest_hex,
            published_at: self.time_source.now(),
            receipt_id: receipt.receipt_id,
        };
        self.record_publication(&publication).await?;

        let verified: Vec<ChainEntry> = segment
            .into_iter()
            .filter(|entry| previous.as_ref().map_or(true, |p| entry.position > p.position))
            .collect();
        let backfilled = self.backfill(&verified, tip.position).await?;

        tracing::info!(
            authority = authority_name,
            position = tip.position,
            digest = %publication.digest_hex,
            "[tc] Published chain tip, {} hash records marked published",
            backfilled
        );

        let report = PublicationReport::new(&publication, previous, &verified);
        self.notify(&report).await;

        Ok(PublishOutcome::Published {
            position: tip.position,
        })
    }

    async fn submit_to_authority(
        &self,
        authority: &dyn TimestampAuthority,
        digest_hex: &str,
    ) -> ChainResult<AuthorityReceipt> {
        let deadline = self.config.authority_timeout;
        let result = match tokio::time::timeout(deadline, authority.submit(digest_hex)).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout {
                operation: "authority.submit",
                after_ms: deadline.as_millis() as u64,
            }),
        };
        if let Err(e) = &result {
            tracing::warn!(
                authority = authority.name(),
                digest = digest_hex,
                "[tc] Publication failed, will retry next run: {}",
                e
            );
        }
        result
    }

    /// At most one record per tip position and authority.
    async fn record_publication(&self, publication: &PublicationRecord) -> ChainResult<()> {
        let key = KeyPrefix::publication_key(&publication.authority, publication.position);
        let applied = self
            .store_call(
                "store.conditional_batch_write",
                self.kv_store.conditional_batch_write(
                    vec![BatchCondition::absent(key.clone())],
                    vec![BatchOperation::put(key, encode(publication)?)],
                ),
            )
            .await?;
        if !applied {
            tracing::warn!(
                authority = %publication.authority,
                position = publication.position,
                "[tc] Publication already recorded for this position"
            );
        }
        Ok(())
    }

    /// Set `published_position` on every record in `entries` that lacks it.
    ///
    /// Returns the number of records changed. Runs under the record lock, so
    /// a record published by another authority's run keeps its position.
    async fn backfill(
        &self,
        entries: &[ChainEntry],
        published: ChainPosition,
    ) -> ChainResult<usize> {
        let _records = self.record_lock.lock().await;
        let mut changed = 0;
        for chunk in entries.chunks(BACKFILL_BATCH_SIZE) {
            let mut operations = Vec::with_capacity(chunk.len());
            for entry in chunk {
                let canonical = entry.item_fingerprint.encode();
                let mut record = self.load_hash_record(&canonical).await?.ok_or_else(|| {
                    ChainError::PersistenceFault {
                        reason: format!(
                            "no hash record for {} chained at position {}",
                            canonical, entry.position
                        ),
                    }
                })?;
                if record.is_published() {
                    continue;
                }
                record.chain_position.get_or_insert(entry.position);
                record.published_position = Some(published);
                operations.push(BatchOperation::put(
                    KeyPrefix::hash_key(&canonical),
                    encode(&record)?,
                ));
            }
            if operations.is_empty() {
                continue;
            }
            changed += operations.len();
            self.store_call(
                "store.atomic_batch_write",
                self.kv_store.atomic_batch_write(operations),
            )
            .await?;
        }
        Ok(changed)
    }

    /// Finish a back-fill an earlier run left incomplete.
    ///
    /// Back-fill writes in ascending position, so when the last record of the
    /// latest range is published the whole range is.
    async fn recover_backfill(&self, authority_name: &str) -> ChainResult<()> {
        let publications = self.load_publications(authority_name).await?;
        let Some(latest) = publications.last() else {
            return Ok(());
        };
        let Some(tip_record) = self.load_entry(latest.position).await? else {
            return Ok(());
        };
        let tip_published = self
            .load_hash_record(&tip_record.item_fingerprint.encode())
            .await?
            .is_some_and(|record| record.is_published());
        if tip_published {
            return Ok(());
        }

        let from = match publications.len() {
            n if n >= 2 => publications[n - 2].position + 1,
            _ => 1,
        };
        let entries = self.load_segment(from, latest.position).await?;
        let changed = self.backfill(&entries, latest.position).await?;
        tracing::warn!(
            authority = authority_name,
            position = latest.position,
            "[tc] Completed interrupted back-fill of {} hash records",
            changed
        );
        Ok(())
    }

    async fn notify(&self, report: &PublicationReport) {
        let deadline = self.config.notifier_timeout;
        match tokio::time::timeout(deadline, self.notifier.send(report)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    position = report.anchored_position,
                    "[tc] Publication report not delivered: {}",
                    e
                );
            }
            Err(_) => {
                tracing::warn!(
                    position = report.anchored_position,
                    "[tc] Publication report timed out after {}ms",
                    deadline.as_millis()
                );
            }
        }
    }
}
