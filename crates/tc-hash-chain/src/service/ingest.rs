use super::repository::encode;
use super::HashChainService;
use crate::domain::config::KeyPrefix;
use crate::domain::entities::{HashRecord, PendingItem};
use crate::domain::errors::ChainResult;
use crate::domain::fingerprint::Fingerprint;
use crate::ports::inbound::SubmitOutcome;
use crate::ports::outbound::{BatchCondition, BatchOperation, KeyValueStore, TimeSource};

impl<KV, TS> HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Create the hash record and pending item in one conditional write on
    /// the absence of the hash record. Concurrent submissions of the same
    /// fingerprint resolve to one `Accepted`.
    pub(crate) async fn ingest(&self, fingerprint_hex: &str) -> ChainResult<SubmitOutcome> {
        let fingerprint = Fingerprint::decode(fingerprint_hex)?;
        let canonical = fingerprint.encode();
        let hash_key = KeyPrefix::hash_key(&canonical);

        if self
            .store_call("store.exists", self.kv_store.exists(&hash_key))
            .await?
        {
            tracing::debug!(fingerprint = %canonical, "[tc] Duplicate submission");
            return Ok(SubmitOutcome::AlreadyExists);
        }

        let arrival = self.next_arrival();
        let item = PendingItem {
            fingerprint: fingerprint.clone(),
            arrival,
            queued_at: self.time_source.now(),
        };
        let pending_key = KeyPrefix::pending_key(arrival.0, fingerprint.as_bytes());

        let applied = self
            .store_call(
                "store.conditional_batch_write",
                self.kv_store.conditional_batch_write(
                    vec![BatchCondition::absent(hash_key.clone())],
                    vec![
                        BatchOperation::put(hash_key, encode(&HashRecord::new(&fingerprint))?),
                        BatchOperation::put(pending_key, encode(&item)?),
                    ],
                ),
            )
            .await?;

        if applied {
            tracing::debug!(fingerprint = %canonical, arrival = arrival.0, "[tc] Fingerprint queued");
            Ok(SubmitOutcome::Accepted)
        } else {
            tracing::debug!(fingerprint = %canonical, "[tc] Lost submission race");
            Ok(SubmitOutcome::AlreadyExists)
        }
    }
}
