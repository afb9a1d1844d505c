//! Typed access to the ledger entities in the key-value store.
//!
//! Every store call runs under `ChainConfig::store_timeout`.

use super::HashChainService;
use crate::domain::chain::{verify_entry, verify_segment};
use crate::domain::config::KeyPrefix;
use crate::domain::entities::{ChainEntry, ChainPosition, HashRecord, PendingItem, PublicationRecord};
use crate::domain::errors::{ChainError, ChainResult, KVStoreError};
use crate::ports::outbound::{KeyValueStore, TimeSource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

pub(crate) fn encode<T: Serialize>(value: &T) -> ChainResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| KVStoreError::from(e).into())
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ChainResult<T> {
    bincode::deserialize(bytes).map_err(|e| KVStoreError::from(e).into())
}

impl<KV, TS> HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Run one store call under the store deadline.
    pub(crate) async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, KVStoreError>>,
    ) -> ChainResult<T> {
        let deadline = self.config.store_timeout;
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result.map_err(ChainError::from),
            Err(_) => Err(ChainError::Timeout {
                operation,
                after_ms: deadline.as_millis() as u64,
            }),
        }
    }

    pub(crate) async fn load_hash_record(&self, fingerprint_hex: &str) -> ChainResult<Option<HashRecord>> {
        let key = KeyPrefix::hash_key(fingerprint_hex);
        self.store_call("store.get", self.kv_store.get(&key))
            .await?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub(crate) async fn load_entry(&self, position: ChainPosition) -> ChainResult<Option<ChainEntry>> {
        let key = KeyPrefix::chain_key(position);
        self.store_call("store.get", self.kv_store.get(&key))
            .await?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// The entry with the highest position.
    pub(crate) async fn load_tip(&self) -> ChainResult<Option<ChainEntry>> {
        self.store_call(
            "store.last_with_prefix",
            self.kv_store.last_with_prefix(KeyPrefix::Chain.as_bytes()),
        )
        .await?
        .map(|(_, bytes)| decode(&bytes))
        .transpose()
    }

    /// The tip, checked on its own and against its predecessor.
    ///
    /// A failed check halts extension.
    pub(crate) async fn load_verified_tip(&self) -> ChainResult<Option<ChainEntry>> {
        let Some(tip) = self.load_tip().await? else {
            return Ok(None);
        };
        if tip.position > 1 {
            self.load_segment(tip.position - 1, tip.position).await?;
        } else {
            self.guard(verify_entry(&tip)).await?;
        }
        Ok(Some(tip))
    }

    /// Entries `start..=end`, required to be present, contiguous and linked.
    ///
    /// Any gap or broken link is an invariant violation and halts extension.
    pub(crate) async fn load_segment(
        &self,
        start: ChainPosition,
        end: ChainPosition,
    ) -> ChainResult<Vec<ChainEntry>> {
        let entries = self.read_segment(start, end).await;
        self.guard(entries).await
    }

    /// [`Self::load_segment`] without the halt.
    pub(crate) async fn read_segment(
        &self,
        start: ChainPosition,
        end: ChainPosition,
    ) -> ChainResult<Vec<ChainEntry>> {
        let pairs = self
            .store_call(
                "store.range_scan",
                self.kv_store
                    .range_scan(&KeyPrefix::chain_key(start), &KeyPrefix::chain_key(end)),
            )
            .await?;
        let entries = pairs
            .iter()
            .map(|(_, bytes)| decode::<ChainEntry>(bytes))
            .collect::<ChainResult<Vec<_>>>()?;

        let expected = (end + 1).saturating_sub(start) as usize;
        if entries.len() != expected || entries.first().map(|e| e.position) != Some(start) {
            return Err(ChainError::InvariantViolation {
                position: start,
                reason: format!(
                    "expected {} contiguous entries from {} to {}, found {}",
                    expected,
                    start,
                    end,
                    entries.len()
                ),
            });
        }
        verify_segment(&entries)?;
        Ok(entries)
    }

    /// Pending items in arrival order, with their storage keys.
    pub(crate) async fn load_pending(&self) -> ChainResult<Vec<(Vec<u8>, PendingItem)>> {
        let pairs = self
            .store_call(
                "store.prefix_scan",
                self.kv_store.prefix_scan(KeyPrefix::Pending.as_bytes()),
            )
            .await?;
        let mut items = pairs
            .into_iter()
            .map(|(key, bytes)| decode::<PendingItem>(&bytes).map(|item| (key, item)))
            .collect::<ChainResult<Vec<_>>>()?;
        // Keys already sort by arrival; the stored marker is authoritative.
        items.sort_by(|(ka, a), (kb, b)| a.arrival.cmp(&b.arrival).then_with(|| ka.cmp(kb)));
        Ok(items)
    }

    pub(crate) async fn count_pending(&self) -> ChainResult<usize> {
        let pairs = self
            .store_call(
                "store.prefix_scan",
                self.kv_store.prefix_scan(KeyPrefix::Pending.as_bytes()),
            )
            .await?;
        Ok(pairs.len())
    }

    /// All publications for `authority`, oldest first.
    pub(crate) async fn load_publications(&self, authority: &str) -> ChainResult<Vec<PublicationRecord>> {
        let prefix = KeyPrefix::publication_prefix(authority);
        self.store_call("store.prefix_scan", self.kv_store.prefix_scan(&prefix))
            .await?
            .iter()
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    pub(crate) async fn latest_publication(&self, authority: &str) -> ChainResult<Option<PublicationRecord>> {
        let prefix = KeyPrefix::publication_prefix(authority);
        self.store_call("store.last_with_prefix", self.kv_store.last_with_prefix(&prefix))
            .await?
            .map(|(_, bytes)| decode(&bytes))
            .transpose()
    }
}
