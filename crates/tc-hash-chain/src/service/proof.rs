use super::HashChainService;
use crate::domain::errors::{ChainError, ChainResult};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::proof::ValidationResult;
use crate::ports::outbound::{KeyValueStore, TimeSource};

impl<KV, TS> HashChainService<KV, TS>
where
    KV: KeyValueStore,
    TS: TimeSource,
{
    /// Classify a fingerprint and, once published, return its proof.
    ///
    /// The hash record is read once; `published_position` is only ever set
    /// after every entry up to it exists, so the range read that follows
    /// always finds a complete segment.
    pub(crate) async fn build_proof(&self, fingerprint_hex: &str) -> ChainResult<ValidationResult> {
        let fingerprint = Fingerprint::decode(fingerprint_hex)?;
        let canonical = fingerprint.encode();

        let record = self
            .load_hash_record(&canonical)
            .await?
            .ok_or_else(|| ChainError::NotFound {
                fingerprint: canonical.clone(),
            })?;

        let (chained_at, published_at) = match (record.chain_position, record.published_position) {
            (None, _) => return Ok(ValidationResult::pending(canonical)),
            (Some(chained_at), None) => return Ok(ValidationResult::chained(canonical, chained_at)),
            (Some(chained_at), Some(published_at)) => (chained_at, published_at),
        };

        if published_at < chained_at {
            return Err(self
                .halt_on(ChainError::InvariantViolation {
                    position: chained_at,
                    reason: format!("{} published at earlier position {}", canonical, published_at),
                })
                .await);
        }

        let start = if self.config.include_preceding_entry {
            chained_at.saturating_sub(1).max(1)
        } else {
            chained_at
        };
        let entries = self.load_segment(start, published_at).await?;

        let offset = (chained_at - start) as usize;
        if entries.get(offset).map(|e| &e.item_fingerprint) != Some(&fingerprint) {
            return Err(self
                .halt_on(ChainError::InvariantViolation {
                    position: chained_at,
                    reason: format!("entry does not hold {}", canonical),
                })
                .await);
        }

        tracing::debug!(
            fingerprint = %canonical,
            chain_id = chained_at,
            validated_chain_id = published_at,
            "[tc] Built validation chain of {} entries",
            entries.len()
        );
        Ok(ValidationResult::validated(
            canonical,
            chained_at,
            published_at,
            &entries,
        ))
    }
}
