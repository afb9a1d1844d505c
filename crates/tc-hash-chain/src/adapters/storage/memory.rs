use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchCondition, BatchOperation, KeyValueStore, ScanResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

pub(crate) type OrderedMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory key-value store.
///
/// A single write lock covers each batch, so conditional batches are atomic
/// with respect to every other call on the same store.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<OrderedMap>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

pub(crate) fn apply(map: &mut OrderedMap, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

pub(crate) fn conditions_hold(map: &OrderedMap, conditions: &[BatchCondition]) -> bool {
    conditions
        .iter()
        .all(|c| c.holds(|key| map.contains_key(key)))
}

pub(crate) fn scan_prefix(map: &OrderedMap, prefix: &[u8]) -> ScanResult {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn scan_range(map: &OrderedMap, start: &[u8], end: &[u8]) -> ScanResult {
    if start > end {
        return Vec::new();
    }
    map.range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn last_under(map: &OrderedMap, prefix: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .last()
        .map(|(k, v)| (k.clone(), v.clone()))
}

#[async_trait]
impl KeyValueStore for InMemoryKVStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn atomic_batch_write(
        &self,
        operations: Vec<BatchOperation>,
    ) -> Result<(), KVStoreError> {
        apply(&mut self.data.write(), operations);
        Ok(())
    }

    async fn conditional_batch_write(
        &self,
        conditions: Vec<BatchCondition>,
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError> {
        let mut data = self.data.write();
        if !conditions_hold(&data, &conditions) {
            return Ok(false);
        }
        apply(&mut data, operations);
        Ok(true)
    }

    async fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(scan_prefix(&self.data.read(), prefix))
    }

    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(scan_range(&self.data.read(), start, end))
    }

    async fn last_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(last_under(&self.data.read(), prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_kv_store() {
        let store = InMemoryKVStore::new();

        store.put(b"key1", b"value1").await.unwrap();
        store.put(b"key2", b"value2").await.unwrap();

        assert_eq!(store.get(b"key1").await.unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key3").await.unwrap(), None);

        assert!(store.exists(b"key1").await.unwrap());
        assert!(!store.exists(b"key3").await.unwrap());

        store.delete(b"key1").await.unwrap();
        assert!(!store.exists(b"key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_prefix_scan_is_ordered() {
        let store = InMemoryKVStore::new();

        store.put(b"c:3", b"three").await.unwrap();
        store.put(b"c:1", b"one").await.unwrap();
        store.put(b"c:2", b"two").await.unwrap();
        store.put(b"h:1", b"other").await.unwrap();

        let values: Vec<_> = store
            .prefix_scan(b"c:")
            .await
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);

        let (key, _) = store.last_with_prefix(b"c:").await.unwrap().unwrap();
        assert_eq!(key, b"c:3".to_vec());
        assert!(store.last_with_prefix(b"x:").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_scan_is_inclusive() {
        let store = InMemoryKVStore::new();
        for i in 1u8..=5 {
            store.put(&[b'c', i], &[i]).await.unwrap();
        }

        let range = store.range_scan(&[b'c', 2], &[b'c', 4]).await.unwrap();
        assert_eq!(range.len(), 3);
        assert!(store.range_scan(&[b'c', 4], &[b'c', 2]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conditional_batch_is_all_or_nothing() {
        let store = InMemoryKVStore::new();
        store.put(b"taken", b"x").await.unwrap();

        let applied = store
            .conditional_batch_write(
                vec![BatchCondition::absent(b"taken".to_vec())],
                vec![BatchOperation::put(b"a".to_vec(), b"1".to_vec())],
            )
            .await
            .unwrap();
        assert!(!applied);
        assert!(!store.exists(b"a").await.unwrap());

        assert!(store.insert_if_absent(b"b", b"2").await.unwrap());
        assert!(!store.insert_if_absent(b"b", b"3").await.unwrap());
        assert_eq!(store.get(b"b").await.unwrap(), Some(b"2".to_vec()));
    }
}
