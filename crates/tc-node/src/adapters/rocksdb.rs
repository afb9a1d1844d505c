//! # RocksDB Ledger Store
//!
//! `KeyValueStore` over RocksDB for ledgers that outgrow the file log.
//!
//! - Batches are one `WriteBatch`, synced when `sync_writes` is set
//! - Conditional batches check and write under a writer mutex; every write
//!   goes through this store, so the check cannot go stale
//! - Calls run on the blocking pool

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{
    BlockBasedOptions, Cache, Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tc_hash_chain::{BatchCondition, BatchOperation, KVStoreError, KeyValueStore, ScanResult};

/// RocksDB tuning for the ledger.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// fsync each batch (default: true)
    pub sync_writes: bool,
}

impl RocksDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }

    /// Small buffers, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            block_cache_size: 4 * 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            sync_writes: false,
            ..Self::new(path)
        }
    }
}

struct Inner {
    db: DB,
    writer: Mutex<()>,
    sync_writes: bool,
}

/// RocksDB-backed ledger store.
pub struct RocksDbStore {
    inner: Arc<Inner>,
}

impl RocksDbStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| KVStoreError::IOError {
            message: format!("Failed to open RocksDB at {}: {}", config.path.display(), e),
        })?;
        tracing::info!("[tc] Opened RocksDB ledger at {}", config.path.display());

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                writer: Mutex::new(()),
                sync_writes: config.sync_writes,
            }),
        })
    }

    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        Self::open(RocksDbConfig::new(path.as_ref()))
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, KVStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, KVStoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(&inner))
            .await
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB task failed: {}", e),
            })?
    }
}

impl Inner {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db.get(key).map_err(|e| rocks_error("get", e))
    }

    fn write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| rocks_error("batch write", e))
    }

    fn commit(
        &self,
        conditions: &[BatchCondition],
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError> {
        let _writer = self.writer.lock();
        for condition in conditions {
            let key = match condition {
                BatchCondition::Absent { key } | BatchCondition::Present { key } => key,
            };
            let present = self
                .db
                .get_pinned(key)
                .map_err(|e| rocks_error("condition check", e))?
                .is_some();
            if !condition.holds(|_| present) {
                return Ok(false);
            }
        }
        self.write(operations)?;
        Ok(true)
    }

    /// Forward scan from `start` while `keep` accepts the key.
    fn scan(
        &self,
        start: &[u8],
        keep: impl Fn(&[u8]) -> bool,
    ) -> Result<ScanResult, KVStoreError> {
        let mut results = Vec::new();
        for item in self.db.iterator(IteratorMode::From(start, Direction::Forward)) {
            let (key, value) = item.map_err(|e| rocks_error("scan", e))?;
            if !keep(&key) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    fn last_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let upper = prefix_successor(prefix);
        let mode = match &upper {
            Some(upper) => IteratorMode::From(upper, Direction::Reverse),
            None => IteratorMode::End,
        };
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(|e| rocks_error("reverse scan", e))?;
            if key.starts_with(prefix) {
                return Ok(Some((key.to_vec(), value.to_vec())));
            }
            if key.as_ref() < prefix {
                break;
            }
        }
        Ok(None)
    }
}

/// Smallest key greater than every key starting with `prefix`.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

fn rocks_error(operation: &str, e: rocksdb::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: format!("RocksDB {} failed: {}", operation, e),
    }
}

#[async_trait]
impl KeyValueStore for RocksDbStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let key = key.to_vec();
        self.blocking(move |inner| inner.get(&key)).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let operations = vec![BatchOperation::put(key, value)];
        self.blocking(move |inner| inner.commit(&[], operations).map(|_| ()))
            .await
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        let operations = vec![BatchOperation::delete(key)];
        self.blocking(move |inner| inner.commit(&[], operations).map(|_| ()))
            .await
    }

    async fn atomic_batch_write(
        &self,
        operations: Vec<BatchOperation>,
    ) -> Result<(), KVStoreError> {
        self.blocking(move |inner| inner.commit(&[], operations).map(|_| ()))
            .await
    }

    async fn conditional_batch_write(
        &self,
        conditions: Vec<BatchCondition>,
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError> {
        self.blocking(move |inner| inner.commit(&conditions, operations))
            .await
    }

    async fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        let prefix = prefix.to_vec();
        self.blocking(move |inner| inner.scan(&prefix, |key| key.starts_with(&prefix)))
            .await
    }

    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<ScanResult, KVStoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let (start, end) = (start.to_vec(), end.to_vec());
        self.blocking(move |inner| inner.scan(&start, |key| key <= end.as_slice()))
            .await
    }

    async fn last_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let prefix = prefix.to_vec();
        self.blocking(move |inner| inner.last_with_prefix(&prefix))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> RocksDbStore {
        RocksDbStore::open(RocksDbConfig::for_testing(dir.path().join("ledger.rocksdb"))).unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_basic_operations() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put(b"key1", b"value1").await.unwrap();
        assert_eq!(store.get(b"key1").await.unwrap(), Some(b"value1".to_vec()));
        assert!(store.exists(b"key1").await.unwrap());

        store.delete(b"key1").await.unwrap();
        assert!(!store.exists(b"key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_conditional_batch() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.insert_if_absent(b"c:1", b"a").await.unwrap());
        assert!(!store.insert_if_absent(b"c:1", b"b").await.unwrap());
        assert!(!store
            .conditional_batch_write(
                vec![BatchCondition::present(b"c:2".to_vec())],
                vec![BatchOperation::put(b"c:3".to_vec(), b"x".to_vec())],
            )
            .await
            .unwrap());
        assert_eq!(store.get(b"c:1").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.get(b"c:3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scans_and_last_key() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"c:\x01".to_vec(), b"1".to_vec()),
                BatchOperation::put(b"c:\x02".to_vec(), b"2".to_vec()),
                BatchOperation::put(b"c:\x03".to_vec(), b"3".to_vec()),
                BatchOperation::put(b"h:A".to_vec(), b"h".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(store.prefix_scan(b"c:").await.unwrap().len(), 3);
        let range = store.range_scan(b"c:\x02", b"c:\x03").await.unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(
            store.last_with_prefix(b"c:").await.unwrap(),
            Some((b"c:\x03".to_vec(), b"3".to_vec()))
        );
        assert_eq!(store.last_with_prefix(b"p:").await.unwrap(), None);
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"c:"), Some(b"c;".to_vec()));
        assert_eq!(prefix_successor(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xFF]), None);
    }
}
