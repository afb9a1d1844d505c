use super::memory::{apply, conditions_hold, last_under, scan_prefix, scan_range, OrderedMap};
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchCondition, BatchOperation, KeyValueStore, ScanResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Log size, as a multiple of the live data, above which `open` compacts.
const COMPACT_RATIO: u64 = 4;

/// File-backed key-value store.
///
/// The file is an append-only log of committed batches; the map is held in
/// memory and rebuilt by replaying the log on open. Each commit appends one
/// framed record and syncs it on a blocking thread, so a crash loses at most
/// the batch being written, never part of one.
///
/// ## Record Format
///
/// ```text
/// [body_len: u32 LE][body]
/// body = ( [1][key_len: u32][key][value_len: u32][value]
///        | [2][key_len: u32][key] )*
/// ```
pub struct FileBackedKVStore {
    ledger: Arc<Ledger>,
}

struct Ledger {
    data: RwLock<OrderedMap>,
    log: Mutex<LogFile>,
    path: PathBuf,
}

struct LogFile {
    file: File,
    /// Bytes of complete records; the file is cut back to this on a failed append.
    len: u64,
}

impl FileBackedKVStore {
    /// Open the log at `path`, creating it (and its directory) if missing.
    ///
    /// A record cut short by a crash is dropped and the file truncated to the
    /// last complete record. A complete record that does not parse is
    /// corruption.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_error)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(io_error)?;

        let (data, valid_len) = replay(&bytes)?;
        if valid_len < bytes.len() {
            tracing::warn!(
                "[tc] Dropping {} bytes of incomplete record at end of {}",
                bytes.len() - valid_len,
                path.display()
            );
            file.set_len(valid_len as u64).map_err(io_error)?;
            file.sync_all().map_err(io_error)?;
        }
        tracing::info!(
            "[tc] Loaded {} keys from {} ({} bytes)",
            data.len(),
            path.display(),
            valid_len
        );

        let live = live_size(&data);
        let mut log = LogFile {
            file,
            len: valid_len as u64,
        };
        if log.len > COMPACT_RATIO * live.max(1) && log.len > 64 * 1024 {
            log = compact(&path, &data)?;
            tracing::info!(
                "[tc] Compacted {} from {} to {} bytes",
                path.display(),
                valid_len,
                log.len
            );
        }

        Ok(Self {
            ledger: Arc::new(Ledger {
                data: RwLock::new(data),
                log: Mutex::new(log),
                path,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.ledger.path
    }

    /// Run a commit on the blocking pool.
    async fn commit(
        &self,
        conditions: Vec<BatchCondition>,
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError> {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || ledger.commit(&conditions, operations))
            .await
            .map_err(|e| KVStoreError::IOError {
                message: format!("storage task failed: {}", e),
            })?
    }
}

impl Ledger {
    /// Check `conditions`, append and sync the batch, then apply it.
    ///
    /// The log lock serializes writers; readers see the batch only after it
    /// is on disk.
    fn commit(
        &self,
        conditions: &[BatchCondition],
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError> {
        let mut log = self.log.lock();
        if !conditions_hold(&self.data.read(), conditions) {
            return Ok(false);
        }
        if operations.is_empty() {
            return Ok(true);
        }

        let record = encode_record(&operations);
        let written = log
            .file
            .write_all(&record)
            .and_then(|_| log.file.sync_data());
        if let Err(e) = written {
            let len = log.len;
            if let Err(cut) = log.file.set_len(len) {
                tracing::error!("[tc] Failed to cut back {}: {}", self.path.display(), cut);
            }
            return Err(io_error(e));
        }
        log.len += record.len() as u64;

        apply(&mut self.data.write(), operations);
        Ok(true)
    }
}

fn encode_record(operations: &[BatchOperation]) -> Vec<u8> {
    let mut body = Vec::new();
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                body.push(TAG_PUT);
                put_chunk(&mut body, key);
                put_chunk(&mut body, value);
            }
            BatchOperation::Delete { key } => {
                body.push(TAG_DELETE);
                put_chunk(&mut body, key);
            }
        }
    }
    let mut record = Vec::with_capacity(body.len() + 4);
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(&body);
    record
}

fn put_chunk(out: &mut Vec<u8>, chunk: &[u8]) {
    out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(chunk);
}

/// Rebuild the map from the log. Returns the map and the length of the
/// prefix made of complete records.
fn replay(bytes: &[u8]) -> Result<(OrderedMap, usize), KVStoreError> {
    let mut data = OrderedMap::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let Some(len) = read_u32(bytes, offset) else {
            break;
        };
        let body_start = offset + 4;
        let Some(body) = bytes.get(body_start..body_start + len) else {
            break;
        };
        apply(&mut data, decode_body(body, body_start)?);
        offset = body_start + len;
    }
    Ok((data, offset))
}

fn decode_body(body: &[u8], base: usize) -> Result<Vec<BatchOperation>, KVStoreError> {
    let mut operations = Vec::new();
    let mut cursor = 0;
    while cursor < body.len() {
        let tag = body[cursor];
        cursor += 1;
        let key = take_chunk(body, &mut cursor, base)?;
        match tag {
            TAG_PUT => {
                let value = take_chunk(body, &mut cursor, base)?;
                operations.push(BatchOperation::Put { key, value });
            }
            TAG_DELETE => operations.push(BatchOperation::Delete { key }),
            other => {
                return Err(KVStoreError::CorruptionError {
                    message: format!("unknown operation tag {} at byte {}", other, base + cursor - 1),
                })
            }
        }
    }
    Ok(operations)
}

fn take_chunk(body: &[u8], cursor: &mut usize, base: usize) -> Result<Vec<u8>, KVStoreError> {
    let malformed = |at: usize| KVStoreError::CorruptionError {
        message: format!("malformed record at byte {}", base + at),
    };
    let len = read_u32(body, *cursor).ok_or_else(|| malformed(*cursor))?;
    let start = *cursor + 4;
    let chunk = body.get(start..start + len).ok_or_else(|| malformed(start))?;
    *cursor = start + len;
    Ok(chunk.to_vec())
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<usize> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw) as usize)
}

fn live_size(data: &OrderedMap) -> u64 {
    data.iter()
        .map(|(k, v)| (k.len() + v.len() + 9) as u64)
        .sum()
}

/// Rewrite the log as one record holding the live map, through a temp file
/// and rename.
fn compact(path: &Path, data: &OrderedMap) -> Result<LogFile, KVStoreError> {
    let operations: Vec<BatchOperation> = data
        .iter()
        .map(|(k, v)| BatchOperation::put(k.clone(), v.clone()))
        .collect();
    let record = encode_record(&operations);

    let temp_path = path.with_extension("tmp");
    let mut temp = File::create(&temp_path).map_err(io_error)?;
    temp.write_all(&record).map_err(io_error)?;
    temp.sync_all().map_err(io_error)?;
    std::fs::rename(&temp_path, path).map_err(io_error)?;

    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    Ok(LogFile {
        file,
        len: record.len() as u64,
    })
}

fn io_error(e: std::io::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: e.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for FileBackedKVStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.ledger.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.commit(Vec::new(), vec![BatchOperation::put(key, value)])
            .await
            .map(|_| ())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        if !self.ledger.data.read().contains_key(key) {
            return Ok(());
        }
        self.commit(Vec::new(), vec![BatchOperation::delete(key)])
            .await
            .map(|_| ())
    }

    async fn atomic_batch_write(
        &self,
        operations: Vec<BatchOperation>,
    ) -> Result<(), KVStoreError> {
        self.commit(Vec::new(), operations).await.map(|_| ())
    }

    async fn conditional_batch_write(
        &self,
        conditions: Vec<BatchCondition>,
        operations: Vec<BatchOperation>,
    ) -> Result<bool, KVStoreError> {
        self.commit(conditions, operations).await
    }

    async fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(scan_prefix(&self.ledger.data.read(), prefix))
    }

    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(scan_range(&self.ledger.data.read(), start, end))
    }

    async fn last_with_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(last_under(&self.ledger.data.read(), prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let store = FileBackedKVStore::open(&path).unwrap();
            store.put(b"h:AAAA", b"record").await.unwrap();
            store.put(b"p:1", b"pending").await.unwrap();
            store
                .atomic_batch_write(vec![
                    BatchOperation::put(b"c:1".to_vec(), b"entry".to_vec()),
                    BatchOperation::delete(b"p:1".to_vec()),
                ])
                .await
                .unwrap();
        }

        let reopened = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(reopened.get(b"h:AAAA").await.unwrap(), Some(b"record".to_vec()));
        assert_eq!(reopened.get(b"c:1").await.unwrap(), Some(b"entry".to_vec()));
        assert_eq!(reopened.get(b"p:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_writes_append_without_rewriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = FileBackedKVStore::open(&path).unwrap();

        store.put(b"a", b"1").await.unwrap();
        let after_first = std::fs::metadata(&path).unwrap().len();
        store.put(b"b", b"2").await.unwrap();
        let after_second = std::fs::metadata(&path).unwrap().len();

        // One record per commit: frame + tag + two length-prefixed chunks.
        assert_eq!(after_first, 4 + 1 + 5 + 5);
        assert_eq!(after_second, 2 * after_first);
    }

    #[tokio::test]
    async fn test_failed_condition_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = FileBackedKVStore::open(&path).unwrap();

        assert!(store.insert_if_absent(b"k", b"1").await.unwrap());
        assert!(!store.insert_if_absent(b"k", b"2").await.unwrap());

        let reopened = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(reopened.get(b"k").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let store = FileBackedKVStore::open(&path).unwrap();
            store.put(b"k", b"1").await.unwrap();
        }
        let complete = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[40, 0, 0, 0, TAG_PUT, 1]).unwrap();
        drop(file);

        let store = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), complete);

        store.put(b"j", b"2").await.unwrap();
        let reopened = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(reopened.get(b"j").await.unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_malformed_record_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        std::fs::write(&path, [2u8, 0, 0, 0, 9, 0]).unwrap();

        assert!(matches!(
            FileBackedKVStore::open(&path),
            Err(KVStoreError::CorruptionError { .. })
        ));
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedKVStore::open(dir.path().join("nested/fresh.db")).unwrap();
        assert!(store.ledger.data.read().is_empty());
    }

    #[test]
    fn test_compact_keeps_live_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let mut data = OrderedMap::new();
        data.insert(b"k".to_vec(), b"v".to_vec());

        let log = compact(&path, &data).unwrap();
        let (replayed, len) = replay(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(replayed, data);
        assert_eq!(len as u64, log.len);
    }
}
