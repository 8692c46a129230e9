use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, TableDefinition};
use tracing::debug;

use crate::error::KVError;
use crate::traits::KVStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Each stored value is prefixed with its expiry:
///
/// ```text
/// [expires_at_ms: 8 bytes LE] [payload: N bytes]
/// ```
///
/// `expires_at_ms == 0` means the entry never expires.
const HEADER_SIZE: usize = 8;

/// RedbStore is a KVStore implementation backed by redb, a pure-Rust embedded
/// key-value database. Expired entries read as missing and are overwritten by
/// the next put.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(|e| KVError::Storage(e.to_string()))?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db
            .begin_write()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(TABLE)
                .map_err(|e| KVError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| KVError::Storage(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn encode(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    // A zero ttl would collapse to the "never" marker; round it up to 1ms.
    let expires_at = match ttl {
        Some(ttl) => {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            now_ms().saturating_add(ttl_ms)
        }
        None => 0,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + value.len());
    buf.extend_from_slice(&expires_at.to_le_bytes());
    buf.extend_from_slice(value);
    buf
}

fn decode(key: &str, raw: &[u8]) -> Result<Option<Vec<u8>>, KVError> {
    if raw.len() < HEADER_SIZE {
        return Err(KVError::Corrupt(format!("{key}: entry shorter than header")));
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&raw[..HEADER_SIZE]);
    let expires_at = u64::from_le_bytes(header);
    if expires_at != 0 && expires_at <= now_ms() {
        debug!("RedbStore: {} expired", key);
        return Ok(None);
    }
    Ok(Some(raw[HEADER_SIZE..].to_vec()))
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| KVError::Storage(e.to_string()))?;

        match table.get(key) {
            Ok(Some(val)) => decode(key, val.value()),
            Ok(None) => Ok(None),
            Err(e) => Err(KVError::Storage(e.to_string())),
        }
    }

    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KVError> {
        let entry = encode(value, ttl);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| KVError::Storage(e.to_string()))?;
            table
                .insert(key, entry.as_slice())
                .map_err(|e| KVError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| KVError::Storage(e.to_string()))?;
            table
                .remove(key)
                .map_err(|e| KVError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        Ok(())
    }
}
