//! LMDB-backed cache backend.
//!
//! Uses heed to keep cache entries in a memory-mapped file so that cached
//! results survive a restart of the process. Each value is stored as
//! `[expires_at millis: 8 bytes LE][payload]`; entries past their deadline are
//! reported as absent and removed lazily.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::traits::{CacheBackend, CacheError, SupportsKeyEnumeration, SupportsReset};

const DEADLINE_BYTES: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Corrupt cache entry for key {0}")]
    CorruptEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent cache backend over a single unnamed LMDB database.
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheBackend {
    /// Open (or create) the cache under `path`, sized to `max_size_mb`.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))
    }

    pub fn is_empty(&self) -> Result<bool, LmdbCacheError> {
        Ok(self.len()? == 0)
    }

    fn remove(&self, key: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) if key.starts_with(prefix) => keys.push(key.to_vec()),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable LMDB cache entry");
                }
            }
        }

        Ok(keys)
    }
}

fn encode_entry(value: &[u8], ttl: Duration) -> Vec<u8> {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let deadline = Utc::now().timestamp_millis().saturating_add(ttl_ms);

    let mut bytes = Vec::with_capacity(DEADLINE_BYTES + value.len());
    bytes.extend_from_slice(&deadline.to_le_bytes());
    bytes.extend_from_slice(value);
    bytes
}

/// Split a stored entry into its deadline and payload.
fn decode_entry(key: &str, bytes: &[u8]) -> Result<(i64, Vec<u8>), LmdbCacheError> {
    if bytes.len() < DEADLINE_BYTES {
        return Err(LmdbCacheError::CorruptEntry(key.to_string()));
    }
    let deadline_bytes: [u8; DEADLINE_BYTES] = bytes[..DEADLINE_BYTES]
        .try_into()
        .map_err(|_| LmdbCacheError::CorruptEntry(key.to_string()))?;
    Ok((
        i64::from_le_bytes(deadline_bytes),
        bytes[DEADLINE_BYTES..].to_vec(),
    ))
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let stored = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            self.db
                .get(&rtxn, key.as_bytes())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
                .map(<[u8]>::to_vec)
        };

        let Some(bytes) = stored else {
            return Ok(None);
        };

        let (deadline, payload) = decode_entry(key, &bytes)?;
        if deadline <= Utc::now().timestamp_millis() {
            self.remove(key.as_bytes())?;
            return Ok(None);
        }
        Ok(Some(payload))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = encode_entry(&value, ttl);

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_bytes(), &entry)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key.as_bytes())?;
        Ok(())
    }

    fn key_enumeration(&self) -> Option<&dyn SupportsKeyEnumeration> {
        Some(self)
    }

    fn reset_capability(&self) -> Option<&dyn SupportsReset> {
        Some(self)
    }
}

#[async_trait]
impl SupportsKeyEnumeration for LmdbCacheBackend {
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let keys = self.collect_keys_with_prefix(prefix.as_bytes())?;
        Ok(keys
            .into_iter()
            .filter_map(|k| String::from_utf8(k).ok())
            .collect())
    }
}

#[async_trait]
impl SupportsReset for LmdbCacheBackend {
    async fn reset(&self) -> Result<(), CacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(())
    }
}
