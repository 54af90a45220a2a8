//! LMDB-backed cache medium.
//!
//! Uses the heed crate to persist cache entries in a memory-mapped
//! key-value store, so cached collections and profiles survive restarts.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The medium uses:
//! - Read transactions for `read` and `keys_with_prefix`
//! - Write transactions for `write` and `remove`

use std::path::Path;

use chorus_core::CacheIoError;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, MdbError};

use super::medium::KvMedium;

/// Errors opening the LMDB environment.
///
/// Once the medium is open, failures are reported as [`CacheIoError`].
#[derive(Debug, thiserror::Error)]
pub enum LmdbMediumError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// LMDB-backed [`KvMedium`].
///
/// # Example
///
/// ```ignore
/// let medium = LmdbMedium::open("/tmp/chorus-cache", 64)?;
/// let cache = TtlCache::new(Arc::new(medium), Arc::new(SystemClock), "chorus");
/// ```
pub struct LmdbMedium {
    env: Env,
    db: Database<Str, Str>,
}

impl std::fmt::Debug for LmdbMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbMedium")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbMedium {
    /// Open (or create) the medium at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbMediumError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbMediumError::EnvOpen(format!("map size of {} MB overflows", max_size_mb)))?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbMediumError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbMediumError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }
}

fn medium_error(key: &str, err: heed::Error) -> CacheIoError {
    CacheIoError::Medium {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

fn write_error(key: &str, bytes: usize, err: heed::Error) -> CacheIoError {
    match err {
        heed::Error::Mdb(MdbError::MapFull) => CacheIoError::QuotaExceeded {
            key: key.to_string(),
            bytes,
        },
        other => medium_error(key, other),
    }
}

impl KvMedium for LmdbMedium {
    fn read(&self, key: &str) -> Result<Option<String>, CacheIoError> {
        let rtxn = self.env.read_txn().map_err(|e| medium_error(key, e))?;
        let value = self.db.get(&rtxn, key).map_err(|e| medium_error(key, e))?;
        Ok(value.map(str::to_string))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheIoError> {
        let bytes = key.len() + value.len();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| write_error(key, bytes, e))?;
        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| write_error(key, bytes, e))?;
        wtxn.commit().map_err(|e| write_error(key, bytes, e))
    }

    fn remove(&self, key: &str) -> Result<(), CacheIoError> {
        let mut wtxn = self.env.write_txn().map_err(|e| medium_error(key, e))?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| medium_error(key, e))?;
        wtxn.commit().map_err(|e| medium_error(key, e))
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheIoError> {
        let rtxn = self.env.read_txn().map_err(|e| medium_error(prefix, e))?;
        let iter = self
            .db
            .prefix_iter(&rtxn, prefix)
            .map_err(|e| medium_error(prefix, e))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => keys.push(key.to_string()),
                Err(_) => continue,
            }
        }
        Ok(keys)
    }
}
