//! LMDB-backed traffic counter store.
//!
//! Uses the heed crate (Rust bindings for LMDB). Counters are stored as JSON
//! under their subject key in a single unnamed database.

use std::path::Path;

use async_trait::async_trait;
use cgraph_core::{StorageError, TrafficCounter};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use crate::traits::CounterStore;

/// Error type for LMDB counter operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCounterError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCounterError> for StorageError {
    fn from(e: LmdbCounterError) -> Self {
        StorageError::Backend {
            reason: e.to_string(),
        }
    }
}

impl LmdbCounterError {
    fn for_subject(self, subject_key: &str) -> StorageError {
        StorageError::CounterFailed {
            subject_key: subject_key.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Counter store persisted in an LMDB environment.
pub struct LmdbCounterStore {
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbCounterStore {
    /// Open (or create) the store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCounterError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCounterError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCounterError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn read(&self, subject_key: &str) -> Result<Option<TrafficCounter>, LmdbCounterError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))?;

        match self
            .db
            .get(&rtxn, subject_key)
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))?
        {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| LmdbCounterError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn write(&self, counter: &TrafficCounter) -> Result<(), LmdbCounterError> {
        let bytes = serde_json::to_vec(counter)
            .map_err(|e| LmdbCounterError::Serialization(e.to_string()))?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, counter.subject_key.as_str(), &bytes)
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCounterError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for LmdbCounterStore {
    async fn get_counter(&self, subject_key: &str) -> Result<Option<TrafficCounter>, StorageError> {
        self.read(subject_key)
            .map_err(|e| e.for_subject(subject_key))
    }

    async fn put_counter(&self, counter: &TrafficCounter) -> Result<(), StorageError> {
        self.write(counter)
            .map_err(|e| e.for_subject(&counter.subject_key))
    }
}

impl std::fmt::Debug for LmdbCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCounterStore")
            .field("path", &self.env.path())
            .finish()
    }
}
