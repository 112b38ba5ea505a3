//! In-memory stores for tests and single-process use.

use crate::traits::{CounterStore, ObjectInfo, ObjectMetadata, ObjectReader, ObjectStore};
use async_trait::async_trait;
use cgraph_core::{ObjectKey, StorageError, Timestamp, TrafficCounter};
use chrono::Utc;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct StoredObject {
    info: ObjectInfo,
    content: Arc<Vec<u8>>,
}

/// Object store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<ObjectKey, StoredObject>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time.
    pub fn insert_at(
        &self,
        key: &ObjectKey,
        content: &[u8],
        metadata: &ObjectMetadata,
        last_modified: Timestamp,
    ) -> Result<ObjectInfo, StorageError> {
        let info = ObjectInfo {
            size: content.len() as u64,
            last_modified,
            content_type: metadata.content_type.clone(),
            cache_control: metadata.cache_control.clone(),
        };
        let stored = StoredObject {
            info: info.clone(),
            content: Arc::new(content.to_vec()),
        };
        self.objects
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(key.clone(), stored);
        Ok(info)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &ObjectKey,
        content: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<ObjectInfo, StorageError> {
        self.insert_at(key, content, metadata, Utc::now())
    }

    async fn open(&self, key: &ObjectKey) -> Result<Option<ObjectReader>, StorageError> {
        let objects = self.objects.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(objects.get(key).map(|stored| {
            ObjectReader::new(
                stored.info.clone(),
                Cursor::new(stored.content.as_ref().clone()),
            )
        }))
    }
}

/// Counter store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, TrafficCounter>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get_counter(&self, subject_key: &str) -> Result<Option<TrafficCounter>, StorageError> {
        let counters = self.counters.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(counters.get(subject_key).cloned())
    }

    async fn put_counter(&self, counter: &TrafficCounter) -> Result<(), StorageError> {
        self.counters
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(counter.subject_key.clone(), counter.clone());
        Ok(())
    }
}
