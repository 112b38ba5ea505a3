//! Store traits for cached graphs and traffic counters.

use async_trait::async_trait;
use cgraph_core::{CachePolicy, ObjectKey, StorageError, Timestamp, TrafficCounter};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Headers written alongside an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub cache_control: String,
}

impl ObjectMetadata {
    pub fn from_policy(policy: &CachePolicy) -> Self {
        Self {
            content_type: policy.content_type.clone(),
            cache_control: policy.cache_control(),
        }
    }
}

/// Attributes of a stored object, available without reading its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub last_modified: Timestamp,
    pub content_type: String,
    pub cache_control: String,
}

/// An opened object: its attributes plus a stream over its bytes.
pub struct ObjectReader {
    pub info: ObjectInfo,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl ObjectReader {
    pub fn new(info: ObjectInfo, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            info,
            reader: Box::new(reader),
        }
    }

    /// Read the whole object.
    pub async fn read_to_end(mut self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        let mut content = Vec::with_capacity(self.info.size as usize);
        self.reader
            .read_to_end(&mut content)
            .await
            .map_err(|e| StorageError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(content)
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Blob storage for rendered graphs.
///
/// `put` replaces any previous object under the key in one step; readers
/// see either the old or the new object, never a partial one.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &ObjectKey,
        content: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<ObjectInfo, StorageError>;

    /// Open an object. `Ok(None)` when nothing is stored under the key.
    async fn open(&self, key: &ObjectKey) -> Result<Option<ObjectReader>, StorageError>;
}

/// Record store for access counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get_counter(&self, subject_key: &str) -> Result<Option<TrafficCounter>, StorageError>;

    async fn put_counter(&self, counter: &TrafficCounter) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put(
        &self,
        key: &ObjectKey,
        content: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<ObjectInfo, StorageError> {
        (**self).put(key, content, metadata).await
    }

    async fn open(&self, key: &ObjectKey) -> Result<Option<ObjectReader>, StorageError> {
        (**self).open(key).await
    }
}

#[async_trait]
impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    async fn get_counter(&self, subject_key: &str) -> Result<Option<TrafficCounter>, StorageError> {
        (**self).get_counter(subject_key).await
    }

    async fn put_counter(&self, counter: &TrafficCounter) -> Result<(), StorageError> {
        (**self).put_counter(counter).await
    }
}
