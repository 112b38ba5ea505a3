//! Commits validated renderings to the object store.

use crate::traits::{ObjectMetadata, ObjectStore};
use cgraph_core::{CacheEntry, CachePolicy, ObjectKey, StorageError};

/// Writes graphs with the configured cache headers.
#[derive(Debug, Clone)]
pub struct CacheWriter<S> {
    store: S,
    policy: CachePolicy,
    metadata: ObjectMetadata,
}

impl<S: ObjectStore> CacheWriter<S> {
    pub fn new(store: S, policy: CachePolicy) -> Self {
        let metadata = ObjectMetadata::from_policy(&policy);
        Self {
            store,
            policy,
            metadata,
        }
    }

    pub fn store_handle(&self) -> &S {
        &self.store
    }

    /// Store `content` under `key`, replacing any previous object.
    ///
    /// Callers only pass renderings that passed the validity analyzer.
    pub async fn store(&self, key: &ObjectKey, content: &[u8]) -> Result<CacheEntry, StorageError> {
        let info = self.store.put(key, content, &self.metadata).await?;

        let entry = CacheEntry::new(
            key.clone(),
            content.to_vec(),
            info.last_modified,
            self.policy.ttl,
        );
        tracing::info!(
            key = %key,
            size_bytes = info.size,
            etag = %entry.etag(),
            "New graph stored"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_store_writes_headers_and_returns_entry() {
        let store = InMemoryObjectStore::new();
        let writer = CacheWriter::new(store.clone(), CachePolicy::default());
        let key = ObjectKey::from_raw("apache_apisix.svg");

        let entry = writer.store(&key, b"<svg>graph</svg>").await.unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.content, b"<svg>graph</svg>".to_vec());
        assert_eq!(entry.cache_control_ttl, Duration::from_secs(86_400));
        assert_eq!(entry.etag().len(), 64);

        let reader = store.open(&key).await.unwrap().unwrap();
        assert_eq!(reader.info.cache_control, "public, max-age=86400");
        assert_eq!(reader.info.content_type, "image/svg+xml;charset=utf-8");
        assert_eq!(reader.info.last_modified, entry.last_modified);
        assert_eq!(
            reader.read_to_end(&key).await.unwrap(),
            b"<svg>graph</svg>".to_vec()
        );
    }

    #[tokio::test]
    async fn test_custom_ttl_is_advertised() {
        let store = InMemoryObjectStore::new();
        let policy = CachePolicy {
            ttl: Duration::from_secs(600),
            ..CachePolicy::default()
        };
        let writer = CacheWriter::new(store.clone(), policy);
        let key = ObjectKey::from_raw("a_b.svg");

        writer.store(&key, b"<svg/>").await.unwrap();
        let info = store.open(&key).await.unwrap().unwrap().info;
        assert_eq!(info.cache_control, "public, max-age=600");
    }
}
