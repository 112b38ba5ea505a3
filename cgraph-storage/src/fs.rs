//! Filesystem object store.
//!
//! The bucket is a root directory; every object is a single file at its
//! key's path. The file starts with a big-endian `u32` header length and a
//! JSON header holding the object's headers, followed by the content. A
//! write goes to a temporary name in the target directory and is committed
//! by one rename, so readers see either the old object or the new one.

use crate::traits::{ObjectInfo, ObjectMetadata, ObjectReader, ObjectStore};
use async_trait::async_trait;
use cgraph_core::{ObjectKey, StorageError, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Upper bound on the encoded header; anything larger is not ours.
const MAX_HEADER_LEN: u32 = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    content_type: String,
    cache_control: String,
    last_modified: Timestamp,
}

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Use `root` as the bucket, creating it when missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::Backend {
            reason: format!("cannot create bucket {}: {}", root.display(), e),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object file for `key`. Keys must be relative paths
    /// without `.` or `..` segments.
    fn object_path(&self, key: &ObjectKey) -> io::Result<PathBuf> {
        let relative = Path::new(key.as_str());
        let valid = !key.as_str().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid object key {}", key),
            ));
        }
        Ok(self.root.join(relative))
    }

    async fn write_object(
        &self,
        key: &ObjectKey,
        content: &[u8],
        metadata: &ObjectMetadata,
        last_modified: Timestamp,
    ) -> io::Result<()> {
        let path = self.object_path(key)?;
        let header = Header {
            content_type: metadata.content_type.clone(),
            cache_control: metadata.cache_control.clone(),
            last_modified,
        };
        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let header_len = u32::try_from(header_bytes.len())
            .ok()
            .filter(|len| *len <= MAX_HEADER_LEN)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "object header too large"))?;

        write_atomic(&path, header_len, &header_bytes, content).await
    }
}

/// Read the length-prefixed header, leaving `file` positioned at the content.
/// Returns the header and the number of bytes it occupied.
async fn read_header(file: &mut tokio::fs::File) -> io::Result<(Header, u64)> {
    let header_len = file.read_u32().await?;
    if header_len > MAX_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("object header of {} bytes exceeds limit", header_len),
        ));
    }
    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes).await?;
    let header = serde_json::from_slice(&header_bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok((header, 4 + u64::from(header_len)))
}

/// Temporary file that is removed on drop unless committed.
struct PendingFile {
    path: PathBuf,
    committed: bool,
}

impl PendingFile {
    fn beside(target: &Path) -> io::Result<Self> {
        let dir = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "object path has no parent")
        })?;
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: dir.join(format!(".{}.{}.tmp", name, Uuid::now_v7())),
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn write_atomic(
    target: &Path,
    header_len: u32,
    header: &[u8],
    content: &[u8],
) -> io::Result<()> {
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let pending = PendingFile::beside(target)?;

    let mut file = tokio::fs::File::create(&pending.path).await?;
    file.write_u32(header_len).await?;
    file.write_all(header).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&pending.path, target).await?;
    pending.commit();
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &ObjectKey,
        content: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<ObjectInfo, StorageError> {
        let last_modified = Utc::now();
        self.write_object(key, content, metadata, last_modified)
            .await
            .map_err(|e| StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ObjectInfo {
            size: content.len() as u64,
            last_modified,
            content_type: metadata.content_type.clone(),
            cache_control: metadata.cache_control.clone(),
        })
    }

    async fn open(&self, key: &ObjectKey) -> Result<Option<ObjectReader>, StorageError> {
        let read_failed = |e: io::Error| StorageError::ReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let path = self.object_path(key).map_err(read_failed)?;

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_failed(e)),
        };
        // Length comes from the opened handle so it matches the bytes we stream.
        let file_len = file.metadata().await.map_err(read_failed)?.len();
        let (header, header_size) = read_header(&mut file).await.map_err(read_failed)?;

        let info = ObjectInfo {
            size: file_len.saturating_sub(header_size),
            last_modified: header.last_modified,
            content_type: header.content_type,
            cache_control: header.cache_control,
        };
        Ok(Some(ObjectReader::new(info, file)))
    }
}
