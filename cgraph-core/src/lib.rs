//! cgraph Core - Data Types
//!
//! Plain data structures shared by every other crate: render requests,
//! rendered markup, cache entries, traffic counters, the error taxonomy and
//! configuration. No I/O lives here.

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// PRIMITIVES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash used as an entity tag for cached graphs.
pub type ContentHash = [u8; 32];

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Suffix appended to every cached graph object.
pub const GRAPH_OBJECT_SUFFIX: &str = ".svg";

/// Key segment under which merge-mode graphs are stored.
pub const MERGE_KEY_PREFIX: &str = "merge/";

/// Prefix of the traffic counter subject for merge-mode graphs.
pub const MERGE_SUBJECT_PREFIX: &str = "merge:";

// ============================================================================
// REPOSITORY IDENTITY
// ============================================================================

/// A validated repository identifier such as `apache/apisix`.
///
/// Comma separated lists (`apache/apisix,apache/dubbo`) are accepted because
/// the render capability draws comparison graphs for several repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Validate and wrap a repository identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "repository".to_string(),
            });
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | ',' | '-')))
        {
            return Err(ValidationError::InvalidValue {
                field: "repository".to_string(),
                value: raw.clone(),
                reason: format!("character {:?} is not allowed", bad),
            });
        }
        if raw.contains("..") || raw.starts_with('/') || raw.ends_with('/') {
            return Err(ValidationError::InvalidValue {
                field: "repository".to_string(),
                value: raw.clone(),
                reason: "must be of the form owner/name".to_string(),
            });
        }
        // Object names flatten `/` to `_`, so the owner may hold neither.
        for entry in raw.split(',') {
            let (owner, name) = entry.split_once('/').unwrap_or((entry, ""));
            if owner.is_empty() || owner.contains('_') || name.contains('/') {
                return Err(ValidationError::InvalidValue {
                    field: "repository".to_string(),
                    value: raw.clone(),
                    reason: format!("{:?} is not of the form owner/name", entry),
                });
            }
        }
        Ok(Self(raw))
    }

    /// The identifier exactly as requested.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Flattened form used for object names: `apache/apisix` -> `apache_apisix`.
    pub fn object_name(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryId> for String {
    fn from(value: RepositoryId) -> Self {
        value.0
    }
}

// ============================================================================
// REQUESTS AND KEYS
// ============================================================================

/// Identifies which graph variant to produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderRequest {
    pub repository: RepositoryId,
    /// Alternate aggregation mode; cached under a distinct key.
    pub merge: bool,
}

impl RenderRequest {
    pub fn new(repository: RepositoryId, merge: bool) -> Self {
        Self { repository, merge }
    }

    /// Parse the repository and build a plain (non-merge) request.
    pub fn plain(repository: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(RepositoryId::new(repository)?, false))
    }

    /// Parse the repository and build a merge-mode request.
    pub fn merged(repository: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(RepositoryId::new(repository)?, true))
    }

    /// Object key the rendered graph is cached under.
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::for_request(self)
    }

    /// Subject key of the traffic counter for this graph variant.
    pub fn subject_key(&self) -> String {
        if self.merge {
            format!("{}{}", MERGE_SUBJECT_PREFIX, self.repository)
        } else {
            self.repository.as_str().to_string()
        }
    }
}

/// Object storage key for a cached graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Derive the key for a request.
    ///
    /// Plain graphs live at `<owner>_<name>.svg`; merge-mode graphs under
    /// `merge/<owner>_<name>.svg`. Flattened names never contain `/`, so the
    /// two namespaces cannot overlap.
    pub fn for_request(request: &RenderRequest) -> Self {
        let name = request.repository.object_name();
        if request.merge {
            Self(format!("{}{}{}", MERGE_KEY_PREFIX, name, GRAPH_OBJECT_SUFFIX))
        } else {
            Self(format!("{}{}", name, GRAPH_OBJECT_SUFFIX))
        }
    }

    /// Wrap an already-derived key, e.g. one listed from a store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RENDERED IMAGES AND CACHE ENTRIES
// ============================================================================

/// Markup produced by the render capability. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    markup: String,
    size_bytes: usize,
}

impl RenderedImage {
    pub fn new(markup: impl Into<String>) -> Self {
        let markup = markup.into();
        let size_bytes = markup.len();
        Self { markup, size_bytes }
    }

    /// Build from a raw response body. Markup must be UTF-8.
    pub fn from_bytes(body: Vec<u8>) -> Result<Self, AnalyzeError> {
        String::from_utf8(body)
            .map(Self::new)
            .map_err(|e| AnalyzeError::MalformedMarkup {
                reason: format!("body is not valid UTF-8: {}", e),
            })
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.markup.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.markup.into_bytes()
    }
}

/// A graph committed to the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: ObjectKey,
    pub content: Vec<u8>,
    pub content_hash: ContentHash,
    pub last_modified: Timestamp,
    pub cache_control_ttl: Duration,
}

impl CacheEntry {
    pub fn new(
        key: ObjectKey,
        content: Vec<u8>,
        last_modified: Timestamp,
        cache_control_ttl: Duration,
    ) -> Self {
        let content_hash = compute_content_hash(&content);
        Self {
            key,
            content,
            content_hash,
            last_modified,
            cache_control_ttl,
        }
    }

    /// Hex form of the content hash, suitable for an `ETag`.
    pub fn etag(&self) -> String {
        hex::encode(self.content_hash)
    }
}

/// Best-effort access counter for one graph variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounter {
    pub subject_key: String,
    pub count: u64,
    pub last_access: Timestamp,
}

impl TrafficCounter {
    /// Counter for the first recorded access.
    pub fn first(subject_key: impl Into<String>, at: Timestamp) -> Self {
        Self {
            subject_key: subject_key.into(),
            count: 1,
            last_access: at,
        }
    }

    /// Record one more access.
    pub fn incremented(self, at: Timestamp) -> Self {
        Self {
            subject_key: self.subject_key,
            count: self.count.saturating_add(1),
            last_access: at,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_segment() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9-]{0,15}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merge and plain keys never collide for any pair of repositories.
        #[test]
        fn prop_merge_and_plain_keys_never_collide(
            a_owner in arb_segment(), a_name in arb_segment(),
            b_owner in arb_segment(), b_name in arb_segment(),
        ) {
            let plain = RenderRequest::plain(&format!("{}/{}", a_owner, a_name)).unwrap();
            let merged = RenderRequest::merged(&format!("{}/{}", b_owner, b_name)).unwrap();
            prop_assert_ne!(plain.object_key(), merged.object_key());
            prop_assert_ne!(plain.subject_key(), merged.subject_key());
        }

        /// Distinct repositories never share an object name.
        #[test]
        fn prop_object_names_are_unique(
            a_owner in arb_segment(), a_name in "[A-Za-z0-9_.-]{1,12}",
            b_owner in arb_segment(), b_name in "[A-Za-z0-9_.-]{1,12}",
        ) {
            let a = RepositoryId::new(format!("{}/{}", a_owner, a_name));
            let b = RepositoryId::new(format!("{}/{}", b_owner, b_name));
            if let (Ok(a), Ok(b)) = (a, b) {
                prop_assert_eq!(a == b, a.object_name() == b.object_name());
            }
        }

        /// Every derived key ends with the graph suffix.
        #[test]
        fn prop_keys_have_svg_suffix(owner in arb_segment(), name in arb_segment(), merge in any::<bool>()) {
            let request = RenderRequest::new(
                RepositoryId::new(format!("{}/{}", owner, name)).unwrap(),
                merge,
            );
            prop_assert!(request.object_key().as_str().ends_with(GRAPH_OBJECT_SUFFIX));
        }
    }
}
